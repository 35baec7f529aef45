//! External data access seams
//!
//! The core never touches product files; all rasters arrive through the
//! [`RasterSource`] trait implemented by the caller's product reader.

pub mod raster_source;

pub use raster_source::{MemoryRasterSource, RasterSource};
