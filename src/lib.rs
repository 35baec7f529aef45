//! umbra: geometric cloud-shadow detection for satellite swath imagery
//!
//! For every detected cloud pixel, a ray is projected from an assumed
//! cloud-top altitude down to the surface along the sun-illumination
//! direction; cells whose terrain elevation matches the ray's theoretical
//! height within tolerance are marked as shadow. The expensive per-pixel
//! casting is limited to plausible cloud-border regions by a
//! convolution-based search-area pruner.
//!
//! The crate performs no product I/O: all rasters arrive through the
//! [`io::RasterSource`] trait and the result leaves as plain masks.

pub mod core;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{
    BoolRaster, CloudMaskScheme, FieldNames, FlagRaster, GeometryPixel, NadirCorrection, Raster,
    ShadowConfig, ShadowError, ShadowOutput, ShadowResult, Window,
};

pub use crate::core::{CloudShadowProcessor, ShadowCastingEngine};
pub use io::{MemoryRasterSource, RasterSource};
