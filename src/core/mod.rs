//! Core cloud-shadow processing modules

pub mod engine;
pub mod height_inversion;
pub mod mask_decode;
pub mod orientation;
pub mod projector;
pub mod search_area;
pub mod view_geometry;

// Re-export main types
pub use engine::{daylight_rows, CloudShadowProcessor, SceneGeometry, ShadowCastingEngine};
pub use height_inversion::{BtInversion, HeightPair, PRESSURE_LEVELS};
pub use orientation::OrientationField;
pub use projector::{project, ProjectorParams, ShadowPath};
pub use search_area::{convolve_replicate, SearchAreaPruner, SearchKernel};
pub use view_geometry::{polyfit2, ViewGeometryCorrector};
