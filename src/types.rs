use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// 2D floating point raster (row = along-track, col = cross-track)
pub type Raster = Array2<f32>;

/// 2D packed quality-flag raster
pub type FlagRaster = Array2<u32>;

/// 2D boolean raster (cloud / land / candidate / shadow masks)
pub type BoolRaster = Array2<bool>;

/// Rectangular region of a swath, inclusive start / exclusive end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start_row: usize,
    pub end_row: usize,
    pub start_col: usize,
    pub end_col: usize,
}

impl Window {
    pub fn new(start_row: usize, end_row: usize, start_col: usize, end_col: usize) -> Self {
        Self {
            start_row,
            end_row,
            start_col,
            end_col,
        }
    }

    /// Full-raster window for a given scene shape
    pub fn full(height: usize, width: usize) -> Self {
        Self::new(0, height, 0, width)
    }

    pub fn height(&self) -> usize {
        self.end_row - self.start_row
    }

    pub fn width(&self) -> usize {
        self.end_col - self.start_col
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.height(), self.width())
    }
}

/// Cloud-mask decoding scheme selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloudMaskScheme {
    /// Summary-cloud bit of the confidence band only
    Confidence,
    /// Bayesian single/moderate bit only (unusable scene-wide when the
    /// no-Bayesian-data bit occurs anywhere)
    Bayesian,
    /// Legacy cloud band bit tests (visible, gross, thin cirrus, medium/high)
    Legacy,
    /// Bayesian OR confidence, falling back to confidence-only when the
    /// Bayesian band is unusable
    BayesianOrConfidence,
}

impl std::fmt::Display for CloudMaskScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloudMaskScheme::Confidence => write!(f, "confidence"),
            CloudMaskScheme::Bayesian => write!(f, "bayesian"),
            CloudMaskScheme::Legacy => write!(f, "legacy"),
            CloudMaskScheme::BayesianOrConfidence => write!(f, "bayesian-or-confidence"),
        }
    }
}

/// Field names resolved against the external raster source
///
/// Defaults match the AATSR 4th reprocessing product layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldNames {
    pub solar_zenith: String,
    pub solar_azimuth: String,
    pub view_zenith: String,
    pub nadir_side: String,
    pub latitude: String,
    pub longitude: String,
    pub confidence_flags: String,
    pub bayes_flags: String,
    pub cloud_flags: String,
    pub elevation: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            solar_zenith: "solar_zenith_tn".to_string(),
            solar_azimuth: "solar_azimuth_tn".to_string(),
            view_zenith: "sat_zenith_tn".to_string(),
            nadir_side: "x_tx".to_string(),
            latitude: "latitude_tx".to_string(),
            longitude: "longitude_tx".to_string(),
            confidence_flags: "confidence_in".to_string(),
            bayes_flags: "bayes_in".to_string(),
            cloud_flags: "cloud_in".to_string(),
            elevation: "elevation_in".to_string(),
        }
    }
}

/// Parameters of the nadir-crossover view-angle repair
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NadirCorrection {
    /// Clean fit window before the discontinuity, [start, end)
    pub fit_before: (usize, usize),
    /// Clean fit window after the discontinuity, [start, end); an end of
    /// `usize::MAX` is clamped to the raster width
    pub fit_after: (usize, usize),
    /// Cross-track column where the view direction sign flips; the
    /// corrupted window is [fit_before.1, fit_after.0), split at this column
    pub crossover: usize,
}

impl Default for NadirCorrection {
    fn default() -> Self {
        // AATSR nadir view geometry: discontinuity between columns 271/272
        Self {
            fit_before: (0, 200),
            fit_after: (340, usize::MAX),
            crossover: 272,
        }
    }
}

/// Cloud-shadow processor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowConfig {
    /// Assumed cloud-top height in meters (shadow ray source altitude)
    pub cloud_top_height: f64,
    /// Ground pixel spacing in meters
    pub pixel_spacing: f64,
    /// Cloud-mask decoding scheme
    pub cloud_scheme: CloudMaskScheme,
    /// Along-track rows per pruning/casting block
    pub block_rows: usize,
    /// Coarse grid stride of the orientation field, in pixels
    pub orientation_grid_step: usize,
    /// Solar zenith limit of the daylight-row screening, degrees
    pub max_solar_zenith: f32,
    /// Convolved cloud-fraction bounds of a search candidate (exclusive)
    pub cloud_fraction_bounds: (f32, f32),
    /// Minimum convolved land fraction of a search candidate (exclusive)
    pub land_fraction_floor: f32,
    /// Inner radius in meters when an annular search kernel is wanted
    pub kernel_inner_radius: Option<f64>,
    /// View-zenith repair at the nadir crossover, when the product needs it
    pub nadir_correction: Option<NadirCorrection>,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            cloud_top_height: 6000.0,
            pixel_spacing: 1000.0,
            cloud_scheme: CloudMaskScheme::BayesianOrConfidence,
            block_rows: 2000,
            orientation_grid_step: 100,
            max_solar_zenith: 85.0,
            cloud_fraction_bounds: (0.001, 0.998),
            land_fraction_floor: 0.001,
            kernel_inner_radius: None,
            nadir_correction: None,
        }
    }
}

/// Per-pixel viewing/illumination geometry consumed by the ray projector
#[derive(Debug, Clone, Copy)]
pub struct GeometryPixel {
    /// Solar zenith angle, degrees
    pub solar_zenith: f32,
    /// Solar azimuth angle, degrees
    pub solar_azimuth: f32,
    /// Sensor view zenith angle, degrees
    pub view_zenith: f32,
    /// Sign carrier of the swath half relative to the nadir line
    /// (negative left of the crossover column)
    pub nadir_side: f32,
    /// Local-north bearing of the pixel grid, degrees
    pub orientation: f32,
}

/// Result of one cloud-shadow run
#[derive(Debug, Clone)]
pub struct ShadowOutput {
    /// Detected shadow mask, aligned to `window`
    pub shadow_mask: BoolRaster,
    /// Cloud mask the casting was based on
    pub cloud_mask: BoolRaster,
    /// Search-start candidates evaluated for casting
    pub candidate_mask: BoolRaster,
    /// Daylight window of the swath the masks are aligned to
    pub window: Window,
    /// True when the run was cancelled and the masks are partial
    pub cancelled: bool,
}

/// Error types for cloud-shadow processing
#[derive(Debug, thiserror::Error)]
pub enum ShadowError {
    #[error("unknown field: {name} is neither a band nor a tie point grid")]
    UnknownField { name: String },

    #[error("raster shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("processing error: {0}")]
    Processing(String),
}

/// Result type for cloud-shadow operations
pub type ShadowResult<T> = Result<T, ShadowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_shape() {
        let w = Window::new(10, 30, 0, 512);
        assert_eq!(w.shape(), (20, 512));
        assert_eq!(Window::full(100, 50).shape(), (100, 50));
    }

    #[test]
    fn test_default_config() {
        let cfg = ShadowConfig::default();
        assert_eq!(cfg.block_rows, 2000);
        assert_eq!(cfg.cloud_scheme, CloudMaskScheme::BayesianOrConfidence);
        assert!(cfg.nadir_correction.is_none());
    }
}
