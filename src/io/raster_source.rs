use crate::types::{FlagRaster, Raster, ShadowError, ShadowResult, Window};
use ndarray::s;
use std::collections::HashMap;

/// "Read named field over region" access to a satellite product
///
/// Implementations wrap whatever product container the caller uses (SAFE,
/// BEAM-DIMAP, NetCDF, ...). The shadow processor only ever asks for
/// rectangular regions of named bands or tie-point grids; a request for a
/// name the product does not carry fails with
/// [`ShadowError::UnknownField`] and is fatal for the run.
pub trait RasterSource: Sync {
    /// Full scene shape as (height, width)
    fn dimensions(&self) -> (usize, usize);

    /// Read a floating point band or tie-point grid over `window`
    fn read_region(&self, name: &str, window: &Window) -> ShadowResult<Raster>;

    /// Read a packed quality-flag band over `window`
    fn read_flag_region(&self, name: &str, window: &Window) -> ShadowResult<FlagRaster>;

    /// Read a full-scene floating point field
    fn read_full(&self, name: &str) -> ShadowResult<Raster> {
        let (h, w) = self.dimensions();
        self.read_region(name, &Window::full(h, w))
    }

    /// Read a full-scene flag field
    fn read_flag_full(&self, name: &str) -> ShadowResult<FlagRaster> {
        let (h, w) = self.dimensions();
        self.read_flag_region(name, &Window::full(h, w))
    }
}

/// In-memory raster source backed by pre-loaded arrays
///
/// Serves two purposes: the adapter target for external product readers
/// that materialize their bands up front, and the test double of the
/// processing pipeline.
#[derive(Debug, Default)]
pub struct MemoryRasterSource {
    height: usize,
    width: usize,
    bands: HashMap<String, Raster>,
    flag_bands: HashMap<String, FlagRaster>,
}

impl MemoryRasterSource {
    pub fn new(height: usize, width: usize) -> Self {
        Self {
            height,
            width,
            bands: HashMap::new(),
            flag_bands: HashMap::new(),
        }
    }

    /// Register a floating point band or tie-point grid
    pub fn insert_band(&mut self, name: &str, data: Raster) -> ShadowResult<()> {
        self.check_shape(data.dim())?;
        self.bands.insert(name.to_string(), data);
        Ok(())
    }

    /// Register a packed quality-flag band
    pub fn insert_flag_band(&mut self, name: &str, data: FlagRaster) -> ShadowResult<()> {
        self.check_shape(data.dim())?;
        self.flag_bands.insert(name.to_string(), data);
        Ok(())
    }

    fn check_shape(&self, actual: (usize, usize)) -> ShadowResult<()> {
        if actual != (self.height, self.width) {
            return Err(ShadowError::ShapeMismatch {
                expected: (self.height, self.width),
                actual,
            });
        }
        Ok(())
    }

    fn check_window(&self, window: &Window) -> ShadowResult<()> {
        if window.end_row > self.height
            || window.end_col > self.width
            || window.start_row >= window.end_row
            || window.start_col >= window.end_col
        {
            return Err(ShadowError::Processing(format!(
                "window {:?} outside scene of {}x{}",
                window, self.height, self.width
            )));
        }
        Ok(())
    }
}

impl RasterSource for MemoryRasterSource {
    fn dimensions(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    fn read_region(&self, name: &str, window: &Window) -> ShadowResult<Raster> {
        self.check_window(window)?;
        let band = self.bands.get(name).ok_or_else(|| ShadowError::UnknownField {
            name: name.to_string(),
        })?;
        Ok(band
            .slice(s![
                window.start_row..window.end_row,
                window.start_col..window.end_col
            ])
            .to_owned())
    }

    fn read_flag_region(&self, name: &str, window: &Window) -> ShadowResult<FlagRaster> {
        self.check_window(window)?;
        let band = self
            .flag_bands
            .get(name)
            .ok_or_else(|| ShadowError::UnknownField {
                name: name.to_string(),
            })?;
        Ok(band
            .slice(s![
                window.start_row..window.end_row,
                window.start_col..window.end_col
            ])
            .to_owned())
    }
}
