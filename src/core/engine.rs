use crate::core::mask_decode;
use crate::core::orientation::OrientationField;
use crate::core::projector::{project, ProjectorParams};
use crate::core::search_area::{block_bounds, SearchAreaPruner};
use crate::core::view_geometry::ViewGeometryCorrector;
use crate::io::RasterSource;
use crate::types::{
    BoolRaster, CloudMaskScheme, FieldNames, GeometryPixel, Raster, ShadowConfig, ShadowError,
    ShadowOutput, ShadowResult, Window,
};
use ndarray::s;
use std::sync::atomic::{AtomicBool, Ordering};

/// Per-pixel geometry rasters of the processed window
#[derive(Debug, Clone)]
pub struct SceneGeometry {
    pub solar_zenith: Raster,
    pub solar_azimuth: Raster,
    pub view_zenith: Raster,
    pub nadir_side: Raster,
    pub orientation: Raster,
}

impl SceneGeometry {
    fn check_shapes(&self) -> ShadowResult<(usize, usize)> {
        let shape = self.solar_zenith.dim();
        for (name, dim) in [
            ("solar_azimuth", self.solar_azimuth.dim()),
            ("view_zenith", self.view_zenith.dim()),
            ("nadir_side", self.nadir_side.dim()),
            ("orientation", self.orientation.dim()),
        ] {
            if dim != shape {
                log::error!("geometry raster {} disagrees on shape", name);
                return Err(ShadowError::ShapeMismatch {
                    expected: shape,
                    actual: dim,
                });
            }
        }
        Ok(shape)
    }

    fn pixel(&self, i: usize, j: usize) -> GeometryPixel {
        GeometryPixel {
            solar_zenith: self.solar_zenith[[i, j]],
            solar_azimuth: self.solar_azimuth[[i, j]],
            view_zenith: self.view_zenith[[i, j]],
            nadir_side: self.nadir_side[[i, j]],
            orientation: self.orientation[[i, j]],
        }
    }
}

/// Minimum count of in-bounds path cells below which a source pixel
/// cannot produce a shadow determination
const MIN_PATH_CELLS: usize = 4;

/// Casts shadow rays for candidate cloud pixels and accumulates the mask
///
/// The per-pixel evaluation is a pure function; accepted cells are unioned
/// into the shadow mask, so the result is independent of processing order
/// and safe to partition across threads.
#[derive(Debug, Clone)]
pub struct ShadowCastingEngine {
    params: ProjectorParams,
}

impl ShadowCastingEngine {
    pub fn new(config: &ShadowConfig, min_surface_altitude: f64) -> Self {
        Self {
            params: ProjectorParams {
                pixel_spacing: config.pixel_spacing,
                cloud_top_height: config.cloud_top_height,
                min_surface_altitude,
            },
        }
    }

    /// Evaluate one source pixel; returns the accepted absolute cells
    fn evaluate_source(
        &self,
        i: usize,
        j: usize,
        geometry: &SceneGeometry,
        cloud: &BoolRaster,
        elevation: &Raster,
    ) -> Vec<(usize, usize)> {
        let (height, width) = elevation.dim();
        let path = project(&geometry.pixel(i, j), &self.params);
        if path.is_empty() {
            // degenerate sun geometry, silently skipped
            return Vec::new();
        }

        let mut cells: Vec<(usize, usize, f32)> = Vec::with_capacity(path.len());
        for (&(dx, dy), &theoretical) in path.offsets.iter().zip(path.heights.iter()) {
            let col = j as i64 + dx as i64;
            let row = i as i64 + dy as i64;
            if row < 0 || col < 0 || row >= height as i64 || col >= width as i64 {
                continue;
            }
            cells.push((row as usize, col as usize, theoretical));
        }
        if cells.len() < MIN_PATH_CELLS {
            return Vec::new();
        }

        cells
            .into_iter()
            .filter(|&(row, col, theoretical)| {
                let actual = elevation[[row, col]];
                (theoretical - actual).abs() < path.tolerance && !cloud[[row, col]]
            })
            .map(|(row, col, _)| (row, col))
            .collect()
    }

    /// Cast every candidate cloud pixel of the row range `rows`
    ///
    /// `candidates` is block-shaped (aligned to `rows`); paths may leave
    /// the block and are bounded by the full window instead.
    pub fn cast_block(
        &self,
        rows: (usize, usize),
        geometry: &SceneGeometry,
        cloud: &BoolRaster,
        candidates: &BoolRaster,
        elevation: &Raster,
        shadow: &mut BoolRaster,
    ) -> ShadowResult<()> {
        let (height, width) = geometry.check_shapes()?;
        if cloud.dim() != (height, width)
            || elevation.dim() != (height, width)
            || shadow.dim() != (height, width)
        {
            return Err(ShadowError::ShapeMismatch {
                expected: (height, width),
                actual: elevation.dim(),
            });
        }

        let sources: Vec<(usize, usize)> = (rows.0..rows.1)
            .flat_map(|i| (0..width).map(move |j| (i, j)))
            .filter(|&(i, j)| cloud[[i, j]] && candidates[[i - rows.0, j]])
            .collect();
        log::debug!("casting {} cloud pixels in rows {:?}", sources.len(), rows);

        #[cfg(feature = "parallel")]
        let accepted: Vec<(usize, usize)> = {
            use rayon::prelude::*;
            sources
                .par_iter()
                .flat_map_iter(|&(i, j)| self.evaluate_source(i, j, geometry, cloud, elevation))
                .collect()
        };

        #[cfg(not(feature = "parallel"))]
        let accepted: Vec<(usize, usize)> = sources
            .iter()
            .flat_map(|&(i, j)| self.evaluate_source(i, j, geometry, cloud, elevation))
            .collect();

        // monotone union: cells only ever turn true
        for (row, col) in accepted {
            shadow[[row, col]] = true;
        }
        Ok(())
    }
}

/// Daylight row window of a swath
///
/// A row qualifies when every column sees the sun above `max_solar_zenith`
/// and carries the day flag. The window ends at the first later night-to-
/// day transition; without such a transition it silently extends to the
/// full raster height (upstream behavior, kept deliberately).
pub fn daylight_rows(
    solar_zenith: &Raster,
    day_mask: &BoolRaster,
    max_solar_zenith: f32,
) -> ShadowResult<(usize, usize)> {
    let (height, width) = solar_zenith.dim();
    if day_mask.dim() != (height, width) {
        return Err(ShadowError::ShapeMismatch {
            expected: (height, width),
            actual: day_mask.dim(),
        });
    }

    let row_ok: Vec<bool> = (0..height)
        .map(|i| {
            (0..width).all(|j| solar_zenith[[i, j]] < max_solar_zenith && day_mask[[i, j]])
        })
        .collect();

    let start = row_ok
        .iter()
        .position(|&ok| ok)
        .ok_or_else(|| ShadowError::Processing("no daylight rows in scene".to_string()))?;

    let end = (start..height - 1)
        .find(|&i| !row_ok[i] && row_ok[i + 1])
        .unwrap_or(height);

    Ok((start, end))
}

/// End-to-end cloud-shadow detection over one swath
///
/// The explicit entry point of the crate: give it a configuration plus a
/// [`RasterSource`] and it returns the shadow mask of the swath's daylight
/// window. All product I/O stays behind the source trait.
#[derive(Debug, Clone)]
pub struct CloudShadowProcessor {
    config: ShadowConfig,
    fields: FieldNames,
}

impl CloudShadowProcessor {
    pub fn new(config: ShadowConfig) -> Self {
        Self {
            config,
            fields: FieldNames::default(),
        }
    }

    pub fn with_fields(config: ShadowConfig, fields: FieldNames) -> Self {
        Self { config, fields }
    }

    /// Run the full detection
    pub fn detect(&self, source: &dyn RasterSource) -> ShadowResult<ShadowOutput> {
        self.detect_with_cancel(source, None)
    }

    /// Run the full detection with cooperative cancellation
    ///
    /// The flag is checked once per along-track block; on cancellation the
    /// partial shadow mask is returned (writes are monotone, so it is a
    /// valid under-approximation).
    pub fn detect_with_cancel(
        &self,
        source: &dyn RasterSource,
        cancel: Option<&AtomicBool>,
    ) -> ShadowResult<ShadowOutput> {
        let (scene_height, scene_width) = source.dimensions();
        log::info!(
            "cloud shadow detection over {}x{} scene, scheme {}, cth {:.0} m",
            scene_height,
            scene_width,
            self.config.cloud_scheme,
            self.config.cloud_top_height
        );

        // daylight screening over the full swath
        let sza_full = source.read_full(&self.fields.solar_zenith)?;
        let confidence_full = source.read_flag_full(&self.fields.confidence_flags)?;
        let day_full = mask_decode::decode_day_mask(&confidence_full);
        let (start_row, end_row) =
            daylight_rows(&sza_full, &day_full, self.config.max_solar_zenith)?;
        let window = Window::new(start_row, end_row, 0, scene_width);
        log::info!("daylight rows: {}..{}", start_row, end_row);

        // geometry and surface fields over the daylight window
        let solar_zenith = sza_full.slice(s![start_row..end_row, ..]).to_owned();
        let confidence = confidence_full
            .slice(s![start_row..end_row, ..])
            .to_owned();
        drop(sza_full);
        drop(confidence_full);

        let solar_azimuth = source.read_region(&self.fields.solar_azimuth, &window)?;
        let mut view_zenith = source.read_region(&self.fields.view_zenith, &window)?;
        let nadir_side = source.read_region(&self.fields.nadir_side, &window)?;
        let elevation = source.read_region(&self.fields.elevation, &window)?;

        if let Some(params) = self.config.nadir_correction {
            ViewGeometryCorrector::new(params).correct(&mut view_zenith)?;
        }

        let latitude = source.read_region(&self.fields.latitude, &window)?;
        let longitude = source.read_region(&self.fields.longitude, &window)?;
        let orientation = OrientationField::new(self.config.orientation_grid_step)
            .compute(&latitude, &longitude)?;

        let geometry = SceneGeometry {
            solar_zenith,
            solar_azimuth,
            view_zenith,
            nadir_side,
            orientation,
        };

        // masks
        let bayes = match self.config.cloud_scheme {
            CloudMaskScheme::Bayesian | CloudMaskScheme::BayesianOrConfidence => {
                Some(source.read_flag_region(&self.fields.bayes_flags, &window)?)
            }
            _ => None,
        };
        let legacy_cloud = match self.config.cloud_scheme {
            CloudMaskScheme::Legacy => {
                Some(source.read_flag_region(&self.fields.cloud_flags, &window)?)
            }
            _ => None,
        };
        let cloud = mask_decode::decode_cloud_mask(
            self.config.cloud_scheme,
            &confidence,
            bayes.as_ref(),
            legacy_cloud.as_ref(),
        )?;
        let land = mask_decode::decode_land_mask(&confidence);
        log::info!(
            "cloud pixels: {}, land pixels: {}",
            cloud.iter().filter(|&&c| c).count(),
            land.iter().filter(|&&l| l).count()
        );

        let min_surface_altitude = elevation
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(f64::INFINITY, |acc, v| acc.min(v as f64));
        if !min_surface_altitude.is_finite() {
            return Err(ShadowError::Processing(
                "elevation raster carries no finite values".to_string(),
            ));
        }

        let pruner = SearchAreaPruner::from_config(&self.config);
        let engine = ShadowCastingEngine::new(&self.config, min_surface_altitude);

        let (height, width) = window.shape();
        let mut shadow = BoolRaster::from_elem((height, width), false);
        let mut candidate_mask = BoolRaster::from_elem((height, width), false);
        let mut cancelled = false;

        for (block_start, block_end) in block_bounds(height, self.config.block_rows) {
            if cancel.map_or(false, |flag| flag.load(Ordering::Relaxed)) {
                log::warn!("cancelled before block starting at row {}", block_start);
                cancelled = true;
                break;
            }

            let candidates = pruner.prune_block(
                &cloud.slice(s![block_start..block_end, ..]),
                &land.slice(s![block_start..block_end, ..]),
                &geometry.solar_zenith.slice(s![block_start..block_end, ..]),
            )?;
            engine.cast_block(
                (block_start, block_end),
                &geometry,
                &cloud,
                &candidates,
                &elevation,
                &mut shadow,
            )?;
            candidate_mask
                .slice_mut(s![block_start..block_end, ..])
                .assign(&candidates);
        }

        log::info!(
            "shadow pixels: {}{}",
            shadow.iter().filter(|&&m| m).count(),
            if cancelled { " (partial, cancelled)" } else { "" }
        );

        Ok(ShadowOutput {
            shadow_mask: shadow,
            cloud_mask: cloud,
            candidate_mask,
            window,
            cancelled,
        })
    }
}
