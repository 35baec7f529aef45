use crate::types::{BoolRaster, Raster, ShadowConfig, ShadowError, ShadowResult};
use ndarray::{s, Array2, ArrayView2};

/// Circular (optionally annular) convolution kernel
///
/// Sized from a radius in meters and the pixel spacing, normalized to unit
/// sum so that convolving a binary mask yields a local-fraction raster.
#[derive(Debug, Clone)]
pub struct SearchKernel {
    weights: Array2<f32>,
    half_rows: usize,
    half_cols: usize,
}

impl SearchKernel {
    /// Filled circular kernel
    pub fn disc(radius_m: f64, spacing_m: (f64, f64)) -> ShadowResult<Self> {
        Self::build(radius_m, None, spacing_m)
    }

    /// Annular kernel with the inner disc removed
    pub fn annulus(radius_m: f64, inner_radius_m: f64, spacing_m: (f64, f64)) -> ShadowResult<Self> {
        Self::build(radius_m, Some(inner_radius_m), spacing_m)
    }

    fn build(
        radius_m: f64,
        inner_radius_m: Option<f64>,
        spacing_m: (f64, f64),
    ) -> ShadowResult<Self> {
        if !(radius_m.is_finite() && radius_m >= 0.0) || spacing_m.0 <= 0.0 || spacing_m.1 <= 0.0 {
            return Err(ShadowError::Processing(format!(
                "invalid kernel geometry: radius {} m at spacing {:?}",
                radius_m, spacing_m
            )));
        }

        let half_rows = (radius_m / spacing_m.0).ceil() as usize;
        let half_cols = (radius_m / spacing_m.1).ceil() as usize;
        let shape = (2 * half_rows + 1, 2 * half_cols + 1);

        let mut weights = Array2::zeros(shape);
        for ((i, j), w) in weights.indexed_iter_mut() {
            let dy = (i as f64 - half_rows as f64) * spacing_m.0;
            let dx = (j as f64 - half_cols as f64) * spacing_m.1;
            let dist = (dy * dy + dx * dx).sqrt();
            let inside = dist <= radius_m
                && inner_radius_m.map_or(true, |inner| dist >= inner);
            if inside {
                *w = 1.0;
            }
        }

        let sum: f32 = weights.sum();
        if sum <= 0.0 {
            return Err(ShadowError::Processing(
                "empty search kernel: inner radius swallows the disc".to_string(),
            ));
        }
        weights.mapv_inplace(|w| w / sum);

        Ok(Self {
            weights,
            half_rows,
            half_cols,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        self.weights.dim()
    }

    pub fn half_size(&self) -> (usize, usize) {
        (self.half_rows, self.half_cols)
    }
}

/// Convolve a binary mask with a kernel under border-replicate padding
///
/// The block is extended by the kernel half-size on every side with copies
/// of its border rows/columns, convolved, and cropped back to the block
/// shape, so border fractions see a plausible neighborhood instead of
/// zeros.
pub fn convolve_replicate(mask: &ArrayView2<bool>, kernel: &SearchKernel) -> Raster {
    let (height, width) = mask.dim();
    if height == 0 || width == 0 {
        return Raster::zeros((height, width));
    }
    let (hr, hc) = (kernel.half_rows, kernel.half_cols);

    let mut padded = Array2::<f32>::zeros((height + 2 * hr, width + 2 * hc));
    for i in 0..height + 2 * hr {
        let src_i = i.saturating_sub(hr).min(height - 1);
        for j in 0..width + 2 * hc {
            let src_j = j.saturating_sub(hc).min(width - 1);
            padded[[i, j]] = if mask[[src_i, src_j]] { 1.0 } else { 0.0 };
        }
    }

    let mut out = Array2::<f32>::zeros((height, width));
    let kernel_view = &kernel.weights;

    let compute_row = |i: usize, row_out: &mut [f32]| {
        for (j, out_val) in row_out.iter_mut().enumerate() {
            let window = padded.slice(s![i..i + 2 * hr + 1, j..j + 2 * hc + 1]);
            let mut acc = 0.0f32;
            for (w, v) in kernel_view.iter().zip(window.iter()) {
                acc += w * v;
            }
            *out_val = acc;
        }
    };

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        let rows: Vec<Vec<f32>> = (0..height)
            .into_par_iter()
            .map(|i| {
                let mut row = vec![0.0f32; width];
                compute_row(i, &mut row);
                row
            })
            .collect();
        for (i, row) in rows.into_iter().enumerate() {
            for (j, v) in row.into_iter().enumerate() {
                out[[i, j]] = v;
            }
        }
    }

    #[cfg(not(feature = "parallel"))]
    {
        for i in 0..height {
            let mut row = vec![0.0f32; width];
            compute_row(i, &mut row);
            for (j, v) in row.into_iter().enumerate() {
                out[[i, j]] = v;
            }
        }
    }

    out
}

/// Restricts the expensive ray casting to plausible cloud-border pixels
///
/// The swath is processed in along-track blocks; each block gets a kernel
/// whose radius follows the block's median solar zenith, so low sun -- and
/// therefore long shadows -- widens the searched border band.
#[derive(Debug, Clone)]
pub struct SearchAreaPruner {
    cloud_top_height: f64,
    pixel_spacing: f64,
    block_rows: usize,
    cloud_fraction_bounds: (f32, f32),
    land_fraction_floor: f32,
    kernel_inner_radius: Option<f64>,
}

impl SearchAreaPruner {
    pub fn from_config(config: &ShadowConfig) -> Self {
        Self {
            cloud_top_height: config.cloud_top_height,
            pixel_spacing: config.pixel_spacing,
            block_rows: config.block_rows.max(1),
            cloud_fraction_bounds: config.cloud_fraction_bounds,
            land_fraction_floor: config.land_fraction_floor,
            kernel_inner_radius: config.kernel_inner_radius,
        }
    }

    /// Kernel radius in meters for a block's solar zenith distribution
    pub fn kernel_radius(&self, solar_zenith: &ArrayView2<f32>) -> f64 {
        let median = median_f32(solar_zenith);
        self.cloud_top_height * (median as f64).to_radians().tan().max(0.0)
    }

    /// Flag search-start candidates within one along-track block
    pub fn prune_block(
        &self,
        cloud: &ArrayView2<bool>,
        land: &ArrayView2<bool>,
        solar_zenith: &ArrayView2<f32>,
    ) -> ShadowResult<BoolRaster> {
        let shape = cloud.dim();
        if land.dim() != shape || solar_zenith.dim() != shape {
            return Err(ShadowError::ShapeMismatch {
                expected: shape,
                actual: land.dim(),
            });
        }

        let radius = self.kernel_radius(solar_zenith);
        let spacing = (self.pixel_spacing, self.pixel_spacing);
        let kernel = match self.kernel_inner_radius {
            Some(inner) => SearchKernel::annulus(radius, inner, spacing)?,
            None => SearchKernel::disc(radius, spacing)?,
        };
        log::debug!(
            "pruning block {:?} with kernel {:?} (radius {:.0} m)",
            shape,
            kernel.shape(),
            radius
        );

        let cloud_fraction = convolve_replicate(cloud, &kernel);
        let land_fraction = convolve_replicate(land, &kernel);

        let (lo, hi) = self.cloud_fraction_bounds;
        let floor = self.land_fraction_floor;
        let mut candidates = BoolRaster::from_elem(shape, false);
        for ((i, j), flag) in candidates.indexed_iter_mut() {
            let cf = cloud_fraction[[i, j]];
            *flag = cf > lo && cf < hi && land_fraction[[i, j]] > floor;
        }
        Ok(candidates)
    }

    /// Flag candidates over the whole swath, block by block
    pub fn prune_swath(
        &self,
        cloud: &BoolRaster,
        land: &BoolRaster,
        solar_zenith: &Raster,
    ) -> ShadowResult<BoolRaster> {
        let (height, width) = cloud.dim();
        let mut out = BoolRaster::from_elem((height, width), false);
        for (start, end) in block_bounds(height, self.block_rows) {
            let block = self.prune_block(
                &cloud.slice(s![start..end, ..]),
                &land.slice(s![start..end, ..]),
                &solar_zenith.slice(s![start..end, ..]),
            )?;
            out.slice_mut(s![start..end, ..]).assign(&block);
        }
        Ok(out)
    }
}

/// Along-track block boundaries; a short tail is merged into the last block
pub fn block_bounds(height: usize, block_rows: usize) -> Vec<(usize, usize)> {
    let block_rows = block_rows.max(1);
    let mut starts: Vec<usize> = (0..height).step_by(block_rows).collect();
    if starts.is_empty() {
        return Vec::new();
    }
    if starts.len() > 1 {
        starts.pop();
    }
    starts
        .iter()
        .enumerate()
        .map(|(i, &s)| {
            let end = starts.get(i + 1).copied().unwrap_or(height);
            (s, end)
        })
        .collect()
}

fn median_f32(values: &ArrayView2<f32>) -> f32 {
    let mut sorted: Vec<f32> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    #[test]
    fn test_kernel_is_normalized() {
        let kernel = SearchKernel::disc(3500.0, (1000.0, 1000.0)).unwrap();
        assert_eq!(kernel.shape(), (9, 9));
        assert_abs_diff_eq!(kernel.weights.sum(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_kernel_radius_grows_with_solar_zenith() {
        let pruner = SearchAreaPruner::from_config(&ShadowConfig::default());
        let low_sun = Array2::from_elem((4, 4), 70.0f32);
        let high_sun = Array2::from_elem((4, 4), 30.0f32);
        assert!(pruner.kernel_radius(&low_sun.view()) > pruner.kernel_radius(&high_sun.view()));
    }

    #[test]
    fn test_annulus_removes_center() {
        let kernel = SearchKernel::annulus(3000.0, 1500.0, (1000.0, 1000.0)).unwrap();
        let (hr, hc) = kernel.half_size();
        assert_eq!(kernel.weights[[hr, hc]], 0.0);
        assert!(kernel.weights.sum() > 0.0);
    }

    #[test]
    fn test_empty_annulus_rejected() {
        assert!(SearchKernel::annulus(1000.0, 5000.0, (1000.0, 1000.0)).is_err());
    }

    #[test]
    fn test_convolution_of_uniform_mask() {
        let kernel = SearchKernel::disc(2000.0, (1000.0, 1000.0)).unwrap();
        let ones = BoolRaster::from_elem((10, 12), true);
        let fractions = convolve_replicate(&ones.view(), &kernel);
        // replicate padding keeps uniform masks exactly uniform
        for &f in fractions.iter() {
            assert_abs_diff_eq!(f, 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_convolution_of_empty_mask() {
        let kernel = SearchKernel::disc(2000.0, (1000.0, 1000.0)).unwrap();
        let no_rows = BoolRaster::from_elem((0, 5), false);
        assert_eq!(convolve_replicate(&no_rows.view(), &kernel).dim(), (0, 5));
        let no_cols = BoolRaster::from_elem((5, 0), false);
        assert_eq!(convolve_replicate(&no_cols.view(), &kernel).dim(), (5, 0));
    }

    #[test]
    fn test_pruner_skips_uniform_blocks() {
        let pruner = SearchAreaPruner::from_config(&ShadowConfig::default());
        let sza = Array2::from_elem((20, 20), 60.0f32);
        let land = BoolRaster::from_elem((20, 20), true);

        let all_cloud = BoolRaster::from_elem((20, 20), true);
        let none = pruner
            .prune_block(&all_cloud.view(), &land.view(), &sza.view())
            .unwrap();
        assert!(none.iter().all(|&c| !c));

        let no_cloud = BoolRaster::from_elem((20, 20), false);
        let none = pruner
            .prune_block(&no_cloud.view(), &land.view(), &sza.view())
            .unwrap();
        assert!(none.iter().all(|&c| !c));
    }

    #[test]
    fn test_pruner_flags_cloud_border() {
        let pruner = SearchAreaPruner::from_config(&ShadowConfig::default());
        let sza = Array2::from_elem((30, 30), 60.0f32);
        let land = BoolRaster::from_elem((30, 30), true);
        let mut cloud = BoolRaster::from_elem((30, 30), false);
        for i in 12..18 {
            for j in 12..18 {
                cloud[[i, j]] = true;
            }
        }

        let candidates = pruner
            .prune_block(&cloud.view(), &land.view(), &sza.view())
            .unwrap();
        // the cloud edge itself must be searchable
        assert!(candidates[[12, 12]]);
        assert!(candidates.iter().any(|&c| c));
    }

    #[test]
    fn test_candidates_require_land() {
        let pruner = SearchAreaPruner::from_config(&ShadowConfig::default());
        let sza = Array2::from_elem((30, 30), 60.0f32);
        let sea = BoolRaster::from_elem((30, 30), false);
        let mut cloud = BoolRaster::from_elem((30, 30), false);
        cloud[[15, 15]] = true;

        let candidates = pruner
            .prune_block(&cloud.view(), &sea.view(), &sza.view())
            .unwrap();
        assert!(candidates.iter().all(|&c| !c));
    }

    #[test]
    fn test_prune_swath_assembles_blocks() {
        let mut config = ShadowConfig::default();
        config.block_rows = 10;
        let pruner = SearchAreaPruner::from_config(&config);

        let (height, width) = (25, 20);
        // distinct sun elevation per block so the kernels differ
        let mut sza = Array2::from_elem((height, width), 40.0f32);
        for i in 10..height {
            sza.row_mut(i).fill(65.0);
        }
        let land = BoolRaster::from_elem((height, width), true);
        let mut cloud = BoolRaster::from_elem((height, width), false);
        for i in 4..20 {
            for j in 8..12 {
                cloud[[i, j]] = true;
            }
        }

        let swath = pruner.prune_swath(&cloud, &land, &sza).unwrap();
        assert_eq!(swath.dim(), (height, width));
        assert!(swath.iter().any(|&c| c));

        // blockwise assembly matches running each block on its own
        let mut expected = BoolRaster::from_elem((height, width), false);
        for (start, end) in block_bounds(height, config.block_rows) {
            let block = pruner
                .prune_block(
                    &cloud.slice(s![start..end, ..]),
                    &land.slice(s![start..end, ..]),
                    &sza.slice(s![start..end, ..]),
                )
                .unwrap();
            expected.slice_mut(s![start..end, ..]).assign(&block);
        }
        assert_eq!(swath, expected);
    }

    #[test]
    fn test_block_bounds_merge_tail() {
        assert_eq!(block_bounds(5000, 2000), vec![(0, 2000), (2000, 5000)]);
        assert_eq!(block_bounds(1500, 2000), vec![(0, 1500)]);
        // a trailing partial block is absorbed by its predecessor
        assert_eq!(block_bounds(4000, 2000), vec![(0, 4000)]);
        assert_eq!(
            block_bounds(6500, 2000),
            vec![(0, 2000), (2000, 4000), (4000, 6500)]
        );
    }
}
