use crate::types::{Raster, ShadowError, ShadowResult};

/// Local bearing of the pixel grid against true north, radians
///
/// Computed from two geolocation samples straddling a pixel along the
/// cross-track direction. Positive angles rotate the grid's "up" away from
/// north; callers convert to degrees for the projector.
pub fn local_orientation(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    (-(lat2 - lat1)).atan2((lon2 - lon1) * lat1.to_radians().cos())
}

/// Natural cubic spline through sorted sample points
///
/// Evaluation outside the sample range continues the boundary segment's
/// cubic, which realizes the surface-fit extrapolation at swath edges.
#[derive(Debug, Clone)]
struct CubicSpline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    // per-segment coefficients: S(x) = y + b*dx + c*dx^2 + d*dx^3
    b: Vec<f64>,
    c: Vec<f64>,
    d: Vec<f64>,
}

impl CubicSpline {
    fn fit(xs: Vec<f64>, ys: Vec<f64>) -> ShadowResult<Self> {
        let n = xs.len();
        if n != ys.len() || n == 0 {
            return Err(ShadowError::Processing(
                "spline needs matching, non-empty samples".to_string(),
            ));
        }
        if n == 1 {
            return Ok(Self {
                xs,
                ys,
                b: vec![0.0],
                c: vec![0.0],
                d: vec![0.0],
            });
        }

        let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
        if h.iter().any(|&hi| hi <= 0.0) {
            return Err(ShadowError::Processing(
                "spline sample positions must be strictly increasing".to_string(),
            ));
        }

        // tridiagonal solve for the natural-boundary curvature terms
        let mut c = vec![0.0f64; n];
        if n > 2 {
            let mut l = vec![1.0f64; n];
            let mut mu = vec![0.0f64; n];
            let mut z = vec![0.0f64; n];
            for i in 1..n - 1 {
                let alpha = 3.0 * ((ys[i + 1] - ys[i]) / h[i] - (ys[i] - ys[i - 1]) / h[i - 1]);
                l[i] = 2.0 * (xs[i + 1] - xs[i - 1]) - h[i - 1] * mu[i - 1];
                mu[i] = h[i] / l[i];
                z[i] = (alpha - h[i - 1] * z[i - 1]) / l[i];
            }
            for i in (1..n - 1).rev() {
                c[i] = z[i] - mu[i] * c[i + 1];
            }
        }

        let mut b = vec![0.0f64; n - 1];
        let mut d = vec![0.0f64; n - 1];
        for i in 0..n - 1 {
            b[i] = (ys[i + 1] - ys[i]) / h[i] - h[i] * (c[i + 1] + 2.0 * c[i]) / 3.0;
            d[i] = (c[i + 1] - c[i]) / (3.0 * h[i]);
        }
        c.truncate(n - 1);

        Ok(Self { xs, ys, b, c, d })
    }

    fn eval(&self, x: f64) -> f64 {
        let n = self.xs.len();
        if n == 1 {
            return self.ys[0];
        }
        // clamp to boundary segments to extrapolate past the sample range
        let seg = match self.xs.binary_search_by(|probe| probe.total_cmp(&x)) {
            Ok(i) => i.min(n - 2),
            Err(i) => i.saturating_sub(1).min(n - 2),
        };
        let dx = x - self.xs[seg];
        self.ys[seg] + self.b[seg] * dx + self.c[seg] * dx * dx + self.d[seg] * dx * dx * dx
    }
}

/// Dense local-north bearing raster from sparse geolocation grids
///
/// Bearings are computed on a coarse node grid (fixed pixel stride) by
/// finite differences of the latitude/longitude grids, then spread to the
/// full resolution with a bicubic surface (tensor product of natural cubic
/// splines, one pass per axis).
#[derive(Debug, Clone)]
pub struct OrientationField {
    grid_step: usize,
}

impl OrientationField {
    pub fn new(grid_step: usize) -> Self {
        Self {
            grid_step: grid_step.max(1),
        }
    }

    /// Compute the degrees-from-north raster matching `lat`'s shape
    pub fn compute(&self, lat: &Raster, lon: &Raster) -> ShadowResult<Raster> {
        let (height, width) = lat.dim();
        if lon.dim() != (height, width) {
            return Err(ShadowError::ShapeMismatch {
                expected: (height, width),
                actual: lon.dim(),
            });
        }
        if height < 3 || width < 3 {
            return Err(ShadowError::Processing(format!(
                "orientation field needs at least a 3x3 scene, got {}x{}",
                height, width
            )));
        }

        let node_rows: Vec<usize> = (1..height - 1).step_by(self.grid_step).collect();
        let node_cols: Vec<usize> = (1..width - 1).step_by(self.grid_step).collect();
        log::debug!(
            "orientation nodes: {} x {} at stride {}",
            node_rows.len(),
            node_cols.len(),
            self.grid_step
        );

        // coarse bearings from +-1 column geolocation differences
        let mut nodes = Vec::with_capacity(node_rows.len() * node_cols.len());
        for &y in &node_rows {
            for &x in &node_cols {
                let bearing = local_orientation(
                    lat[[y, x - 1]] as f64,
                    lon[[y, x - 1]] as f64,
                    lat[[y, x + 1]] as f64,
                    lon[[y, x + 1]] as f64,
                );
                nodes.push(bearing.to_degrees());
            }
        }

        // pass 1: spline each node row across the full cross-track axis
        let col_pos: Vec<f64> = node_cols.iter().map(|&c| c as f64).collect();
        let mut intermediate = vec![0.0f64; node_rows.len() * width];
        for (iy, _) in node_rows.iter().enumerate() {
            let row_vals = nodes[iy * node_cols.len()..(iy + 1) * node_cols.len()].to_vec();
            let spline = CubicSpline::fit(col_pos.clone(), row_vals)?;
            for x in 0..width {
                intermediate[iy * width + x] = spline.eval(x as f64);
            }
        }

        // pass 2: spline each column across the full along-track axis
        let row_pos: Vec<f64> = node_rows.iter().map(|&r| r as f64).collect();
        let mut out = Raster::zeros((height, width));
        for x in 0..width {
            let col_vals: Vec<f64> = (0..node_rows.len())
                .map(|iy| intermediate[iy * width + x])
                .collect();
            let spline = CubicSpline::fit(row_pos.clone(), col_vals)?;
            for y in 0..height {
                out[[y, x]] = spline.eval(y as f64) as f32;
            }
        }

        Ok(out)
    }
}
