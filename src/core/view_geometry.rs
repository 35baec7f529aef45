use crate::types::{NadirCorrection, Raster, ShadowError, ShadowResult};

/// Degree-2 least-squares polynomial fit
///
/// Returns the coefficients `(a, b, c)` of `a*x^2 + b*x + c` from the
/// normal equations, solved with a partially pivoted 3x3 elimination.
pub fn polyfit2(xs: &[f64], ys: &[f64]) -> ShadowResult<(f64, f64, f64)> {
    if xs.len() != ys.len() || xs.len() < 3 {
        return Err(ShadowError::Processing(format!(
            "polynomial fit needs at least 3 samples, got {}",
            xs.len()
        )));
    }

    let mut s = [0.0f64; 5]; // sums of x^0 .. x^4
    let mut b = [0.0f64; 3]; // sums of y, x*y, x^2*y
    for (&x, &y) in xs.iter().zip(ys.iter()) {
        let x2 = x * x;
        s[0] += 1.0;
        s[1] += x;
        s[2] += x2;
        s[3] += x2 * x;
        s[4] += x2 * x2;
        b[0] += y;
        b[1] += x * y;
        b[2] += x2 * y;
    }

    // normal matrix ordered for coefficients (a, b, c)
    let mut m = [
        [s[4], s[3], s[2], b[2]],
        [s[3], s[2], s[1], b[1]],
        [s[2], s[1], s[0], b[0]],
    ];

    for col in 0..3 {
        let pivot_row = (col..3)
            .max_by(|&i, &j| m[i][col].abs().total_cmp(&m[j][col].abs()))
            .unwrap_or(col);
        m.swap(col, pivot_row);
        let pivot = m[col][col];
        if pivot.abs() < 1e-12 {
            return Err(ShadowError::Processing(
                "degenerate polynomial fit: singular normal matrix".to_string(),
            ));
        }
        for row in col + 1..3 {
            let factor = m[row][col] / pivot;
            for k in col..4 {
                m[row][k] -= factor * m[col][k];
            }
        }
    }

    let c = m[2][3] / m[2][2];
    let bc = (m[1][3] - m[1][2] * c) / m[1][1];
    let a = (m[0][3] - m[0][2] * c - m[0][1] * bc) / m[0][0];
    Ok((a, bc, c))
}

fn eval2(coeffs: (f64, f64, f64), x: f64) -> f64 {
    coeffs.0 * x * x + coeffs.1 * x + coeffs.2
}

/// Repairs the view-angle discontinuity at the sensor's nadir crossover
///
/// Certain view-angle rasters are corrupted in a fixed cross-track window
/// around the nadir line. Each row is repaired independently: a quadratic
/// fit to the clean samples on either side is extended across the adjacent
/// corrupted sub-window, shifted so it matches the sample at the window
/// boundary. Columns outside the corrupted window are untouched.
#[derive(Debug, Clone)]
pub struct ViewGeometryCorrector {
    params: NadirCorrection,
}

impl ViewGeometryCorrector {
    pub fn new(params: NadirCorrection) -> Self {
        Self { params }
    }

    fn validate(&self, width: usize) -> ShadowResult<(usize, usize, usize, usize, usize)> {
        let (b0, b1) = self.params.fit_before;
        let (a0, a1) = self.params.fit_after;
        let a1 = a1.min(width);
        let cross = self.params.crossover;

        if !(b0 < b1 && b1 <= cross && cross <= a0 && a0 < a1 && a1 <= width) {
            return Err(ShadowError::Processing(format!(
                "nadir correction windows [{},{}) / [{},{}) with crossover {} do not fit width {}",
                b0, b1, a0, a1, cross, width
            )));
        }
        Ok((b0, b1, a0, a1, cross))
    }

    /// Repair a single cross-track line in place
    pub fn correct_row(&self, row: &mut [f32]) -> ShadowResult<()> {
        let (b0, b1, a0, a1, cross) = self.validate(row.len())?;

        // left fit, spliced into [b1, cross)
        let xs: Vec<f64> = (b0..b1).map(|x| x as f64).collect();
        let ys: Vec<f64> = row[b0..b1].iter().map(|&v| v as f64).collect();
        let fit = polyfit2(&xs, &ys)?;
        let delta = row[b1] as f64 - eval2(fit, b1 as f64);
        for x in b1..cross {
            row[x] = (eval2(fit, x as f64) + delta) as f32;
        }

        // right fit, spliced into [cross, a0)
        let xs: Vec<f64> = (a0..a1).map(|x| x as f64).collect();
        let ys: Vec<f64> = row[a0..a1].iter().map(|&v| v as f64).collect();
        let fit = polyfit2(&xs, &ys)?;
        let delta = row[a0] as f64 - eval2(fit, a0 as f64);
        for x in cross..a0 {
            row[x] = (eval2(fit, x as f64) + delta) as f32;
        }

        Ok(())
    }

    /// Repair every row of a view-angle raster
    pub fn correct(&self, raster: &mut Raster) -> ShadowResult<()> {
        let width = raster.ncols();
        self.validate(width)?;
        log::debug!(
            "repairing nadir discontinuity at column {} over {} rows",
            self.params.crossover,
            raster.nrows()
        );
        for mut row in raster.rows_mut() {
            let slice = row.as_slice_mut().ok_or_else(|| {
                ShadowError::Processing("non-contiguous raster row".to_string())
            })?;
            self.correct_row(slice)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    #[test]
    fn test_polyfit2_recovers_quadratic() {
        let xs: Vec<f64> = (0..20).map(|x| x as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|&x| 0.5 * x * x - 3.0 * x + 7.0).collect();
        let (a, b, c) = polyfit2(&xs, &ys).unwrap();
        assert_abs_diff_eq!(a, 0.5, epsilon = 1e-8);
        assert_abs_diff_eq!(b, -3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(c, 7.0, epsilon = 1e-5);
    }

    #[test]
    fn test_polyfit2_rejects_short_input() {
        assert!(polyfit2(&[0.0, 1.0], &[1.0, 2.0]).is_err());
    }

    fn corrupted_line(width: usize, params: &NadirCorrection) -> Vec<f32> {
        // smooth quadratic signal, wrecked inside the corrupted window
        let mut line: Vec<f32> = (0..width)
            .map(|x| {
                let x = x as f64;
                (0.01 * x * x - 0.4 * x + 120.0) as f32
            })
            .collect();
        for x in params.fit_before.1..params.fit_after.0 {
            line[x] = -999.0;
        }
        // boundary samples anchor the splice offset
        line[params.fit_before.1] = {
            let x = params.fit_before.1 as f64;
            (0.01 * x * x - 0.4 * x + 120.0) as f32
        };
        line[params.fit_after.0] = {
            let x = params.fit_after.0 as f64;
            (0.01 * x * x - 0.4 * x + 120.0) as f32
        };
        line
    }

    #[test]
    fn test_corrupted_window_is_repaired() {
        let params = NadirCorrection {
            fit_before: (0, 40),
            fit_after: (70, 110),
            crossover: 55,
        };
        let corrector = ViewGeometryCorrector::new(params);
        let width = 110;
        let mut line = corrupted_line(width, &params);
        corrector.correct_row(&mut line).unwrap();

        for (x, &v) in line.iter().enumerate() {
            let xf = x as f64;
            let truth = (0.01 * xf * xf - 0.4 * xf + 120.0) as f32;
            assert_abs_diff_eq!(v, truth, epsilon = 1e-2);
        }
    }

    #[test]
    fn test_clean_columns_untouched() {
        let params = NadirCorrection {
            fit_before: (0, 40),
            fit_after: (70, 110),
            crossover: 55,
        };
        let corrector = ViewGeometryCorrector::new(params);
        let mut line = corrupted_line(110, &params);
        let before = line.clone();
        corrector.correct_row(&mut line).unwrap();

        for x in (0..40).chain(70..110) {
            assert_eq!(line[x], before[x]);
        }
    }

    #[test]
    fn test_correct_full_raster() {
        let params = NadirCorrection {
            fit_before: (0, 40),
            fit_after: (70, 100),
            crossover: 55,
        };
        let corrector = ViewGeometryCorrector::new(params);
        let mut raster = Array2::from_shape_fn((5, 100), |(_, x)| {
            let x = x as f64;
            (0.02 * x * x + 1.0) as f32
        });
        corrector.correct(&mut raster).unwrap();
        // smooth input stays smooth within fit tolerance
        for &v in raster.iter() {
            assert!(v.is_finite());
        }
    }

    #[test]
    fn test_bad_windows_rejected() {
        let params = NadirCorrection {
            fit_before: (0, 60),
            fit_after: (40, 100),
            crossover: 50,
        };
        let corrector = ViewGeometryCorrector::new(params);
        let mut line = vec![0.0f32; 100];
        assert!(corrector.correct_row(&mut line).is_err());
    }
}
