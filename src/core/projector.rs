use crate::types::GeometryPixel;

/// Scene-level constants of the ray projection
#[derive(Debug, Clone, Copy)]
pub struct ProjectorParams {
    /// Ground pixel spacing in meters
    pub pixel_spacing: f64,
    /// Assumed cloud-top height in meters
    pub cloud_top_height: f64,
    /// Minimum surface altitude of the scene in meters
    pub min_surface_altitude: f64,
}

/// Discrete shadow search path of one cloud pixel
///
/// Offsets are (d_col, d_row) relative to the source pixel, ordered
/// nearest-first; each offset carries the theoretical ray height at that
/// cell. A single height-matching tolerance applies to the whole path.
#[derive(Debug, Clone, Default)]
pub struct ShadowPath {
    pub offsets: Vec<(i32, i32)>,
    pub heights: Vec<f32>,
    pub tolerance: f32,
}

impl ShadowPath {
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

// Half the diagonal of a unit cell: a line passing closer than this to a
// cell center touches the cell.
const TOUCH_DISTANCE: f64 = std::f64::consts::SQRT_2 * 0.5;

fn signum_or_zero(v: f64) -> f64 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Project the shadow ray of one cloud pixel onto the pixel grid
///
/// Rotates the solar azimuth into the pixel-local frame, corrects the
/// solar zenith for the parallax of the sensor view angle, rasterizes the
/// ray's ground track as a thick line, and attaches the ray's theoretical
/// height to every touched cell. Degenerate sun geometry yields an empty
/// path, never an error.
pub fn project(geom: &GeometryPixel, params: &ProjectorParams) -> ShadowPath {
    let rel_azimuth = geom.solar_azimuth as f64 - geom.orientation as f64;
    let shadow_angle = rel_azimuth + 180.0;
    // snap axis-aligned directions so a vanishing component does not skew
    // the endpoint nudge sideways
    let snap = |v: f64| if v.abs() < 1e-12 { 0.0 } else { v };
    let dir_x = snap((shadow_angle.to_radians() - std::f64::consts::FRAC_PI_2).cos());
    let dir_y = snap((shadow_angle.to_radians() - std::f64::consts::FRAC_PI_2).sin());

    let sza = geom.solar_zenith as f64;
    if !(0.5..=89.5).contains(&sza) {
        return ShadowPath::default();
    }

    // view-zenith parallax: both swath halves must throw a consistent
    // effective zenith, so tan(vza) is added or removed depending on the
    // shadow direction and the side of the nadir line
    let tan_sza = sza.to_radians().tan();
    let tan_vza = (geom.view_zenith as f64).to_radians().tan();
    let toward = rel_azimuth < 180.0;
    let left_of_nadir = geom.nadir_side < 0.0;
    let eff_tan = match (toward, left_of_nadir) {
        (true, true) => tan_sza - tan_vza,
        (true, false) => tan_sza + tan_vza,
        (false, true) => tan_sza + tan_vza,
        (false, false) => tan_sza - tan_vza,
    };
    if !eff_tan.is_finite() || eff_tan < 1e-6 {
        return ShadowPath::default();
    }

    let drop = params.cloud_top_height - params.min_surface_altitude;
    if drop <= 0.0 {
        return ShadowPath::default();
    }

    let throw_x = drop * eff_tan * dir_x / params.pixel_spacing;
    let throw_y = drop * eff_tan * dir_y / params.pixel_spacing;
    // nudge the endpoint outward so the rasterized path covers the tip
    let end_x = throw_x + 1.5 * signum_or_zero(throw_x);
    let end_y = throw_y + 1.5 * signum_or_zero(throw_y);

    let line_len_sq = end_x * end_x + end_y * end_y;
    if line_len_sq <= 0.0 {
        return ShadowPath::default();
    }
    let line_len = line_len_sq.sqrt();

    let span_x = end_x.round() as i64;
    let span_y = end_y.round() as i64;

    let mut offsets: Vec<(i32, i32)> = Vec::new();
    for dx in span_x.min(0)..=span_x.max(0) {
        for dy in span_y.min(0)..=span_y.max(0) {
            // perpendicular distance of the cell center to the ray line
            let dist = (dx as f64 * end_y - dy as f64 * end_x).abs() / line_len;
            if dist <= TOUCH_DISTANCE {
                offsets.push((dx as i32, dy as i32));
            }
        }
    }

    // index 0 nearest the source pixel
    offsets.sort_by_key(|&(dx, dy)| (dx as i64) * (dx as i64) + (dy as i64) * (dy as i64));

    let heights: Vec<f32> = offsets
        .iter()
        .map(|&(dx, dy)| {
            let dist_px = ((dx as f64).powi(2) + (dy as f64).powi(2)).sqrt();
            (params.cloud_top_height - dist_px * params.pixel_spacing / eff_tan) as f32
        })
        .collect();

    let tolerance = (1000.0 / eff_tan) as f32;

    ShadowPath {
        offsets,
        heights,
        tolerance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn nadir_geom(solar_zenith: f32, solar_azimuth: f32, orientation: f32) -> GeometryPixel {
        GeometryPixel {
            solar_zenith,
            solar_azimuth,
            view_zenith: 0.0,
            nadir_side: 1.0,
            orientation,
        }
    }

    fn params(cth: f64, min_alt: f64) -> ProjectorParams {
        ProjectorParams {
            pixel_spacing: 1000.0,
            cloud_top_height: cth,
            min_surface_altitude: min_alt,
        }
    }

    #[test]
    fn test_throw_length_matches_analytic_magnitude() {
        // sza 45 deg, relative azimuth 90 deg, nadir view
        let path = project(&nadir_geom(45.0, 90.0, 0.0), &params(6000.0, 0.0));
        assert!(!path.is_empty());

        let analytic_px = 6000.0 * 45f64.to_radians().tan() / 1000.0;
        let max_dist = path
            .offsets
            .iter()
            .map(|&(dx, dy)| ((dx * dx + dy * dy) as f64).sqrt())
            .fold(0.0, f64::max);
        // endpoint carries the 1.5 px outward nudge
        assert!((max_dist - (analytic_px + 1.5)).abs() <= 1.0);
    }

    #[test]
    fn test_relative_azimuth_90_throws_west() {
        let path = project(&nadir_geom(45.0, 90.0, 0.0), &params(6000.0, 0.0));
        for &(dx, dy) in &path.offsets {
            assert!(dx <= 0);
            assert_eq!(dy, 0);
        }
        assert!(path.offsets.iter().any(|&(dx, _)| dx < -4));
    }

    #[test]
    fn test_azimuth_aligned_with_north_throws_south() {
        // saa == orientation: shadow falls along increasing rows
        let path = project(&nadir_geom(60.0, 135.0, 135.0), &params(6000.0, 0.0));
        assert!(!path.is_empty());
        for &(dx, dy) in &path.offsets {
            assert_eq!(dx, 0);
            assert!(dy >= 0);
        }
        let max_dy = path.offsets.iter().map(|&(_, dy)| dy).max().unwrap();
        let analytic_px = 6000.0 * 60f64.to_radians().tan() / 1000.0;
        assert!((max_dy as f64 - (analytic_px + 1.5)).abs() <= 1.0);
    }

    #[test]
    fn test_path_ordered_nearest_first() {
        let path = project(&nadir_geom(55.0, 210.0, 12.0), &params(6000.0, -65.0));
        let dists: Vec<f64> = path
            .offsets
            .iter()
            .map(|&(dx, dy)| ((dx * dx + dy * dy) as f64).sqrt())
            .collect();
        for pair in dists.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        assert_eq!(path.offsets[0], (0, 0));
    }

    #[test]
    fn test_heights_descend_along_path() {
        let path = project(&nadir_geom(50.0, 30.0, 0.0), &params(6000.0, 0.0));
        assert_abs_diff_eq!(path.heights[0], 6000.0, epsilon = 1e-3);
        for pair in path.heights.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
    }

    #[test]
    fn test_tolerance_follows_effective_zenith() {
        let steep = project(&nadir_geom(30.0, 90.0, 0.0), &params(6000.0, 0.0));
        let flat = project(&nadir_geom(70.0, 90.0, 0.0), &params(6000.0, 0.0));
        // low sun (large zenith) tolerates less height mismatch per meter
        assert!(steep.tolerance > flat.tolerance);
    }

    #[test]
    fn test_view_zenith_shifts_effective_zenith() {
        let mut geom = nadir_geom(45.0, 90.0, 0.0);
        geom.view_zenith = 20.0;
        geom.nadir_side = 1.0; // relative azimuth < 180 and right of nadir: additive
        let widened = project(&geom, &params(6000.0, 0.0));

        geom.nadir_side = -1.0; // left of nadir: subtractive
        let narrowed = project(&geom, &params(6000.0, 0.0));

        assert!(widened.len() > narrowed.len());
        assert!(widened.tolerance < narrowed.tolerance);
    }

    #[test]
    fn test_degenerate_angles_yield_empty_path() {
        // sun at zenith
        assert!(project(&nadir_geom(0.0, 90.0, 0.0), &params(6000.0, 0.0)).is_empty());
        // sun at the horizon
        assert!(project(&nadir_geom(90.0, 90.0, 0.0), &params(6000.0, 0.0)).is_empty());
        // view correction cancels the solar zenith entirely
        let mut geom = nadir_geom(45.0, 90.0, 0.0);
        geom.view_zenith = 45.0;
        geom.nadir_side = -1.0;
        assert!(project(&geom, &params(6000.0, 0.0)).is_empty());
    }

    #[test]
    fn test_cloud_below_surface_yields_empty_path() {
        assert!(project(&nadir_geom(45.0, 90.0, 0.0), &params(100.0, 200.0)).is_empty());
    }
}
