use crate::types::{ShadowError, ShadowResult};

/// Reference pressure ladder of the meteorological temperature profile, hPa
pub const PRESSURE_LEVELS: [f64; 25] = [
    1000.0, 950.0, 925.0, 900.0, 850.0, 800.0, 700.0, 600.0, 500.0, 400.0, 300.0, 250.0, 200.0,
    150.0, 100.0, 70.0, 50.0, 30.0, 20.0, 10.0, 7.0, 5.0, 3.0, 2.0, 1.0,
];

/// One candidate cloud-top height with its independent crosscheck
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightPair {
    /// Barometric height from the interpolated profile, meters
    pub height: f64,
    /// Exponential-atmosphere crosscheck height, meters
    pub crosscheck: f64,
}

/// Outcome of a brightness-temperature inversion
///
/// T(p) is not monotonic, so a brightness temperature can bracket the
/// profile in a "normal" segment (temperature decreasing with altitude)
/// and in an "inverted" segment (temperature increasing, e.g. above a
/// stratospheric inversion) at the same time. Both candidates are kept;
/// the ambiguity is physical and must not be collapsed here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BtInversion {
    /// Brightness temperature outside the profile's temperature range
    Unresolved,
    Resolved {
        normal: Option<HeightPair>,
        inverted: Option<HeightPair>,
    },
}

impl BtInversion {
    /// All candidate pairs, zero to two entries
    pub fn candidates(&self) -> Vec<HeightPair> {
        match self {
            BtInversion::Unresolved => Vec::new(),
            BtInversion::Resolved { normal, inverted } => {
                normal.iter().chain(inverted.iter()).copied().collect()
            }
        }
    }
}

/// Barometric height for a cloud-top pressure and ambient temperature
///
/// `ctp` and `p0` in hPa, `ts` in Kelvin, result in meters.
pub fn barometric_height(ctp: f64, p0: f64, ts: f64) -> f64 {
    -ts * ((ctp / p0).powf(1.0 / 5.255) - 1.0) / 0.0065
}

/// Scale-height estimate from pressure alone: `-8000 * ln(p / 1013)`
pub fn exponential_atmosphere_height(pressure: f64) -> f64 {
    -8000.0 * (pressure / 1013.0).ln()
}

fn check_profile(profile: &[f64]) -> ShadowResult<()> {
    if profile.len() != PRESSURE_LEVELS.len() {
        return Err(ShadowError::Processing(format!(
            "temperature profile has {} levels, expected {}",
            profile.len(),
            PRESSURE_LEVELS.len()
        )));
    }
    Ok(())
}

/// Height from cloud-top pressure via the profile-interpolated temperature
///
/// The profile temperature is interpolated linearly between the two ladder
/// levels bracketing `ctp`; pressures above the 1000 hPa end reuse the
/// first pair, pressures below the 1 hPa end extrapolate from the top two
/// levels. `surface_pressure` in hPa, result in meters.
pub fn height_from_pressure(
    ctp: f64,
    surface_pressure: f64,
    profile: &[f64],
) -> ShadowResult<f64> {
    check_profile(profile)?;
    let n = PRESSURE_LEVELS.len();

    let (i, j) = if ctp >= PRESSURE_LEVELS[0] {
        (0, 1)
    } else if ctp < PRESSURE_LEVELS[n - 1] {
        // CTP below 1 hPa should never happen; extrapolate from the top
        (n - 2, n - 1)
    } else {
        let mut bracket = (n - 2, n - 1);
        for k in 0..n - 1 {
            if ctp <= PRESSURE_LEVELS[k] && ctp > PRESSURE_LEVELS[k + 1] {
                bracket = (k, k + 1);
                break;
            }
        }
        bracket
    };

    let (p1, p2) = (PRESSURE_LEVELS[i], PRESSURE_LEVELS[j]);
    let (t1, t2) = (profile[i], profile[j]);
    let ts = (t2 - t1) / (p2 - p1) * (ctp - p1) + t1;
    Ok(barometric_height(ctp, surface_pressure, ts))
}

/// Invert a brightness temperature against the temperature profile
///
/// Scans every adjacent ladder pair; a normal bracket and an inverted
/// bracket each contribute one candidate pressure, converted to a
/// barometric height plus an exponential-atmosphere crosscheck.
pub fn height_from_brightness_temperature(
    bt: f64,
    surface_pressure: f64,
    profile: &[f64],
) -> ShadowResult<BtInversion> {
    check_profile(profile)?;

    let t_min = profile.iter().copied().fold(f64::INFINITY, f64::min);
    let t_max = profile.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if bt < t_min || bt > t_max {
        return Ok(BtInversion::Unresolved);
    }

    let mut normal = None;
    let mut inverted = None;

    for i in 0..PRESSURE_LEVELS.len() - 1 {
        let (p1, p2) = (PRESSURE_LEVELS[i], PRESSURE_LEVELS[i + 1]);
        let (t1, t2) = (profile[i], profile[i + 1]);

        // ladder index grows with altitude: t1 > t2 is the normal lapse
        let pair_for = |ctp: f64| HeightPair {
            height: barometric_height(ctp, surface_pressure, bt),
            crosscheck: exponential_atmosphere_height(ctp),
        };

        if bt < t1 && bt > t2 {
            let ctp = (p2 - p1) / (t2 - t1) * (bt - t1) + p1;
            normal = Some(pair_for(ctp));
        }
        if bt > t1 && bt < t2 {
            let ctp = (p2 - p1) / (t2 - t1) * (bt - t1) + p1;
            inverted = Some(pair_for(ctp));
        }
    }

    Ok(BtInversion::Resolved { normal, inverted })
}
