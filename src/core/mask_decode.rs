use crate::types::{BoolRaster, CloudMaskScheme, FlagRaster, ShadowError, ShadowResult};

/// Documented bit positions of the `confidence_in` band
pub mod confidence_bits {
    pub const COASTLINE: u32 = 1 << 0;
    pub const TIDAL: u32 = 1 << 2;
    pub const LAND: u32 = 1 << 3;
    pub const INLAND_WATER: u32 = 1 << 4;
    pub const DAY: u32 = 1 << 10;
    pub const SUMMARY_CLOUD: u32 = 1 << 14;
}

/// Documented bit positions of the `bayes_in` band
pub mod bayes_bits {
    pub const SINGLE_MODERATE: u32 = 1 << 1;
    pub const NO_BAYESIAN_DATA: u32 = 1 << 7;
}

/// Documented bit positions of the legacy `cloud_in` band
pub mod cloud_bits {
    pub const VISIBLE: u32 = 1 << 0;
    pub const GROSS_CLOUD: u32 = 1 << 7;
    pub const THIN_CIRRUS: u32 = 1 << 8;
    pub const MEDIUM_HIGH: u32 = 1 << 9;
}

fn any_bit_set(flags: &FlagRaster, mask: u32) -> BoolRaster {
    flags.mapv(|v| v & mask != 0)
}

/// Land mask: coastline, tidal, land or inland-water bit set
pub fn decode_land_mask(confidence: &FlagRaster) -> BoolRaster {
    any_bit_set(
        confidence,
        confidence_bits::COASTLINE
            | confidence_bits::TIDAL
            | confidence_bits::LAND
            | confidence_bits::INLAND_WATER,
    )
}

/// Daylight mask: day bit of the confidence band
pub fn decode_day_mask(confidence: &FlagRaster) -> BoolRaster {
    any_bit_set(confidence, confidence_bits::DAY)
}

/// Cloud mask from the confidence summary-cloud bit
pub fn decode_cloud_mask_confidence(confidence: &FlagRaster) -> BoolRaster {
    any_bit_set(confidence, confidence_bits::SUMMARY_CLOUD)
}

/// Cloud mask from the Bayesian single/moderate bit
///
/// Returns `None` when the no-Bayesian-data bit occurs anywhere in the
/// scene: the band carries no usable information scene-wide. That is a
/// normal fallback condition, not an error.
pub fn decode_cloud_mask_bayesian(bayes: &FlagRaster) -> Option<BoolRaster> {
    if bayes.iter().any(|&v| v & bayes_bits::NO_BAYESIAN_DATA != 0) {
        return None;
    }
    Some(any_bit_set(bayes, bayes_bits::SINGLE_MODERATE))
}

/// Cloud mask from the legacy cloud band bit tests
pub fn decode_cloud_mask_legacy(cloud: &FlagRaster) -> BoolRaster {
    any_bit_set(
        cloud,
        cloud_bits::VISIBLE
            | cloud_bits::GROSS_CLOUD
            | cloud_bits::THIN_CIRRUS
            | cloud_bits::MEDIUM_HIGH,
    )
}

/// Decode the combined cloud mask for a given scheme
///
/// `confidence` is always required; `bayes` only for the Bayesian schemes
/// and `cloud` only for the legacy scheme.
pub fn decode_cloud_mask(
    scheme: CloudMaskScheme,
    confidence: &FlagRaster,
    bayes: Option<&FlagRaster>,
    cloud: Option<&FlagRaster>,
) -> ShadowResult<BoolRaster> {
    match scheme {
        CloudMaskScheme::Confidence => Ok(decode_cloud_mask_confidence(confidence)),
        CloudMaskScheme::Legacy => {
            let cloud = cloud.ok_or_else(|| {
                ShadowError::Processing("legacy scheme needs the cloud flag band".to_string())
            })?;
            Ok(decode_cloud_mask_legacy(cloud))
        }
        CloudMaskScheme::Bayesian | CloudMaskScheme::BayesianOrConfidence => {
            let bayes = bayes.ok_or_else(|| {
                ShadowError::Processing("bayesian scheme needs the bayes flag band".to_string())
            })?;
            let confid_mask = decode_cloud_mask_confidence(confidence);
            match decode_cloud_mask_bayesian(bayes) {
                // Bayesian band unusable scene-wide: confidence-only fallback
                None => {
                    log::warn!("no Bayesian cloud data in scene, using confidence mask only");
                    Ok(confid_mask)
                }
                Some(bayes_mask) => {
                    if scheme == CloudMaskScheme::Bayesian {
                        Ok(bayes_mask)
                    } else {
                        let mut combined = bayes_mask;
                        combined.zip_mut_with(&confid_mask, |b, &c| *b = *b || c);
                        Ok(combined)
                    }
                }
            }
        }
    }
}
