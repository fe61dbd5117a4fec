//! Mass estimation
//!
//! Formula: m = ρ * V

use crate::error::AnalysisError;
use crate::models::{DensityValue, MassEstimate, VolumeMeasurement};

/// Estimate the mass of an object from its density and volume
///
/// Both inputs must be finite and non-negative.
pub fn estimate_mass(
    density: DensityValue,
    volume: VolumeMeasurement,
) -> Result<MassEstimate, AnalysisError> {
    let rho = density.grams_per_cubic_centimeter;
    let cm3 = volume.cubic_centimeters;

    if !rho.is_finite() || rho < 0.0 {
        return Err(AnalysisError::InvalidMeasurement(format!(
            "density must be a finite, non-negative number (got {})",
            rho
        )));
    }
    if !cm3.is_finite() || cm3 < 0.0 {
        return Err(AnalysisError::InvalidMeasurement(format!(
            "volume must be a finite, non-negative number (got {})",
            cm3
        )));
    }

    Ok(MassEstimate::new(rho * cm3))
}
