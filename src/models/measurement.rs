//! Measurement values
//!
//! Volume, density and mass as they flow from reconstruction to scaling.

use serde::{Deserialize, Serialize};

use crate::nutrition::units::CM3_PER_M3;

/// Enclosed volume of a reconstructed mesh
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeMeasurement {
    pub cubic_centimeters: f64,
}

impl VolumeMeasurement {
    pub fn new(cubic_centimeters: f64) -> Self {
        Self { cubic_centimeters }
    }

    /// Volume routines report cubic meters; everything downstream uses cm³
    pub fn from_cubic_meters(cubic_meters: f64) -> Self {
        Self {
            cubic_centimeters: cubic_meters * CM3_PER_M3,
        }
    }
}

/// Density of the identified object in g/cm³
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DensityValue {
    pub grams_per_cubic_centimeter: f64,
}

impl DensityValue {
    pub fn new(grams_per_cubic_centimeter: f64) -> Self {
        Self {
            grams_per_cubic_centimeter,
        }
    }
}

/// Estimated mass of the object
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassEstimate {
    pub grams: f64,
}

impl MassEstimate {
    pub fn new(grams: f64) -> Self {
        Self { grams }
    }
}
