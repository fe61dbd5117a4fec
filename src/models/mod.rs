//! Data models
//!
//! Request-scoped entities of a single analysis. Nothing here outlives the
//! request that created it.

mod analysis;
mod measurement;
mod nutrient;

pub use analysis::{AnalysisResult, LabelCandidate, VolumeReport};
pub use measurement::{DensityValue, MassEstimate, VolumeMeasurement};
pub use nutrient::{CanonicalNutrientKey, FoodRecord, NutrientResultMapping, RawNutrientRecord};
