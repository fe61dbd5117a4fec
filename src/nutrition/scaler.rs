//! Nutrient scaling
//!
//! Rescales a per-100 g nutrient table to the estimated mass of the object.

use crate::error::AnalysisError;
use crate::models::{MassEstimate, NutrientResultMapping, RawNutrientRecord};

use super::normalizer::normalize;
use super::units::GRAMS_PER_TABLE_BASIS;

/// Scale nutrient records to absolute quantities for `mass`
///
/// Records are processed in source order; when two records normalize to
/// the same key the later one wins. An empty result is an error, not an
/// empty mapping.
pub fn scale(
    records: &[RawNutrientRecord],
    mass: MassEstimate,
) -> Result<NutrientResultMapping, AnalysisError> {
    let mut nutrients = NutrientResultMapping::new();

    for record in records {
        let Some(key) = normalize(record) else {
            continue;
        };

        let quantity = (mass.grams * record.value_per_100_grams) / GRAMS_PER_TABLE_BASIS;
        if let Some(previous) = nutrients.insert(key.clone(), quantity) {
            tracing::debug!(
                "Nutrient key '{}' from '{}' overwrote {} with {}",
                key,
                record.nutrient_name,
                previous,
                quantity
            );
        }
    }

    if nutrients.is_empty() {
        return Err(AnalysisError::NoRelevantNutrients);
    }

    Ok(nutrients)
}
