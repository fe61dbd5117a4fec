//! Measurement constants
//!
//! Conversion factors and the fixed FoodData Central identifiers the
//! normalizer relies on.

// ============================================================================
// Volume Conversion Constants
// ============================================================================

/// Cubic centimeters per cubic meter
pub const CM3_PER_M3: f64 = 1_000_000.0;

// ============================================================================
// Nutrient Table Basis
// ============================================================================

/// Nutrient tables are expressed per this many grams of food
pub const GRAMS_PER_TABLE_BASIS: f64 = 100.0;

// ============================================================================
// FoodData Central Nutrient Identifiers
// ============================================================================

/// "Energy" reported in kilocalories
pub const ENERGY_KCAL_NUTRIENT_ID: i64 = 1008;
/// "Energy" reported in kilojoules
pub const ENERGY_KJ_NUTRIENT_ID: i64 = 1062;

/// Canonical key for energy in kilocalories
pub const KCAL_KEY: &str = "kcal";
/// Canonical key for energy in kilojoules
pub const KJ_KEY: &str = "kJ";

/// Canonical key forced by an energy nutrient id, if any
pub fn energy_key_for_id(nutrient_id: i64) -> Option<&'static str> {
    match nutrient_id {
        ENERGY_KJ_NUTRIENT_ID => Some(KJ_KEY),
        ENERGY_KCAL_NUTRIENT_ID => Some(KCAL_KEY),
        _ => None,
    }
}
