//! Nutrient name normalization
//!
//! Turns the free-text nutrient names of the nutrition database into the
//! canonical keys used in results. The steps run in a fixed order; several
//! names match more than one rule and the order decides the outcome.
//!
//! Examples:
//! - "Total lipid (fat)" -> "fat"
//! - "Carbohydrate, by difference" -> "carbohydrates"
//! - "Vitamin B-12" -> "vitaminB12"
//! - "Energy" (id 1008) -> "kcal", "Energy" (id 1062) -> "kJ"

use crate::models::{CanonicalNutrientKey, RawNutrientRecord};

use super::units::energy_key_for_id;

/// Substrings that mark a nutrient as one we report
///
/// "phosphorusv" is kept as published; it matches nothing in the
/// database, so phosphorus is not reported.
pub const RELEVANT_NUTRIENTS: &[&str] = &[
    "protein",
    "sugars",
    "water",
    "energy",
    "carbohydrate",
    "total lipid (fat)",
    "magnesium",
    "calcium",
    "zinc",
    "sodium",
    "alcohol",
    "vitamin a",
    "vitamin b-12",
    "vitamin c",
    "vitamin d",
    "vitamin e",
    "vitamin k",
    "sucrose",
    "glucose",
    "maltose",
    "copper",
    "iron",
    "phosphorusv",
    "selenium",
    "caffeine",
];

/// Whether a lowercased nutrient name contains any nutrient of interest
pub fn is_relevant(lowercased_name: &str) -> bool {
    RELEVANT_NUTRIENTS
        .iter()
        .any(|substring| lowercased_name.contains(substring))
}

/// Normalize a nutrient record into its canonical key
///
/// Returns `None` when the record is not a nutrient of interest; such
/// records never reach the result mapping.
pub fn normalize(record: &RawNutrientRecord) -> Option<CanonicalNutrientKey> {
    let lower = record.nutrient_name.to_lowercase();
    if !is_relevant(&lower) {
        return None;
    }

    let mut name: &str = if lower == "total lipid (fat)" { "fat" } else { &lower };
    name = truncate_before(name, ", ");
    name = truncate_before(name, " (");

    // "Energy" alone is ambiguous between units; only the id tells them apart
    if let Some(energy_key) = energy_key_for_id(record.nutrient_id) {
        name = energy_key;
    }

    if name == "carbohydrate" {
        name = "carbohydrates";
    }

    let key = camel_join(name).replace('-', "");
    Some(CanonicalNutrientKey::new(key))
}

/// Text before the first occurrence of `separator`, or all of it
fn truncate_before<'a>(name: &'a str, separator: &str) -> &'a str {
    match name.find(separator) {
        Some(idx) => &name[..idx],
        None => name,
    }
}

/// Join exactly two space-separated words as camelCase
///
/// Names with no interior space or more than one pass through unchanged.
fn camel_join(name: &str) -> String {
    let mut words = name.split(' ');
    match (words.next(), words.next(), words.next()) {
        (Some(first), Some(second), None) if !first.is_empty() && !second.is_empty() => {
            let mut chars = second.chars();
            let mut joined = String::with_capacity(name.len());
            joined.push_str(first);
            if let Some(c) = chars.next() {
                joined.extend(c.to_uppercase());
            }
            joined.push_str(chars.as_str());
            joined
        }
        _ => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nutrition::units::{ENERGY_KCAL_NUTRIENT_ID, ENERGY_KJ_NUTRIENT_ID};

    fn key(id: i64, name: &str) -> Option<String> {
        normalize(&RawNutrientRecord::new(id, name, 1.0)).map(|k| k.as_str().to_string())
    }

    #[test]
    fn test_irrelevant_names_are_dropped() {
        assert_eq!(key(1079, "Fiber, total dietary"), None);
        assert_eq!(key(1258, "Fatty acids, total saturated"), None);
        assert_eq!(key(1253, "Cholesterol"), None);
        // allow-list spells it "phosphorusv"
        assert_eq!(key(1091, "Phosphorus, P"), None);
    }

    #[test]
    fn test_total_lipid_becomes_fat() {
        assert_eq!(key(1004, "Total lipid (fat)").as_deref(), Some("fat"));
        assert_eq!(key(42, "TOTAL LIPID (FAT)").as_deref(), Some("fat"));
    }

    #[test]
    fn test_energy_disambiguated_by_id() {
        assert_eq!(key(ENERGY_KJ_NUTRIENT_ID, "Energy").as_deref(), Some("kJ"));
        assert_eq!(key(ENERGY_KCAL_NUTRIENT_ID, "Energy").as_deref(), Some("kcal"));
        assert_eq!(key(2047, "Energy (Atwater General Factors)").as_deref(), Some("energy"));
    }

    #[test]
    fn test_vitamin_b12_camel_joined_without_hyphen() {
        assert_eq!(key(1178, "Vitamin B-12").as_deref(), Some("vitaminB12"));
    }

    #[test]
    fn test_carbohydrate_truncated_then_rewritten() {
        assert_eq!(key(1005, "Carbohydrate, by difference").as_deref(), Some("carbohydrates"));
    }

    #[test]
    fn test_qualifiers_are_truncated() {
        assert_eq!(key(1106, "Vitamin A, RAE").as_deref(), Some("vitaminA"));
        assert_eq!(key(1114, "Vitamin D (D2 + D3)").as_deref(), Some("vitaminD"));
        assert_eq!(key(1109, "Vitamin E (alpha-tocopherol)").as_deref(), Some("vitaminE"));
        assert_eq!(key(1089, "Iron, Fe").as_deref(), Some("iron"));
        assert_eq!(key(2000, "Sugars, total including NLEA").as_deref(), Some("sugars"));
        assert_eq!(key(1162, "Vitamin C, total ascorbic acid").as_deref(), Some("vitaminC"));
    }

    #[test]
    fn test_single_words_stay_lowercase() {
        assert_eq!(key(1003, "Protein").as_deref(), Some("protein"));
        assert_eq!(key(1051, "Water").as_deref(), Some("water"));
        assert_eq!(key(1057, "Caffeine").as_deref(), Some("caffeine"));
    }

    #[test]
    fn test_three_words_pass_camel_join_unchanged() {
        assert_eq!(key(1, "Sugars added total").as_deref(), Some("sugars added total"));
    }

    #[test]
    fn test_camel_join() {
        assert_eq!(camel_join("vitamin c"), "vitaminC");
        assert_eq!(camel_join("protein"), "protein");
        assert_eq!(camel_join("a b c"), "a b c");
        assert_eq!(camel_join(" leading"), " leading");
    }
}
