//! Nutrient records and the scaled result mapping

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One nutrient entry of a food record, values per 100 g
///
/// Field names follow the FoodData Central search response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawNutrientRecord {
    #[serde(rename = "nutrientId")]
    pub nutrient_id: i64,
    #[serde(rename = "nutrientName")]
    pub nutrient_name: String,
    #[serde(rename = "value", default)]
    pub value_per_100_grams: f64,
    #[serde(rename = "unitName", default, skip_serializing_if = "Option::is_none")]
    pub unit_name: Option<String>,
}

impl RawNutrientRecord {
    pub fn new(nutrient_id: i64, nutrient_name: impl Into<String>, value_per_100_grams: f64) -> Self {
        Self {
            nutrient_id,
            nutrient_name: nutrient_name.into(),
            value_per_100_grams,
            unit_name: None,
        }
    }
}

/// Top-ranked food returned by the nutrient lookup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FoodRecord {
    #[serde(rename = "fdcId", default)]
    pub fdc_id: Option<i64>,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "foodNutrients", default)]
    pub food_nutrients: Vec<RawNutrientRecord>,
    /// g/cm³, only present in deployments whose lookup service embeds it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub density: Option<f64>,
}

/// Normalized nutrient name used as the output key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalNutrientKey(String);

impl CanonicalNutrientKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalNutrientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for CanonicalNutrientKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Absolute nutrient quantities keyed by canonical name
///
/// Quantities keep the unit of their source record (g, mg, µg, kcal, kJ).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NutrientResultMapping(BTreeMap<CanonicalNutrientKey, f64>);

impl NutrientResultMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite, returning the previous quantity
    pub fn insert(&mut self, key: CanonicalNutrientKey, quantity: f64) -> Option<f64> {
        self.0.insert(key, quantity)
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CanonicalNutrientKey, &f64)> {
        self.0.iter()
    }
}
