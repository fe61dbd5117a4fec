//! Analysis result
//!
//! Serialized with camelCase keys, which is what the capture client decodes.

use serde::{Deserialize, Serialize};

use super::NutrientResultMapping;

/// One label returned by the classification service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelCandidate {
    pub label: String,
    /// 0-100
    pub confidence: f64,
    pub has_instances: bool,
}

/// Volume and mass as computed by one volume routine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeReport {
    pub method: String,
    #[serde(rename = "volumeInCM3")]
    pub volume_in_cm3: f64,
    pub weight_in_grams: f64,
}

/// Outcome of a completed analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub session_id: String,
    pub label: String,
    pub confidence: f64,
    pub density: f64,
    pub detail_level: String,
    pub feature_sensitivity: String,
    pub measurement_time_in_seconds: f64,
    pub food_description: String,
    /// Primary routine first
    pub volumes: Vec<VolumeReport>,
    /// Mass from the primary volume routine, the one nutrients are scaled by
    pub weight_in_grams: f64,
    pub nutrients: NutrientResultMapping,
}
