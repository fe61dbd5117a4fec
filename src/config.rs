//! Runtime configuration
//!
//! All settings come from `FOOD_ANALYSER_*` environment variables with
//! defaults suitable for a single-host deployment.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::collaborators::fooddata::{DEFAULT_DATA_TYPE, DEFAULT_SEARCH_URL};
use crate::collaborators::{
    DensitySourceKind, DetailLevel, FeatureSensitivity, ReconstructionSettings, SampleOrdering,
    VolumeMethod,
};

const ENV_PREFIX: &str = "FOOD_ANALYSER_";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for FOOD_ANALYSER_{var}: '{value}' (expected {expected})")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Which surface the service is exposed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Mcp,
    Http,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Mcp => "mcp",
            Transport::Http => "http",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "mcp" | "stdio" => Some(Transport::Mcp),
            "http" => Some(Transport::Http),
            _ => None,
        }
    }
}

/// Service settings
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub transport: Transport,
    pub bind_addr: String,
    pub staging_dir: PathBuf,

    // Identification
    pub classifier_url: String,
    pub confidence_threshold: f64,
    pub max_labels: u32,
    pub image_converter: Option<String>,

    // Reconstruction and volume
    pub reconstruction_executable: PathBuf,
    pub reconstruction: ReconstructionSettings,
    pub volume_methods: Vec<VolumeMethod>,

    // Density
    pub density_source: DensitySourceKind,
    pub density_table: PathBuf,

    // Nutrients
    pub fdc_url: String,
    #[serde(skip_serializing)]
    pub fdc_api_key: String,
    pub fdc_data_type: String,

    // Pipeline behaviour
    pub stage_timeout_secs: u64,
    pub reconstruction_timeout_secs: u64,
    pub clear_inputs: bool,
    pub clear_models: bool,
}

impl Settings {
    /// Read settings from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(format!("{}{}", ENV_PREFIX, var)).ok())
    }

    /// Read settings through `lookup`, which receives names without the prefix
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let data_dir = project_data_dir();

        let transport = parse_or(&get, "TRANSPORT", "mcp or http", Transport::default(), Transport::from_str)?;
        let density_source = parse_or(
            &get,
            "DENSITY_SOURCE",
            "table or embedded",
            DensitySourceKind::default(),
            DensitySourceKind::from_str,
        )?;

        let reconstruction = ReconstructionSettings {
            detail_level: parse_or(
                &get,
                "DETAIL_LEVEL",
                "preview, reduced, medium, full or raw",
                DetailLevel::default(),
                DetailLevel::from_str,
            )?,
            sample_ordering: parse_or(
                &get,
                "SAMPLE_ORDERING",
                "unordered or sequential",
                SampleOrdering::default(),
                SampleOrdering::from_str,
            )?,
            feature_sensitivity: parse_or(
                &get,
                "FEATURE_SENSITIVITY",
                "normal or high",
                FeatureSensitivity::default(),
                FeatureSensitivity::from_str,
            )?,
        };

        let volume_methods = match get("VOLUME_METHODS") {
            Some(raw) => raw
                .split(',')
                .map(VolumeMethod::from_str)
                .collect::<Option<Vec<_>>>()
                .filter(|m| !m.is_empty())
                .ok_or_else(|| ConfigError::Invalid {
                    var: "VOLUME_METHODS",
                    value: raw.clone(),
                    expected: "comma-separated list of divergence, centroid",
                })?,
            None => vec![VolumeMethod::Divergence, VolumeMethod::Centroid],
        };

        let confidence_threshold = parse_or(&get, "CONFIDENCE_THRESHOLD", "a number from 0 to 100", 90.0, |s| {
            s.trim().parse::<f64>().ok().filter(|v| (0.0..=100.0).contains(v))
        })?;

        Ok(Self {
            transport,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8000".to_string()),
            staging_dir: get("STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("staging")),
            classifier_url: get("CLASSIFIER_URL")
                .unwrap_or_else(|| "http://127.0.0.1:8080/detect-labels".to_string()),
            confidence_threshold,
            max_labels: parse_or(&get, "MAX_LABELS", "a positive integer", 10, parse_positive)?,
            image_converter: get("IMAGE_CONVERTER"),
            reconstruction_executable: get("RECONSTRUCTION_EXECUTABLE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("ObjectCaptureApi")),
            reconstruction,
            volume_methods,
            density_source,
            density_table: get("DENSITY_TABLE")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("density.csv")),
            fdc_url: get("FDC_URL").unwrap_or_else(|| DEFAULT_SEARCH_URL.to_string()),
            fdc_api_key: get("FDC_API_KEY").unwrap_or_default(),
            fdc_data_type: get("FDC_DATA_TYPE").unwrap_or_else(|| DEFAULT_DATA_TYPE.to_string()),
            stage_timeout_secs: parse_or(&get, "STAGE_TIMEOUT_SECS", "a positive integer", 120, parse_positive)?,
            reconstruction_timeout_secs: parse_or(
                &get,
                "RECONSTRUCTION_TIMEOUT_SECS",
                "a positive integer",
                1800,
                parse_positive,
            )?,
            clear_inputs: parse_or(&get, "CLEAR_INPUTS", "true or false", true, parse_bool)?,
            clear_models: parse_or(&get, "CLEAR_MODELS", "true or false", false, parse_bool)?,
        })
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    pub fn reconstruction_timeout(&self) -> Duration {
        Duration::from_secs(self.reconstruction_timeout_secs)
    }
}

fn parse_or<G, T, P>(
    get: &G,
    var: &'static str,
    expected: &'static str,
    default: T,
    parse: P,
) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    P: Fn(&str) -> Option<T>,
{
    match get(var) {
        Some(value) => parse(&value).ok_or(ConfigError::Invalid {
            var,
            value,
            expected,
        }),
        None => Ok(default),
    }
}

fn parse_positive<T>(s: &str) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    s.trim().parse::<T>().ok().filter(|v| *v > T::default())
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// `<project>/data`, found relative to the executable
fn project_data_dir() -> PathBuf {
    let mut path = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."));

    // Go up from target/release or target/debug to project root
    if path.ends_with("release") || path.ends_with("debug") {
        if let Some(parent) = path.parent() {
            if let Some(grandparent) = parent.parent() {
                path = grandparent.to_path_buf();
            }
        }
    }

    path.join("data")
}
