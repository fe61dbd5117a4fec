//! Multi-view reconstruction
//!
//! Drives an Object Capture style command-line tool:
//! `<exe> <input-dir> <output-dir> -d <detail> -o <ordering> -f <sensitivity>`
//! which writes `baked_mesh.obj` into the output directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use super::Reconstructor;
use crate::error::{CollabResult, CollaboratorError};

/// File name of the mesh the reconstruction tool writes
pub const MODEL_FILE_NAME: &str = "baked_mesh.obj";

/// Mesh detail requested from the reconstruction tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    Preview,
    Reduced,
    #[default]
    Medium,
    Full,
    Raw,
}

impl DetailLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetailLevel::Preview => "preview",
            DetailLevel::Reduced => "reduced",
            DetailLevel::Medium => "medium",
            DetailLevel::Full => "full",
            DetailLevel::Raw => "raw",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "preview" => Some(DetailLevel::Preview),
            "reduced" => Some(DetailLevel::Reduced),
            "medium" => Some(DetailLevel::Medium),
            "full" => Some(DetailLevel::Full),
            "raw" => Some(DetailLevel::Raw),
            _ => None,
        }
    }
}

/// Whether the photos were taken in a sequence around the object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SampleOrdering {
    Unordered,
    #[default]
    Sequential,
}

impl SampleOrdering {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleOrdering::Unordered => "unordered",
            SampleOrdering::Sequential => "sequential",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "unordered" => Some(SampleOrdering::Unordered),
            "sequential" => Some(SampleOrdering::Sequential),
            _ => None,
        }
    }
}

/// Feature detection sensitivity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FeatureSensitivity {
    #[default]
    Normal,
    High,
}

impl FeatureSensitivity {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureSensitivity::Normal => "normal",
            FeatureSensitivity::High => "high",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "normal" => Some(FeatureSensitivity::Normal),
            "high" => Some(FeatureSensitivity::High),
            _ => None,
        }
    }
}

/// Options passed to the reconstruction tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ReconstructionSettings {
    pub detail_level: DetailLevel,
    pub sample_ordering: SampleOrdering,
    pub feature_sensitivity: FeatureSensitivity,
}

impl ReconstructionSettings {
    /// Command-line flags in the order the tool expects them
    pub fn args(&self) -> [&'static str; 6] {
        [
            "-d",
            self.detail_level.as_str(),
            "-o",
            self.sample_ordering.as_str(),
            "-f",
            self.feature_sensitivity.as_str(),
        ]
    }
}

/// Reconstruction through an external executable
#[derive(Debug, Clone)]
pub struct ObjectCaptureCli {
    executable: PathBuf,
    settings: ReconstructionSettings,
}

impl ObjectCaptureCli {
    pub fn new(executable: PathBuf, settings: ReconstructionSettings) -> Self {
        Self {
            executable,
            settings,
        }
    }
}

#[async_trait]
impl Reconstructor for ObjectCaptureCli {
    fn settings(&self) -> ReconstructionSettings {
        self.settings
    }

    async fn reconstruct(&self, input_dir: &Path, output_dir: &Path) -> CollabResult<Option<PathBuf>> {
        tokio::fs::create_dir_all(output_dir).await?;

        tracing::debug!(
            "Running {} {} {} {}",
            self.executable.display(),
            input_dir.display(),
            output_dir.display(),
            self.settings.args().join(" ")
        );

        // kill_on_drop: a timed-out reconstruction must not keep running
        let output = Command::new(&self.executable)
            .arg(input_dir)
            .arg(output_dir)
            .args(self.settings.args())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(CollaboratorError::Process(format!(
                "{} exited with {}: {}",
                self.executable.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let model = output_dir.join(MODEL_FILE_NAME);
        if tokio::fs::try_exists(&model).await? {
            Ok(Some(model))
        } else {
            Ok(None)
        }
    }
}
