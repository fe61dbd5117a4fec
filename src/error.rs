//! Error types
//!
//! `AnalysisError` is the failure taxonomy surfaced to callers; every
//! variant carries a human-readable message. `CollaboratorError` is what the
//! external adapters return before the coordinator maps it to a stage kind.

use serde::Serialize;
use thiserror::Error;

/// Stable, serializable name of an analysis failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    NoInputProvided,
    ImageConversionFailed,
    ObjectNotIdentified,
    ReconstructionFailed,
    DensityUnavailable,
    NutrientLookupFailed,
    NoRelevantNutrients,
    InvalidMeasurement,
    CollaboratorTimeout,
    ModelArtifactNotFound,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NoInputProvided => "NoInputProvided",
            ErrorKind::ImageConversionFailed => "ImageConversionFailed",
            ErrorKind::ObjectNotIdentified => "ObjectNotIdentified",
            ErrorKind::ReconstructionFailed => "ReconstructionFailed",
            ErrorKind::DensityUnavailable => "DensityUnavailable",
            ErrorKind::NutrientLookupFailed => "NutrientLookupFailed",
            ErrorKind::NoRelevantNutrients => "NoRelevantNutrients",
            ErrorKind::InvalidMeasurement => "InvalidMeasurement",
            ErrorKind::CollaboratorTimeout => "CollaboratorTimeout",
            ErrorKind::ModelArtifactNotFound => "ModelArtifactNotFound",
        }
    }

    /// HTTP-style status code used by every response surface
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::NoInputProvided => 400,
            ErrorKind::ModelArtifactNotFound => 404,
            ErrorKind::ObjectNotIdentified
            | ErrorKind::DensityUnavailable
            | ErrorKind::NoRelevantNutrients
            | ErrorKind::InvalidMeasurement => 422,
            ErrorKind::NutrientLookupFailed => 502,
            ErrorKind::CollaboratorTimeout => 504,
            ErrorKind::ImageConversionFailed | ErrorKind::ReconstructionFailed => 500,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Analysis failure kinds
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("No input images could be found. Please upload input images first.")]
    NoInputProvided,

    #[error("Could not convert the input image: {0}")]
    ImageConversionFailed(String),

    #[error("Could not identify the input object: {0}")]
    ObjectNotIdentified(String),

    #[error("Could not generate 3D model: {0}")]
    ReconstructionFailed(String),

    #[error("Could not get object density information: {0}")]
    DensityUnavailable(String),

    #[error("Could not fetch nutrient information: {0}")]
    NutrientLookupFailed(String),

    #[error("None of the nutrient records matched a nutrient of interest")]
    NoRelevantNutrients,

    #[error("Invalid measurement: {0}")]
    InvalidMeasurement(String),

    #[error("{stage} did not finish within {seconds}s")]
    CollaboratorTimeout { stage: &'static str, seconds: u64 },

    #[error("No generated 3D model found: {0}")]
    ModelArtifactNotFound(String),
}

impl AnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::NoInputProvided => ErrorKind::NoInputProvided,
            AnalysisError::ImageConversionFailed(_) => ErrorKind::ImageConversionFailed,
            AnalysisError::ObjectNotIdentified(_) => ErrorKind::ObjectNotIdentified,
            AnalysisError::ReconstructionFailed(_) => ErrorKind::ReconstructionFailed,
            AnalysisError::DensityUnavailable(_) => ErrorKind::DensityUnavailable,
            AnalysisError::NutrientLookupFailed(_) => ErrorKind::NutrientLookupFailed,
            AnalysisError::NoRelevantNutrients => ErrorKind::NoRelevantNutrients,
            AnalysisError::InvalidMeasurement(_) => ErrorKind::InvalidMeasurement,
            AnalysisError::CollaboratorTimeout { .. } => ErrorKind::CollaboratorTimeout,
            AnalysisError::ModelArtifactNotFound(_) => ErrorKind::ModelArtifactNotFound,
        }
    }
}

/// Errors raised by external collaborator adapters
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("External process failed: {0}")]
    Process(String),

    #[error("Mesh error: {0}")]
    Mesh(String),

    #[error("Unexpected response: {0}")]
    Response(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for CollaboratorError {
    fn from(e: tokio::task::JoinError) -> Self {
        CollaboratorError::Task(e.to_string())
    }
}

/// Result type for collaborator calls
pub type CollabResult<T> = Result<T, CollaboratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(AnalysisError::NoInputProvided.kind(), ErrorKind::NoInputProvided);
        assert_eq!(AnalysisError::NoRelevantNutrients.kind(), ErrorKind::NoRelevantNutrients);
        let timeout = AnalysisError::CollaboratorTimeout { stage: "MeasuringVolume", seconds: 5 };
        assert_eq!(timeout.kind(), ErrorKind::CollaboratorTimeout);
        assert_eq!(timeout.to_string(), "MeasuringVolume did not finish within 5s");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ErrorKind::NoInputProvided.status_code(), 400);
        assert_eq!(ErrorKind::ModelArtifactNotFound.status_code(), 404);
        assert_eq!(ErrorKind::ObjectNotIdentified.status_code(), 422);
        assert_eq!(ErrorKind::CollaboratorTimeout.status_code(), 504);
        assert_eq!(ErrorKind::ReconstructionFailed.status_code(), 500);
    }

    #[test]
    fn test_kind_serializes_as_name() {
        let json = serde_json::to_string(&ErrorKind::DensityUnavailable).unwrap();
        assert_eq!(json, "\"DensityUnavailable\"");
    }
}
