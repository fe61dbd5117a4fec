//! Surface operations
//!
//! The four operations both transports expose: liveness, image upload,
//! analysis and model download. Every response body carries an integer
//! HTTP-style `status`.

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::collaborators::{reconstruction::MODEL_FILE_NAME, Collaborators};
use crate::config::Settings;
use crate::error::{AnalysisError, CollabResult, ErrorKind};
use crate::models::AnalysisResult;
use crate::pipeline::{AnalysisCoordinator, PipelineFailure, PipelineSettings, SessionId, Stage, StagingArea};
use crate::tools::status::{ServiceStatus, StatusTracker};

pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_INTERNAL: u16 = 500;

/// Liveness report
#[derive(Debug, Serialize)]
pub struct AliveResponse {
    pub status: u16,
    pub message: String,
    #[serde(flatten)]
    pub service: ServiceStatus,
}

/// Acknowledgement of a stored upload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub status: u16,
    pub message: String,
    pub session_id: String,
    pub file_name: String,
}

/// A completed analysis
#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub status: u16,
    #[serde(flatten)]
    pub result: AnalysisResult,
}

/// Generated mesh of a session
#[derive(Debug)]
pub struct ModelArtifact {
    pub session_id: String,
    pub file_name: &'static str,
    pub bytes: Vec<u8>,
}

/// Path and size of a session's generated mesh
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelLocation {
    pub status: u16,
    pub session_id: String,
    pub file_name: &'static str,
    pub size_bytes: u64,
    pub saved_to: String,
}

/// Failure body shared by every operation
#[derive(Debug, Clone, Serialize, Error)]
#[error("{message}")]
pub struct ApiFailure {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
}

impl ApiFailure {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_BAD_REQUEST,
            kind: None,
            message: message.into(),
            stage: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_INTERNAL,
            kind: None,
            message: message.into(),
            stage: None,
        }
    }
}

impl From<AnalysisError> for ApiFailure {
    fn from(error: AnalysisError) -> Self {
        let kind = error.kind();
        Self {
            status: kind.status_code(),
            kind: Some(kind),
            message: error.to_string(),
            stage: None,
        }
    }
}

impl From<PipelineFailure> for ApiFailure {
    fn from(failure: PipelineFailure) -> Self {
        Self {
            stage: Some(failure.stage),
            ..Self::from(failure.error)
        }
    }
}

/// Shared state behind both transports
#[derive(Clone)]
pub struct AppState {
    staging: Arc<StagingArea>,
    coordinator: Arc<AnalysisCoordinator>,
    status: Arc<StatusTracker>,
}

impl AppState {
    pub fn new(staging: StagingArea, coordinator: AnalysisCoordinator) -> Self {
        let status = StatusTracker::new(staging.root().to_path_buf());
        Self {
            staging: Arc::new(staging),
            coordinator: Arc::new(coordinator),
            status: Arc::new(status),
        }
    }

    /// Production state: real collaborators, staging under the configured root
    pub fn from_settings(settings: &Settings) -> CollabResult<Self> {
        let collaborators = Collaborators::from_settings(settings)?;
        let coordinator = AnalysisCoordinator::new(collaborators, PipelineSettings::from_settings(settings));
        Ok(Self::new(StagingArea::new(&settings.staging_dir), coordinator))
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    pub fn status(&self) -> ServiceStatus {
        self.status.get_status()
    }

    pub fn alive(&self) -> AliveResponse {
        AliveResponse {
            status: STATUS_OK,
            message: "Server is alive".to_string(),
            service: self.status(),
        }
    }

    /// Store one photo, starting a new session when `session` is absent
    pub async fn upload_image(
        &self,
        session: Option<&str>,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<UploadResponse, ApiFailure> {
        let session = match session.filter(|s| !s.trim().is_empty()) {
            Some(raw) => parse_session(raw)?,
            None => SessionId::generate(),
        };
        if bytes.is_empty() {
            return Err(ApiFailure::bad_request("Uploaded file is empty"));
        }

        let _guard = self.staging.lock_session(session).await;
        let path = self
            .staging
            .store_upload(session, file_name, bytes)
            .await
            .map_err(|e| match e.kind() {
                IoErrorKind::InvalidInput => ApiFailure::bad_request(e.to_string()),
                _ => ApiFailure::internal(format!("Could not store upload: {}", e)),
            })?;

        let stored = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        tracing::info!("[{}] Stored {} ({} bytes)", session, stored, bytes.len());

        Ok(UploadResponse {
            status: STATUS_OK,
            message: "File uploaded successfully".to_string(),
            session_id: session.to_string(),
            file_name: stored,
        })
    }

    /// Store a photo read from a local path
    pub async fn upload_file(&self, session: Option<&str>, path: &Path) -> Result<UploadResponse, ApiFailure> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ApiFailure::bad_request(format!("'{}' is not a file path", path.display())))?;
        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            IoErrorKind::NotFound => ApiFailure::bad_request(format!("'{}' does not exist", path.display())),
            _ => ApiFailure::internal(format!("Could not read '{}': {}", path.display(), e)),
        })?;
        self.upload_image(session, file_name, &bytes).await
    }

    /// Analyse the photos uploaded to `session`
    pub async fn analyse(&self, session: &str) -> Result<AnalysisResponse, ApiFailure> {
        let session = parse_session(session)?;
        let guard = self.staging.lock_session(session).await;

        let result = self
            .coordinator
            .analyze_guarded(self.staging.request_for(session), guard)
            .await?;

        Ok(AnalysisResponse {
            status: STATUS_OK,
            result,
        })
    }

    /// Bytes of the mesh generated for `session`
    pub async fn model(&self, session: &str) -> Result<ModelArtifact, ApiFailure> {
        let session = parse_session(session)?;
        let _guard = self.staging.lock_session(session).await;

        let path = self.model_path(session);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| model_read_failure(session, e))?;

        Ok(ModelArtifact {
            session_id: session.to_string(),
            file_name: MODEL_FILE_NAME,
            bytes,
        })
    }

    /// Where the mesh generated for `session` lives, without reading it
    pub async fn model_location(&self, session: &str) -> Result<ModelLocation, ApiFailure> {
        let session = parse_session(session)?;
        let _guard = self.staging.lock_session(session).await;

        let path = self.model_path(session);
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| model_read_failure(session, e))?;

        Ok(ModelLocation {
            status: STATUS_OK,
            session_id: session.to_string(),
            file_name: MODEL_FILE_NAME,
            size_bytes: metadata.len(),
            saved_to: path.display().to_string(),
        })
    }

    fn model_path(&self, session: SessionId) -> PathBuf {
        self.staging.output_dir(session).join(MODEL_FILE_NAME)
    }
}

fn model_read_failure(session: SessionId, e: std::io::Error) -> ApiFailure {
    match e.kind() {
        IoErrorKind::NotFound => ApiFailure::from(AnalysisError::ModelArtifactNotFound(format!(
            "session {} has no generated model",
            session
        ))),
        _ => ApiFailure::internal(format!("Could not read model: {}", e)),
    }
}

fn parse_session(raw: &str) -> Result<SessionId, ApiFailure> {
    SessionId::parse(raw).ok_or_else(|| ApiFailure::bad_request(format!("'{}' is not a session id", raw)))
}
