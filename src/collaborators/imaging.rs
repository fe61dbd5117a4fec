//! Image preparation
//!
//! Phones upload HEIC, PNG or JPEG; the classifier wants JPEG. Formats the
//! `image` crate can decode are re-encoded in process. Anything else goes
//! through an optional external converter (e.g. ImageMagick's `magick`).

use std::io::Cursor;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::ImageFormat;
use tokio::process::Command;

use super::ImageConverter;
use crate::error::{CollabResult, CollaboratorError};

/// Converts photos to JPEG bytes
#[derive(Debug, Clone)]
pub struct JpegConverter {
    external_command: Option<String>,
    scratch_dir: PathBuf,
}

impl Default for JpegConverter {
    fn default() -> Self {
        Self::new(None)
    }
}

impl JpegConverter {
    pub fn new(external_command: Option<String>) -> Self {
        Self {
            external_command,
            scratch_dir: std::env::temp_dir(),
        }
    }

    /// Directory the external converter writes into
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Run `<command> <input> <output.jpg>` and read the result back
    ///
    /// The scratch file is removed on every exit path, including a
    /// dropped future.
    async fn convert_externally(&self, command: &str, image: &Path) -> CollabResult<Vec<u8>> {
        let target = tempfile::Builder::new()
            .prefix("food-analyser-")
            .suffix(".jpg")
            .tempfile_in(&self.scratch_dir)?;
        let output = Command::new(command)
            .arg(image)
            .arg(target.path())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(CollaboratorError::Process(format!(
                "{} exited with {}: {}",
                command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let bytes = tokio::fs::read(target.path()).await?;
        if bytes.is_empty() {
            return Err(CollaboratorError::Process(format!("{} produced no JPEG", command)));
        }
        if let Err(e) = target.close() {
            tracing::warn!("Could not remove converted image: {}", e);
        }
        Ok(bytes)
    }
}

#[async_trait]
impl ImageConverter for JpegConverter {
    async fn to_jpeg(&self, image: &Path) -> CollabResult<Vec<u8>> {
        if is_jpeg(image) {
            return Ok(tokio::fs::read(image).await?);
        }

        let path = image.to_path_buf();
        let encoded = tokio::task::spawn_blocking(move || encode_jpeg(&path)).await?;

        match (encoded, &self.external_command) {
            (Ok(bytes), _) => Ok(bytes),
            (Err(e), Some(command)) => {
                tracing::debug!(
                    "In-process decode of {} failed ({}), trying {}",
                    image.display(),
                    e,
                    command
                );
                self.convert_externally(command, image).await
            }
            (Err(e), None) => Err(e),
        }
    }
}

fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_lowercase().as_str(), "jpg" | "jpeg"))
        .unwrap_or(false)
}

/// Decode any format `image` understands and re-encode as JPEG
fn encode_jpeg(path: &Path) -> CollabResult<Vec<u8>> {
    let decoded = image::open(path)?;
    // JPEG has no alpha channel
    let rgb = image::DynamicImage::ImageRgb8(decoded.to_rgb8());
    let mut buffer = Cursor::new(Vec::new());
    rgb.write_to(&mut buffer, ImageFormat::Jpeg)?;
    Ok(buffer.into_inner())
}
