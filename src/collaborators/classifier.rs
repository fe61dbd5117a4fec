//! Label classification over HTTP
//!
//! Posts JPEG bytes to a label-detection endpoint that answers with a
//! Rekognition `DetectLabels`-shaped body:
//!
//! ```json
//! {"Labels": [{"Name": "Pear", "Confidence": 98.1, "Instances": [{...}]}]}
//! ```

use async_trait::async_trait;
use serde::Deserialize;

use super::Classifier;
use crate::error::CollabResult;
use crate::models::LabelCandidate;

#[derive(Debug, Deserialize)]
struct DetectLabelsResponse {
    #[serde(rename = "Labels", default)]
    labels: Vec<DetectedLabel>,
}

#[derive(Debug, Deserialize)]
struct DetectedLabel {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Confidence", default)]
    confidence: f64,
    #[serde(rename = "Instances", default)]
    instances: Vec<serde_json::Value>,
}

impl From<DetectedLabel> for LabelCandidate {
    fn from(label: DetectedLabel) -> Self {
        Self {
            label: label.name.to_lowercase(),
            confidence: label.confidence,
            has_instances: !label.instances.is_empty(),
        }
    }
}

/// Classifier backed by an HTTP label-detection service
#[derive(Debug, Clone)]
pub struct HttpLabelClassifier {
    client: reqwest::Client,
    url: String,
    max_labels: u32,
    min_confidence: f64,
}

impl HttpLabelClassifier {
    pub fn new(client: reqwest::Client, url: String, max_labels: u32, min_confidence: f64) -> Self {
        Self {
            client,
            url,
            max_labels,
            min_confidence,
        }
    }
}

#[async_trait]
impl Classifier for HttpLabelClassifier {
    async fn detect_labels(&self, jpeg: &[u8]) -> CollabResult<Vec<LabelCandidate>> {
        let response = self
            .client
            .post(&self.url)
            .query(&[
                ("MaxLabels", self.max_labels.to_string()),
                ("MinConfidence", self.min_confidence.to_string()),
            ])
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(jpeg.to_vec())
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        parse_labels(&body)
    }
}

fn parse_labels(body: &str) -> CollabResult<Vec<LabelCandidate>> {
    let response: DetectLabelsResponse = serde_json::from_str(body)?;
    Ok(response.labels.into_iter().map(LabelCandidate::from).collect())
}
