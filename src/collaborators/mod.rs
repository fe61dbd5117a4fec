//! External collaborators
//!
//! Trait seams for every capability the analysis delegates, plus the
//! production adapter for each. The coordinator only sees the traits, so
//! tests drive it with in-memory doubles.

pub mod classifier;
pub mod density;
pub mod fooddata;
pub mod imaging;
pub mod mesh;
pub mod reconstruction;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Settings;
use crate::error::CollabResult;
use crate::models::{FoodRecord, LabelCandidate};

pub use classifier::HttpLabelClassifier;
pub use density::{DensitySourceKind, DensityTable, EmbeddedDensity};
pub use fooddata::FoodDataCentral;
pub use imaging::JpegConverter;
pub use mesh::{TriangleMesh, VolumeMethod};
pub use reconstruction::{
    DetailLevel, FeatureSensitivity, ObjectCaptureCli, ReconstructionSettings, SampleOrdering,
};

/// Prepares an uploaded photo for the classification service
#[async_trait]
pub trait ImageConverter: Send + Sync {
    /// JPEG bytes of the image at `image`
    async fn to_jpeg(&self, image: &Path) -> CollabResult<Vec<u8>>;
}

/// Image-label classification
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Labels in the order the service ranked them
    async fn detect_labels(&self, jpeg: &[u8]) -> CollabResult<Vec<LabelCandidate>>;
}

/// Multi-view capture-to-mesh reconstruction
#[async_trait]
pub trait Reconstructor: Send + Sync {
    fn settings(&self) -> ReconstructionSettings;

    /// Reconstruct the images in `input_dir`, returning the mesh artifact
    /// written under `output_dir`, or `None` if none was produced.
    async fn reconstruct(&self, input_dir: &Path, output_dir: &Path) -> CollabResult<Option<PathBuf>>;
}

/// Enclosed-volume computation on a mesh artifact
///
/// Implementations are CPU-bound and run on the blocking pool.
pub trait VolumeCalculator: Send + Sync {
    fn method(&self) -> &'static str;

    /// Enclosed volume in cubic meters
    fn volume_cubic_meters(&self, mesh: &Path) -> CollabResult<f64>;
}

/// Source of grams-per-cm³ for an identified label
pub trait DensitySource: Send + Sync {
    fn kind(&self) -> DensitySourceKind;

    /// Raw density for `label`; `food` is the nutrient lookup record when
    /// the source needs it.
    fn density_for(&self, label: &str, food: Option<&FoodRecord>) -> Option<f64>;
}

/// Nutrient-database search
#[async_trait]
pub trait NutrientLookup: Send + Sync {
    /// Top-ranked food record for `query`
    async fn search(&self, query: &str) -> CollabResult<Option<FoodRecord>>;
}

/// Everything the coordinator calls out to
#[derive(Clone)]
pub struct Collaborators {
    pub images: Arc<dyn ImageConverter>,
    pub classifier: Arc<dyn Classifier>,
    pub reconstructor: Arc<dyn Reconstructor>,
    /// First entry is the primary routine
    pub volume: Vec<Arc<dyn VolumeCalculator>>,
    pub density: Arc<dyn DensitySource>,
    pub nutrients: Arc<dyn NutrientLookup>,
}

impl Collaborators {
    /// Build the production adapters from settings
    pub fn from_settings(settings: &Settings) -> CollabResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(crate::build_info::USER_AGENT)
            .build()?;

        let density: Arc<dyn DensitySource> = match settings.density_source {
            DensitySourceKind::Table => {
                let table = DensityTable::load(&settings.density_table)?;
                tracing::info!(
                    "Loaded {} densities from {}",
                    table.len(),
                    settings.density_table.display()
                );
                Arc::new(table)
            }
            DensitySourceKind::Embedded => Arc::new(EmbeddedDensity),
        };

        let volume = settings
            .volume_methods
            .iter()
            .map(|method| method.calculator())
            .collect();

        Ok(Self {
            images: Arc::new(JpegConverter::new(settings.image_converter.clone())),
            classifier: Arc::new(HttpLabelClassifier::new(
                http.clone(),
                settings.classifier_url.clone(),
                settings.max_labels,
                settings.confidence_threshold,
            )),
            reconstructor: Arc::new(ObjectCaptureCli::new(
                settings.reconstruction_executable.clone(),
                settings.reconstruction,
            )),
            volume,
            density,
            nutrients: Arc::new(FoodDataCentral::new(
                http,
                settings.fdc_url.clone(),
                settings.fdc_api_key.clone(),
                settings.fdc_data_type.clone(),
            )),
        })
    }
}
