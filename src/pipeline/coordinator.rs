//! Analysis coordinator
//!
//! Walks the stage plan for the configured density source, calling out to
//! the collaborators and feeding their outputs through the nutrition core.
//! The first failing stage ends the analysis; there is no partial result
//! and no retry.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use super::stage::{stage_plan, Stage, StageProgress};
use super::staging::{clear_files, latest_input, AnalysisRequest, SessionGuard};
use crate::collaborators::Collaborators;
use crate::config::Settings;
use crate::error::{AnalysisError, CollaboratorError};
use crate::models::{
    AnalysisResult, DensityValue, FoodRecord, LabelCandidate, MassEstimate, NutrientResultMapping,
    VolumeMeasurement, VolumeReport,
};
use crate::nutrition::{estimate_mass, scale};

/// Knobs the coordinator needs from the service settings
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Minimum classification confidence, 0-100
    pub confidence_threshold: f64,
    pub stage_timeout: Duration,
    pub reconstruction_timeout: Duration,
    pub clear_inputs: bool,
    pub clear_models: bool,
}

impl PipelineSettings {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            confidence_threshold: settings.confidence_threshold,
            stage_timeout: settings.stage_timeout(),
            reconstruction_timeout: settings.reconstruction_timeout(),
            clear_inputs: settings.clear_inputs,
            clear_models: settings.clear_models,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 90.0,
            stage_timeout: Duration::from_secs(120),
            reconstruction_timeout: Duration::from_secs(1800),
            clear_inputs: true,
            clear_models: false,
        }
    }
}

/// An analysis that stopped at `stage`
#[derive(Debug, Error)]
#[error("{stage}: {error}")]
pub struct PipelineFailure {
    pub stage: Stage,
    pub error: AnalysisError,
}

/// Everything gathered so far by one analysis
#[derive(Default)]
struct Workspace {
    primary_image: Option<PathBuf>,
    label: Option<LabelCandidate>,
    density: Option<DensityValue>,
    /// Primary routine first
    volumes: Vec<(&'static str, VolumeMeasurement)>,
    measurement_seconds: f64,
    food: Option<FoodRecord>,
    reports: Vec<VolumeReport>,
    mass: Option<MassEstimate>,
    nutrients: Option<NutrientResultMapping>,
}

/// Runs analyses against a set of collaborators
pub struct AnalysisCoordinator {
    collaborators: Collaborators,
    settings: PipelineSettings,
}

impl AnalysisCoordinator {
    pub fn new(collaborators: Collaborators, settings: PipelineSettings) -> Self {
        Self {
            collaborators,
            settings,
        }
    }

    /// Stage order this coordinator follows
    pub fn plan(&self) -> [Stage; 7] {
        stage_plan(self.collaborators.density.kind())
    }

    /// Run one analysis to completion or to its first failure
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, PipelineFailure> {
        self.run(request, &StageProgress::new()).await
    }

    /// Like [`analyze`](Self::analyze), but in its own task so a panic in
    /// any collaborator becomes a failure of the stage it happened in.
    ///
    /// The task owns `session` until it finishes, so the session stays
    /// locked even if the caller stops waiting.
    pub async fn analyze_guarded(
        self: &Arc<Self>,
        request: AnalysisRequest,
        session: SessionGuard,
    ) -> Result<AnalysisResult, PipelineFailure> {
        let progress = StageProgress::new();
        let coordinator = Arc::clone(self);
        let task_progress = progress.clone();

        let handle = tokio::spawn(async move {
            let outcome = coordinator.run(&request, &task_progress).await;
            drop(session);
            outcome
        });

        match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                let stage = progress.current();
                tracing::error!("Analysis task aborted during {}: {}", stage, e);
                Err(PipelineFailure {
                    stage,
                    error: stage.failure(format!("unexpected fault: {}", e)),
                })
            }
        }
    }

    async fn run(
        &self,
        request: &AnalysisRequest,
        progress: &StageProgress,
    ) -> Result<AnalysisResult, PipelineFailure> {
        let mut workspace = Workspace::default();
        let started = Instant::now();

        for stage in self.plan() {
            progress.enter(stage);
            tracing::info!("[{}] {}", request.session_id, stage);

            if stage == Stage::Complete {
                let result = self
                    .assemble(request, workspace)
                    .map_err(|error| PipelineFailure { stage, error })?;
                self.clean_up(request).await;
                tracing::info!(
                    "[{}] Analysed '{}' in {:.1}s: {:.1} g, {} nutrients",
                    request.session_id,
                    result.label,
                    started.elapsed().as_secs_f64(),
                    result.weight_in_grams,
                    result.nutrients.len()
                );
                return Ok(result);
            }

            if let Err(error) = self.step(stage, request, &mut workspace).await {
                tracing::warn!("[{}] {} failed: {}", request.session_id, stage, error);
                return Err(PipelineFailure { stage, error });
            }
        }

        // every plan ends with Complete
        Err(PipelineFailure {
            stage: Stage::Complete,
            error: Stage::Complete.failure("analysis ended without completing"),
        })
    }

    async fn step(
        &self,
        stage: Stage,
        request: &AnalysisRequest,
        ws: &mut Workspace,
    ) -> Result<(), AnalysisError> {
        match stage {
            Stage::AwaitingInput => {
                let image = latest_input(&request.input_dir)
                    .await
                    .map_err(|e| {
                        tracing::debug!("Reading {}: {}", request.input_dir.display(), e);
                        AnalysisError::NoInputProvided
                    })?
                    .ok_or(AnalysisError::NoInputProvided)?;
                tracing::debug!("Primary image {}", image.display());
                ws.primary_image = Some(image);
            }

            Stage::Identifying => {
                let image = ws
                    .primary_image
                    .as_deref()
                    .ok_or(AnalysisError::NoInputProvided)?;

                let jpeg = self
                    .bounded(stage, self.settings.stage_timeout, self.collaborators.images.to_jpeg(image), |e| {
                        AnalysisError::ImageConversionFailed(e.to_string())
                    })
                    .await?;

                let candidates = self
                    .bounded(
                        stage,
                        self.settings.stage_timeout,
                        self.collaborators.classifier.detect_labels(&jpeg),
                        |e| stage.failure(e.to_string()),
                    )
                    .await?;

                let label = select_label(&candidates, self.settings.confidence_threshold)
                    .ok_or_else(|| {
                        stage.failure(format!(
                            "no labelled instance at or above {}% confidence among {} labels",
                            self.settings.confidence_threshold,
                            candidates.len()
                        ))
                    })?;
                tracing::info!("Identified '{}' ({:.1}%)", label.label, label.confidence);
                ws.label = Some(label);
            }

            Stage::LookingUpDensity => {
                let label = Self::label(ws, stage)?;
                let density = self
                    .collaborators
                    .density
                    .density_for(label, ws.food.as_ref())
                    .filter(|d| d.is_finite() && *d > 0.0)
                    .ok_or_else(|| stage.failure(format!("no density known for '{}'", label)))?;
                tracing::debug!("Density of '{}': {} g/cm³", label, density);
                ws.density = Some(DensityValue::new(density));
            }

            Stage::MeasuringVolume => {
                let started = Instant::now();
                let model = self
                    .bounded(
                        stage,
                        self.settings.reconstruction_timeout,
                        self.collaborators
                            .reconstructor
                            .reconstruct(&request.input_dir, &request.output_dir),
                        |e| stage.failure(e.to_string()),
                    )
                    .await?
                    .ok_or_else(|| stage.failure("no model was generated"))?;

                if self.collaborators.volume.is_empty() {
                    return Err(stage.failure("no volume routine configured"));
                }

                for calculator in &self.collaborators.volume {
                    let calculator = Arc::clone(calculator);
                    let path = model.clone();
                    let method = calculator.method();
                    let cubic_meters = self
                        .bounded(
                            stage,
                            self.settings.stage_timeout,
                            async move {
                                tokio::task::spawn_blocking(move || calculator.volume_cubic_meters(&path))
                                    .await?
                            },
                            |e| stage.failure(format!("{} volume: {}", method, e)),
                        )
                        .await?;

                    let volume = VolumeMeasurement::from_cubic_meters(cubic_meters);
                    if !(volume.cubic_centimeters.is_finite() && volume.cubic_centimeters > 0.0) {
                        return Err(AnalysisError::InvalidMeasurement(format!(
                            "{} volume of {} cm³",
                            method, volume.cubic_centimeters
                        )));
                    }
                    tracing::debug!("{} volume: {:.2} cm³", method, volume.cubic_centimeters);
                    ws.volumes.push((method, volume));
                }
                ws.measurement_seconds = started.elapsed().as_secs_f64();
            }

            Stage::FetchingNutrients => {
                let label = Self::label(ws, stage)?.to_string();
                let food = self
                    .bounded(
                        stage,
                        self.settings.stage_timeout,
                        self.collaborators.nutrients.search(&label),
                        |e| stage.failure(e.to_string()),
                    )
                    .await?
                    .ok_or_else(|| stage.failure(format!("no food matched '{}'", label)))?;

                if food.food_nutrients.is_empty() {
                    return Err(stage.failure(format!("'{}' has no nutrient table", food.description)));
                }
                tracing::debug!(
                    "'{}' matched '{}' with {} nutrients",
                    label,
                    food.description,
                    food.food_nutrients.len()
                );
                ws.food = Some(food);
            }

            Stage::Scaling => {
                let density = ws.density.ok_or_else(|| stage.failure("density missing"))?;
                let food = ws.food.as_ref().ok_or_else(|| stage.failure("nutrients missing"))?;

                let mut reports = Vec::with_capacity(ws.volumes.len());
                for (method, volume) in &ws.volumes {
                    let mass = estimate_mass(density, *volume)?;
                    reports.push(VolumeReport {
                        method: method.to_string(),
                        volume_in_cm3: volume.cubic_centimeters,
                        weight_in_grams: mass.grams,
                    });
                }
                let primary = reports
                    .first()
                    .map(|r| MassEstimate::new(r.weight_in_grams))
                    .ok_or_else(|| stage.failure("volume missing"))?;

                ws.nutrients = Some(scale(&food.food_nutrients, primary)?);
                ws.mass = Some(primary);
                ws.reports = reports;
            }

            Stage::Complete => {}
        }
        Ok(())
    }

    fn assemble(&self, request: &AnalysisRequest, ws: Workspace) -> Result<AnalysisResult, AnalysisError> {
        let incomplete = || Stage::Complete.failure("analysis incomplete");
        let label = ws.label.ok_or_else(incomplete)?;
        let density = ws.density.ok_or_else(incomplete)?;
        let mass = ws.mass.ok_or_else(incomplete)?;
        let nutrients = ws.nutrients.ok_or_else(incomplete)?;
        let food_description = ws.food.map(|f| f.description).unwrap_or_default();
        let reconstruction = self.collaborators.reconstructor.settings();

        Ok(AnalysisResult {
            session_id: request.session_id.clone(),
            label: label.label,
            confidence: label.confidence,
            density: density.grams_per_cubic_centimeter,
            detail_level: reconstruction.detail_level.as_str().to_string(),
            feature_sensitivity: reconstruction.feature_sensitivity.as_str().to_string(),
            measurement_time_in_seconds: ws.measurement_seconds,
            food_description,
            volumes: ws.reports,
            weight_in_grams: mass.grams,
            nutrients,
        })
    }

    /// Clear transient artifacts; never affects the result
    async fn clean_up(&self, request: &AnalysisRequest) {
        if self.settings.clear_inputs {
            if let Err(e) = clear_files(&request.input_dir).await {
                tracing::warn!("Failed to clear {}: {}", request.input_dir.display(), e);
            }
        }
        if self.settings.clear_models {
            if let Err(e) = clear_files(&request.output_dir).await {
                tracing::warn!("Failed to clear {}: {}", request.output_dir.display(), e);
            }
        }
    }

    fn label(ws: &Workspace, stage: Stage) -> Result<&str, AnalysisError> {
        ws.label
            .as_ref()
            .map(|l| l.label.as_str())
            .ok_or_else(|| stage.failure("object not identified yet"))
    }

    async fn bounded<T, F, M>(
        &self,
        stage: Stage,
        limit: Duration,
        call: F,
        on_error: M,
    ) -> Result<T, AnalysisError>
    where
        F: Future<Output = Result<T, CollaboratorError>>,
        M: FnOnce(CollaboratorError) -> AnalysisError,
    {
        match tokio::time::timeout(limit, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(on_error(e)),
            Err(_) => Err(AnalysisError::CollaboratorTimeout {
                stage: stage.as_str(),
                seconds: limit.as_secs(),
            }),
        }
    }
}

/// First label with instances at or above `threshold`
pub fn select_label(candidates: &[LabelCandidate], threshold: f64) -> Option<LabelCandidate> {
    candidates
        .iter()
        .find(|c| c.has_instances && c.confidence >= threshold)
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        Classifier, DensitySource, DensityTable, EmbeddedDensity, ImageConverter, NutrientLookup,
        ReconstructionSettings, Reconstructor, VolumeCalculator,
    };
    use crate::error::{CollabResult, ErrorKind};
    use crate::models::RawNutrientRecord;
    use crate::pipeline::staging::{SessionId, StagingArea};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Calls {
        convert: AtomicUsize,
        classify: AtomicUsize,
        reconstruct: AtomicUsize,
        volume: AtomicUsize,
        lookup: AtomicUsize,
    }

    /// Collaborator that answers with a transport error
    #[derive(Clone, Copy, PartialEq)]
    enum Failing {
        Images,
        Classifier,
        Lookup,
    }

    fn transport_error() -> CollaboratorError {
        CollaboratorError::Response("connection reset by peer".to_string())
    }

    struct FakeImages {
        calls: Arc<Calls>,
        fail: bool,
    }

    #[async_trait]
    impl ImageConverter for FakeImages {
        async fn to_jpeg(&self, image: &Path) -> CollabResult<Vec<u8>> {
            self.calls.convert.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(transport_error());
            }
            Ok(tokio::fs::read(image).await?)
        }
    }

    struct FakeClassifier {
        calls: Arc<Calls>,
        labels: Vec<LabelCandidate>,
        fail: bool,
    }

    #[async_trait]
    impl Classifier for FakeClassifier {
        async fn detect_labels(&self, _jpeg: &[u8]) -> CollabResult<Vec<LabelCandidate>> {
            self.calls.classify.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(transport_error());
            }
            Ok(self.labels.clone())
        }
    }

    struct FakeReconstructor {
        calls: Arc<Calls>,
        produce_model: bool,
        delay: Duration,
    }

    #[async_trait]
    impl Reconstructor for FakeReconstructor {
        fn settings(&self) -> ReconstructionSettings {
            ReconstructionSettings::default()
        }

        async fn reconstruct(&self, _input: &Path, output: &Path) -> CollabResult<Option<PathBuf>> {
            self.calls.reconstruct.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if !self.produce_model {
                return Ok(None);
            }
            tokio::fs::create_dir_all(output).await?;
            let model = output.join("baked_mesh.obj");
            tokio::fs::write(&model, b"# mesh\n").await?;
            Ok(Some(model))
        }
    }

    struct FixedVolume {
        calls: Arc<Calls>,
        name: &'static str,
        cubic_meters: f64,
    }

    impl VolumeCalculator for FixedVolume {
        fn method(&self) -> &'static str {
            self.name
        }

        fn volume_cubic_meters(&self, _mesh: &Path) -> CollabResult<f64> {
            self.calls.volume.fetch_add(1, Ordering::SeqCst);
            Ok(self.cubic_meters)
        }
    }

    struct PanickingVolume;

    impl VolumeCalculator for PanickingVolume {
        fn method(&self) -> &'static str {
            "panicking"
        }

        fn volume_cubic_meters(&self, _mesh: &Path) -> CollabResult<f64> {
            panic!("mesh routine crashed")
        }
    }

    struct FakeLookup {
        calls: Arc<Calls>,
        food: Option<FoodRecord>,
        fail: bool,
    }

    #[async_trait]
    impl NutrientLookup for FakeLookup {
        async fn search(&self, _query: &str) -> CollabResult<Option<FoodRecord>> {
            self.calls.lookup.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(transport_error());
            }
            Ok(self.food.clone())
        }
    }

    fn pear_label() -> LabelCandidate {
        LabelCandidate {
            label: "pear".to_string(),
            confidence: 97.5,
            has_instances: true,
        }
    }

    fn pear_food(density: Option<f64>) -> FoodRecord {
        FoodRecord {
            fdc_id: Some(169118),
            description: "Pears, raw".to_string(),
            food_nutrients: vec![
                RawNutrientRecord::new(1003, "Protein", 0.36),
                RawNutrientRecord::new(1008, "Energy", 57.0),
                RawNutrientRecord::new(1005, "Carbohydrate, by difference", 15.23),
                RawNutrientRecord::new(1079, "Fiber, total dietary", 3.1),
            ],
            density,
        }
    }

    struct Fixture {
        calls: Arc<Calls>,
        labels: Vec<LabelCandidate>,
        produce_model: bool,
        reconstruct_delay: Duration,
        volume: Vec<Arc<dyn VolumeCalculator>>,
        density: Arc<dyn DensitySource>,
        food: Option<FoodRecord>,
        failing: Option<Failing>,
        settings: PipelineSettings,
    }

    impl Fixture {
        fn new() -> Self {
            let calls = Arc::new(Calls::default());
            let volume: Vec<Arc<dyn VolumeCalculator>> = vec![
                Arc::new(FixedVolume {
                    calls: Arc::clone(&calls),
                    name: "divergence",
                    cubic_meters: 0.000282,
                }),
                Arc::new(FixedVolume {
                    calls: Arc::clone(&calls),
                    name: "centroid",
                    cubic_meters: 0.000280,
                }),
            ];
            Self {
                calls,
                labels: vec![pear_label()],
                produce_model: true,
                reconstruct_delay: Duration::ZERO,
                volume,
                density: Arc::new(DensityTable::parse("pear;1.028\n")),
                food: Some(pear_food(None)),
                failing: None,
                settings: PipelineSettings::default(),
            }
        }

        fn coordinator(self) -> (Arc<AnalysisCoordinator>, Arc<Calls>) {
            let calls = Arc::clone(&self.calls);
            let failing = self.failing;
            let collaborators = Collaborators {
                images: Arc::new(FakeImages {
                    calls: Arc::clone(&calls),
                    fail: failing == Some(Failing::Images),
                }),
                classifier: Arc::new(FakeClassifier {
                    calls: Arc::clone(&calls),
                    labels: self.labels,
                    fail: failing == Some(Failing::Classifier),
                }),
                reconstructor: Arc::new(FakeReconstructor {
                    calls: Arc::clone(&calls),
                    produce_model: self.produce_model,
                    delay: self.reconstruct_delay,
                }),
                volume: self.volume,
                density: self.density,
                nutrients: Arc::new(FakeLookup {
                    calls: Arc::clone(&calls),
                    food: self.food,
                    fail: failing == Some(Failing::Lookup),
                }),
            };
            (
                Arc::new(AnalysisCoordinator::new(collaborators, self.settings)),
                calls,
            )
        }
    }

    async fn staged_request(staging: &StagingArea) -> AnalysisRequest {
        let session = SessionId::generate();
        staging
            .store_upload(session, "pear.jpg", b"jpeg bytes")
            .await
            .unwrap();
        staging.request_for(session)
    }

    #[test]
    fn test_select_label_skips_labels_without_instances() {
        let candidates = vec![
            LabelCandidate {
                label: "food".to_string(),
                confidence: 99.9,
                has_instances: false,
            },
            LabelCandidate {
                label: "fruit".to_string(),
                confidence: 85.0,
                has_instances: true,
            },
            pear_label(),
            LabelCandidate {
                label: "apple".to_string(),
                confidence: 95.0,
                has_instances: true,
            },
        ];
        assert_eq!(select_label(&candidates, 90.0).unwrap().label, "pear");
        assert_eq!(select_label(&candidates, 80.0).unwrap().label, "fruit");
        assert!(select_label(&candidates, 99.0).is_none());
        assert!(select_label(&[], 0.0).is_none());
    }

    #[tokio::test]
    async fn test_table_density_full_analysis() {
        let root = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(root.path());
        let request = staged_request(&staging).await;
        let (coordinator, calls) = Fixture::new().coordinator();

        let result = coordinator.analyze(&request).await.unwrap();

        assert_eq!(result.label, "pear");
        assert_eq!(result.session_id, request.session_id);
        assert!((result.density - 1.028).abs() < 1e-12);
        assert!((result.weight_in_grams - 273.896).abs() < 1e-6);
        assert_eq!(result.volumes.len(), 2);
        assert_eq!(result.volumes[0].method, "divergence");
        assert!((result.volumes[1].weight_in_grams - 287.84).abs() < 1e-6);
        assert_eq!(result.detail_level, "medium");
        assert_eq!(result.feature_sensitivity, "normal");
        assert_eq!(result.food_description, "Pears, raw");

        assert_eq!(result.nutrients.len(), 3);
        assert!((result.nutrients.get("protein").unwrap() - 273.896 * 0.36 / 100.0).abs() < 1e-9);
        assert!((result.nutrients.get("kcal").unwrap() - 273.896 * 57.0 / 100.0).abs() < 1e-9);
        assert!(result.nutrients.get("carbohydrates").is_some());

        assert_eq!(calls.reconstruct.load(Ordering::SeqCst), 1);
        assert_eq!(calls.volume.load(Ordering::SeqCst), 2);
        assert_eq!(calls.lookup.load(Ordering::SeqCst), 1);

        // inputs cleared, model kept
        assert_eq!(latest_input(&request.input_dir).await.unwrap(), None);
        assert!(request.output_dir.join("baked_mesh.obj").exists());
    }

    #[tokio::test]
    async fn test_embedded_density_full_analysis() {
        let root = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(root.path());
        let request = staged_request(&staging).await;
        let mut fixture = Fixture::new();
        fixture.density = Arc::new(EmbeddedDensity);
        fixture.food = Some(pear_food(Some(1.028)));
        let (coordinator, _calls) = fixture.coordinator();

        assert_eq!(coordinator.plan()[2], Stage::MeasuringVolume);
        let result = coordinator.analyze(&request).await.unwrap();
        assert!((result.weight_in_grams - 273.896).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_unidentified_object_stops_before_reconstruction() {
        let root = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(root.path());
        let request = staged_request(&staging).await;
        let mut fixture = Fixture::new();
        fixture.labels = vec![LabelCandidate {
            label: "food".to_string(),
            confidence: 99.0,
            has_instances: false,
        }];
        let (coordinator, calls) = fixture.coordinator();

        let failure = coordinator.analyze(&request).await.unwrap_err();

        assert_eq!(failure.stage, Stage::Identifying);
        assert_eq!(failure.error.kind(), ErrorKind::ObjectNotIdentified);
        assert_eq!(calls.classify.load(Ordering::SeqCst), 1);
        assert_eq!(calls.reconstruct.load(Ordering::SeqCst), 0);
        assert_eq!(calls.volume.load(Ordering::SeqCst), 0);
        assert_eq!(calls.lookup.load(Ordering::SeqCst), 0);
        // nothing cleared on failure
        assert!(latest_input(&request.input_dir).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_no_input() {
        let root = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(root.path());
        let request = staging.request_for(SessionId::generate());
        let (coordinator, calls) = Fixture::new().coordinator();

        let failure = coordinator.analyze(&request).await.unwrap_err();

        assert_eq!(failure.stage, Stage::AwaitingInput);
        assert_eq!(failure.error.kind(), ErrorKind::NoInputProvided);
        assert_eq!(calls.convert.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_density_skips_reconstruction() {
        let root = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(root.path());
        let request = staged_request(&staging).await;
        let mut fixture = Fixture::new();
        fixture.density = Arc::new(DensityTable::parse("apple;0.85\n"));
        let (coordinator, calls) = fixture.coordinator();

        let failure = coordinator.analyze(&request).await.unwrap_err();

        assert_eq!(failure.stage, Stage::LookingUpDensity);
        assert_eq!(failure.error.kind(), ErrorKind::DensityUnavailable);
        assert_eq!(calls.reconstruct.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_model_is_reconstruction_failure() {
        let root = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(root.path());
        let request = staged_request(&staging).await;
        let mut fixture = Fixture::new();
        fixture.produce_model = false;
        let (coordinator, calls) = fixture.coordinator();

        let failure = coordinator.analyze(&request).await.unwrap_err();

        assert_eq!(failure.stage, Stage::MeasuringVolume);
        assert_eq!(failure.error.kind(), ErrorKind::ReconstructionFailed);
        assert_eq!(calls.volume.load(Ordering::SeqCst), 0);
        assert_eq!(calls.lookup.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_volume_is_invalid_measurement() {
        let root = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(root.path());
        let request = staged_request(&staging).await;
        let mut fixture = Fixture::new();
        fixture.volume = vec![Arc::new(FixedVolume {
            calls: Arc::clone(&fixture.calls),
            name: "divergence",
            cubic_meters: 0.0,
        })];
        let (coordinator, _calls) = fixture.coordinator();

        let failure = coordinator.analyze(&request).await.unwrap_err();
        assert_eq!(failure.error.kind(), ErrorKind::InvalidMeasurement);
    }

    #[tokio::test]
    async fn test_missing_food_is_lookup_failure() {
        let root = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(root.path());
        let request = staged_request(&staging).await;
        let mut fixture = Fixture::new();
        fixture.food = None;
        let (coordinator, _calls) = fixture.coordinator();

        let failure = coordinator.analyze(&request).await.unwrap_err();
        assert_eq!(failure.stage, Stage::FetchingNutrients);
        assert_eq!(failure.error.kind(), ErrorKind::NutrientLookupFailed);
    }

    #[tokio::test]
    async fn test_irrelevant_nutrients_fail_scaling() {
        let root = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(root.path());
        let request = staged_request(&staging).await;
        let mut fixture = Fixture::new();
        fixture.food = Some(FoodRecord {
            description: "Pears, raw".to_string(),
            food_nutrients: vec![RawNutrientRecord::new(1079, "Fiber, total dietary", 3.1)],
            ..FoodRecord::default()
        });
        let (coordinator, _calls) = fixture.coordinator();

        let failure = coordinator.analyze(&request).await.unwrap_err();
        assert_eq!(failure.stage, Stage::Scaling);
        assert_eq!(failure.error.kind(), ErrorKind::NoRelevantNutrients);
    }

    #[tokio::test]
    async fn test_slow_reconstruction_times_out() {
        let root = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(root.path());
        let request = staged_request(&staging).await;
        let mut fixture = Fixture::new();
        fixture.reconstruct_delay = Duration::from_secs(5);
        fixture.settings.reconstruction_timeout = Duration::from_millis(20);
        let (coordinator, calls) = fixture.coordinator();

        let failure = coordinator.analyze(&request).await.unwrap_err();

        assert_eq!(failure.stage, Stage::MeasuringVolume);
        assert_eq!(failure.error.kind(), ErrorKind::CollaboratorTimeout);
        assert_eq!(calls.lookup.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_panicking_collaborator_fails_its_stage() {
        let root = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(root.path());
        let request = staged_request(&staging).await;
        let mut fixture = Fixture::new();
        fixture.volume = vec![Arc::new(PanickingVolume)];
        let (coordinator, _calls) = fixture.coordinator();

        let session = SessionId::parse(&request.session_id).unwrap();
        let guard = staging.lock_session(session).await;

        let failure = coordinator.analyze_guarded(request, guard).await.unwrap_err();

        assert_eq!(failure.stage, Stage::MeasuringVolume);
        assert_eq!(failure.error.kind(), ErrorKind::ReconstructionFailed);
        // the lock went down with the task
        assert_eq!(staging.locked_sessions(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_analysis_keeps_session_locked() {
        let root = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(root.path());
        let request = staged_request(&staging).await;
        let input_dir = request.input_dir.clone();
        let session = SessionId::parse(&request.session_id).unwrap();
        let mut fixture = Fixture::new();
        fixture.reconstruct_delay = Duration::from_millis(300);
        let (coordinator, calls) = fixture.coordinator();

        let guard = staging.lock_session(session).await;
        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), coordinator.analyze_guarded(request, guard)).await;
        assert!(abandoned.is_err());

        // caller is gone but the analysis still owns the session
        let retry = tokio::time::timeout(Duration::from_millis(50), staging.lock_session(session)).await;
        assert!(retry.is_err());
        assert!(latest_input(&input_dir).await.unwrap().is_some());

        let retry = tokio::time::timeout(Duration::from_secs(5), staging.lock_session(session))
            .await
            .unwrap();
        assert_eq!(calls.reconstruct.load(Ordering::SeqCst), 1);
        assert_eq!(calls.lookup.load(Ordering::SeqCst), 1);
        assert_eq!(latest_input(&input_dir).await.unwrap(), None);
        drop(retry);
    }

    #[tokio::test]
    async fn test_image_conversion_error() {
        let root = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(root.path());
        let request = staged_request(&staging).await;
        let mut fixture = Fixture::new();
        fixture.failing = Some(Failing::Images);
        let (coordinator, calls) = fixture.coordinator();

        let failure = coordinator.analyze(&request).await.unwrap_err();

        assert_eq!(failure.stage, Stage::Identifying);
        assert_eq!(failure.error.kind(), ErrorKind::ImageConversionFailed);
        assert!(failure.error.to_string().contains("connection reset"));
        assert_eq!(calls.classify.load(Ordering::SeqCst), 0);
        assert_eq!(calls.reconstruct.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_classifier_error_is_object_not_identified() {
        let root = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(root.path());
        let request = staged_request(&staging).await;
        let mut fixture = Fixture::new();
        fixture.failing = Some(Failing::Classifier);
        let (coordinator, calls) = fixture.coordinator();

        let failure = coordinator.analyze(&request).await.unwrap_err();

        assert_eq!(failure.stage, Stage::Identifying);
        assert_eq!(failure.error.kind(), ErrorKind::ObjectNotIdentified);
        assert_eq!(calls.classify.load(Ordering::SeqCst), 1);
        assert_eq!(calls.reconstruct.load(Ordering::SeqCst), 0);
        assert_eq!(calls.lookup.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_lookup_error_is_nutrient_lookup_failure() {
        let root = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(root.path());
        let request = staged_request(&staging).await;
        let mut fixture = Fixture::new();
        fixture.density = Arc::new(EmbeddedDensity);
        fixture.failing = Some(Failing::Lookup);
        let (coordinator, calls) = fixture.coordinator();

        let failure = coordinator.analyze(&request).await.unwrap_err();

        assert_eq!(failure.stage, Stage::FetchingNutrients);
        assert_eq!(failure.error.kind(), ErrorKind::NutrientLookupFailed);
        assert_eq!(calls.lookup.load(Ordering::SeqCst), 1);
        // inputs survive a failed analysis
        assert!(latest_input(&request.input_dir).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_embedded_density_missing_or_zero() {
        for density in [None, Some(0.0)] {
            let root = tempfile::tempdir().unwrap();
            let staging = StagingArea::new(root.path());
            let request = staged_request(&staging).await;
            let mut fixture = Fixture::new();
            fixture.density = Arc::new(EmbeddedDensity);
            fixture.food = Some(pear_food(density));
            let (coordinator, calls) = fixture.coordinator();

            let failure = coordinator.analyze(&request).await.unwrap_err();

            assert_eq!(failure.stage, Stage::LookingUpDensity, "density {:?}", density);
            assert_eq!(failure.error.kind(), ErrorKind::DensityUnavailable);
            assert_eq!(calls.reconstruct.load(Ordering::SeqCst), 1);
            assert_eq!(calls.lookup.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn test_zero_table_density() {
        let root = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(root.path());
        let request = staged_request(&staging).await;
        let mut fixture = Fixture::new();
        fixture.density = Arc::new(DensityTable::parse("pear;0\n"));
        let (coordinator, calls) = fixture.coordinator();

        let failure = coordinator.analyze(&request).await.unwrap_err();

        assert_eq!(failure.stage, Stage::LookingUpDensity);
        assert_eq!(failure.error.kind(), ErrorKind::DensityUnavailable);
        assert_eq!(calls.reconstruct.load(Ordering::SeqCst), 0);
    }
}
