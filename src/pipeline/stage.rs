//! Pipeline stages
//!
//! Each stage of an analysis has its own failure kind. The order of the
//! density lookup depends on where densities come from.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::collaborators::DensitySourceKind;
use crate::error::AnalysisError;

/// One step of an analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Stage {
    AwaitingInput,
    Identifying,
    LookingUpDensity,
    MeasuringVolume,
    FetchingNutrients,
    Scaling,
    Complete,
}

impl Stage {
    const ALL: [Stage; 7] = [
        Stage::AwaitingInput,
        Stage::Identifying,
        Stage::LookingUpDensity,
        Stage::MeasuringVolume,
        Stage::FetchingNutrients,
        Stage::Scaling,
        Stage::Complete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::AwaitingInput => "AwaitingInput",
            Stage::Identifying => "Identifying",
            Stage::LookingUpDensity => "LookingUpDensity",
            Stage::MeasuringVolume => "MeasuringVolume",
            Stage::FetchingNutrients => "FetchingNutrients",
            Stage::Scaling => "Scaling",
            Stage::Complete => "Complete",
        }
    }

    fn index(self) -> u8 {
        Self::ALL.iter().position(|s| *s == self).unwrap_or(0) as u8
    }

    fn from_index(index: u8) -> Self {
        Self::ALL
            .get(index as usize)
            .copied()
            .unwrap_or(Stage::AwaitingInput)
    }

    /// The failure a collaborator error or fault maps to in this stage
    pub fn failure(&self, detail: impl Into<String>) -> AnalysisError {
        let detail = detail.into();
        match self {
            Stage::AwaitingInput => AnalysisError::NoInputProvided,
            Stage::Identifying => AnalysisError::ObjectNotIdentified(detail),
            Stage::LookingUpDensity => AnalysisError::DensityUnavailable(detail),
            Stage::MeasuringVolume => AnalysisError::ReconstructionFailed(detail),
            Stage::FetchingNutrients => AnalysisError::NutrientLookupFailed(detail),
            Stage::Scaling | Stage::Complete => AnalysisError::NoRelevantNutrients,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage order for a density source
///
/// A density table is consulted before the expensive reconstruction; a
/// density embedded in the nutrient record can only be read after the
/// nutrient lookup.
pub fn stage_plan(density: DensitySourceKind) -> [Stage; 7] {
    match density {
        DensitySourceKind::Table => [
            Stage::AwaitingInput,
            Stage::Identifying,
            Stage::LookingUpDensity,
            Stage::MeasuringVolume,
            Stage::FetchingNutrients,
            Stage::Scaling,
            Stage::Complete,
        ],
        DensitySourceKind::Embedded => [
            Stage::AwaitingInput,
            Stage::Identifying,
            Stage::MeasuringVolume,
            Stage::FetchingNutrients,
            Stage::LookingUpDensity,
            Stage::Scaling,
            Stage::Complete,
        ],
    }
}

/// Shared record of the stage an analysis is currently in
///
/// Lets the caller attribute a fault to a stage after the task running
/// the analysis has died.
#[derive(Debug, Clone, Default)]
pub struct StageProgress(Arc<AtomicU8>);

impl StageProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self, stage: Stage) {
        self.0.store(stage.index(), Ordering::SeqCst);
    }

    pub fn current(&self) -> Stage {
        Stage::from_index(self.0.load(Ordering::SeqCst))
    }
}
