//! Analysis pipeline: stage plan, coordinator and per-session staging

pub mod coordinator;
pub mod stage;
pub mod staging;

pub use coordinator::{select_label, AnalysisCoordinator, PipelineFailure, PipelineSettings};
pub use stage::{stage_plan, Stage, StageProgress};
pub use staging::{latest_input, AnalysisRequest, SessionGuard, SessionId, StagingArea};
