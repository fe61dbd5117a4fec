//! Status Tool
//!
//! Liveness and runtime status of the analyser service.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::build_info::BuildInfo;

/// Usage guide for MCP clients
pub const ANALYSIS_INSTRUCTIONS: &str = r#"
# Food Analyser Instructions

The analyser estimates the mass and nutrient content of a single food item
from a set of photos taken around it.

## Workflow

1. **Upload photos** with `upload_image`, one call per photo.
   - The first call without a `session_id` starts a new session and
     returns its id.
   - Pass that `session_id` to every further upload of the same capture.
   - The most recently uploaded photo is the one used to identify the food,
     so finish with a clear, well-lit shot of the whole item.
2. **Analyse** with `analyse_object` and the `session_id`.
   - The food is identified, a 3D model is reconstructed from all photos,
     its volume is measured and multiplied by the food's density to get
     the weight, and nutrients per 100 g are scaled to that weight.
   - Reconstruction can take several minutes.
3. **Fetch the model** (optional) with `get_3d_model` and the `session_id`.

## Results

- `weightInGrams` is the mass used for the nutrients.
- `volumes` lists every volume routine with its own volume and weight;
  the first entry is the one the nutrients are based on.
- `nutrients` keys are short names such as `protein`, `fat`,
  `carbohydrates`, `kcal`, `kJ`, `vitaminC`, `vitaminB12`.

## Failures

Every failure carries a `status` code, a `kind` and a `message`:

| kind | status | meaning |
|------|--------|---------|
| NoInputProvided | 400 | no photo uploaded for the session |
| ObjectNotIdentified | 422 | no food recognised with enough confidence |
| DensityUnavailable | 422 | no density known for the food |
| NoRelevantNutrients | 422 | the nutrient record had nothing of interest |
| InvalidMeasurement | 422 | the measured volume was not usable |
| ModelArtifactNotFound | 404 | no 3D model for the session |
| NutrientLookupFailed | 502 | the nutrient database had no match |
| CollaboratorTimeout | 504 | a stage took too long |
| ImageConversionFailed, ReconstructionFailed | 500 | processing error |

Retake the photos for 422 failures; retry later for 502/504.
"#;

/// Runtime status of the service
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    /// Build information
    pub build_number: u64,
    pub build_timestamp: &'static str,
    pub version: &'static str,

    /// Staging information
    pub staging_root: String,
    pub staging_sessions: usize,

    /// Process information
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub process_id: u32,
    pub memory_usage_bytes: u64,
}

/// Status tracker for collecting runtime information
#[derive(Debug)]
pub struct StatusTracker {
    start_time: Instant,
    started_at: DateTime<Utc>,
    staging_root: PathBuf,
}

impl StatusTracker {
    /// Create a new status tracker
    pub fn new(staging_root: PathBuf) -> Self {
        Self {
            start_time: Instant::now(),
            started_at: Utc::now(),
            staging_root,
        }
    }

    /// Get the current status
    pub fn get_status(&self) -> ServiceStatus {
        let build_info = BuildInfo::current();

        let staging_sessions = std::fs::read_dir(&self.staging_root)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
                    .count()
            })
            .unwrap_or(0);

        // Get process info
        let pid = std::process::id();
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::Some(&[Pid::from_u32(pid)]));

        let memory_usage_bytes = sys
            .process(Pid::from_u32(pid))
            .map(|p| p.memory())
            .unwrap_or(0);

        ServiceStatus {
            build_number: build_info.build_number,
            build_timestamp: build_info.build_timestamp,
            version: build_info.version,
            staging_root: self.staging_root.display().to_string(),
            staging_sessions,
            started_at: self.started_at,
            uptime_seconds: self.start_time.elapsed().as_secs(),
            process_id: pid,
            memory_usage_bytes,
        }
    }
}
