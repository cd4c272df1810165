//! Stage metadata table and the data-driven transition rules.
//!
//! Every stage decision the session manager makes (legal next stage,
//! cancellability, weighted progress) is answered here from one table.

use crate::models::stage::{Stage, StageInfo};
use crate::{AppError, Result};

/// Tolerance for the working-stage weight sum.
const WEIGHT_EPSILON: f64 = 1e-9;

/// Immutable table of stage metadata.
#[derive(Debug, Clone)]
pub struct StageRegistry {
    entries: Vec<StageInfo>,
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self {
            entries: vec![
                StageInfo::new(
                    Stage::Idle,
                    "Ready",
                    "Waiting for the pipeline to start",
                    0,
                    0.0,
                    true,
                ),
                StageInfo::new(
                    Stage::Uploading,
                    "Uploading",
                    "Transferring the image",
                    1_000,
                    0.05,
                    true,
                ),
                StageInfo::new(
                    Stage::Preprocessing,
                    "Preprocessing",
                    "Normalizing and compressing the image",
                    2_000,
                    0.15,
                    true,
                ),
                StageInfo::new(
                    Stage::AiAnalysis,
                    "AI analysis",
                    "Waiting on the remote model",
                    8_000,
                    0.60,
                    false,
                ),
                StageInfo::new(
                    Stage::DataExtraction,
                    "Data extraction",
                    "Extracting structured fields",
                    2_000,
                    0.15,
                    false,
                ),
                StageInfo::new(
                    Stage::Validation,
                    "Validation",
                    "Validating extracted data",
                    1_000,
                    0.05,
                    false,
                ),
                StageInfo::new(Stage::Completed, "Completed", "Processing finished", 0, 1.0, false),
                StageInfo::new(Stage::Error, "Error", "Processing failed", 0, 0.0, false),
                StageInfo::new(
                    Stage::Cancelled,
                    "Cancelled",
                    "Processing was cancelled",
                    0,
                    0.0,
                    false,
                ),
            ],
        }
    }
}

impl StageRegistry {
    /// Build a registry from a custom table.
    ///
    /// The table may omit stages (lookups for them fail with
    /// [`AppError::UnknownStage`]) but may not list one twice.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a stage is duplicated, a weight is
    /// outside `[0, 1]`, or the working-stage weights do not sum to 1.0.
    pub fn from_table(entries: Vec<StageInfo>) -> Result<Self> {
        for (idx, entry) in entries.iter().enumerate() {
            if entries[..idx].iter().any(|e| e.stage == entry.stage) {
                return Err(AppError::Config(format!("stage {} listed twice", entry.stage)));
            }
            if !(0.0..=1.0).contains(&entry.weight) {
                return Err(AppError::Config(format!(
                    "stage {} weight {} outside [0, 1]",
                    entry.stage, entry.weight
                )));
            }
        }

        let sum: f64 = entries
            .iter()
            .filter(|e| e.stage.is_working())
            .map(|e| e.weight)
            .sum();
        if (sum - 1.0).abs() > WEIGHT_EPSILON {
            return Err(AppError::Config(format!(
                "working stage weights must sum to 1.0, got {sum}"
            )));
        }

        Ok(Self { entries })
    }

    /// Metadata for `stage`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::UnknownStage` if the table has no entry for `stage`.
    pub fn stage_info(&self, stage: Stage) -> Result<&StageInfo> {
        self.entries
            .iter()
            .find(|e| e.stage == stage)
            .ok_or_else(|| AppError::UnknownStage(stage.to_string()))
    }

    /// Successor along the fixed pipeline order.
    #[must_use]
    pub fn next_stage(&self, stage: Stage) -> Option<Stage> {
        let idx = stage.pipeline_index()?;
        Stage::PIPELINE.get(idx + 1).copied()
    }

    /// Whether `from -> to` is a legal transition.
    #[must_use]
    pub fn is_valid_transition(&self, from: Stage, to: Stage) -> bool {
        if to.is_side_terminal() {
            return true;
        }
        if from.is_terminal() && to == Stage::Idle {
            return true;
        }
        self.next_stage(from) == Some(to)
    }

    /// Weight of `stage`, zero when the table has no entry.
    #[must_use]
    pub fn weight(&self, stage: Stage) -> f64 {
        self.stage_info(stage).map_or(0.0, |info| info.weight)
    }

    /// Whether a cancel request is honored in `stage`; unknown stages are not cancellable.
    #[must_use]
    pub fn is_cancellable(&self, stage: Stage) -> bool {
        self.stage_info(stage).is_ok_and(|info| info.cancellable)
    }

    /// Sum of working-stage weights strictly before `stage`.
    #[must_use]
    pub fn cumulative_weight(&self, stage: Stage) -> f64 {
        let Some(idx) = stage.pipeline_index() else {
            return 0.0;
        };
        Stage::PIPELINE[..idx]
            .iter()
            .filter(|s| s.is_working())
            .map(|s| self.weight(*s))
            .sum()
    }

    /// Weighted overall completion (0–100) for `stage` at `stage_progress` percent.
    #[must_use]
    pub fn calculate_overall_progress(&self, stage: Stage, stage_progress: f64) -> f64 {
        let pct = clamp_percent(stage_progress);
        let fraction = self.cumulative_weight(stage) + self.weight(stage) * pct / 100.0;
        100.0 * fraction.min(1.0)
    }

    /// Sum of expected durations of all working stages.
    #[must_use]
    pub fn total_expected_duration_ms(&self) -> u64 {
        self.entries
            .iter()
            .filter(|e| e.stage.is_working())
            .map(|e| e.expected_duration_ms)
            .sum()
    }
}

/// Clamp a percentage to `[0, 100]`, mapping NaN to zero.
#[must_use]
pub fn clamp_percent(pct: f64) -> f64 {
    if pct.is_nan() {
        0.0
    } else {
        pct.clamp(0.0, 100.0)
    }
}
