//! Processing session model and lifecycle helpers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::SessionError;
use super::estimation::{ImageMetadata, TimeEstimation};
use super::progress::ProcessingProgress;
use super::stage::Stage;

/// Lifecycle status for a processing session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Pipeline is running (including `idle` before the first stage).
    Active,
    /// Pipeline reached `completed`.
    Completed,
    /// Pipeline reached `error`.
    Failed,
    /// Pipeline reached `cancelled`.
    Cancelled,
}

impl SessionStatus {
    /// Status implied by entering `stage`.
    #[must_use]
    pub fn for_stage(stage: Stage) -> Self {
        match stage {
            Stage::Completed => Self::Completed,
            Stage::Error => Self::Failed,
            Stage::Cancelled => Self::Cancelled,
            _ => Self::Active,
        }
    }

    /// Whether the session has finished its run.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self != Self::Active
    }
}

/// Timing, resource, and reliability figures collected during a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct SessionMetrics {
    /// Milliseconds spent in each stage that has been left.
    pub stage_timings_ms: BTreeMap<Stage, u64>,
    /// Most recent resident memory sample of this process.
    pub memory_usage_bytes: Option<u64>,
    /// Highest resident memory sample seen during the run.
    pub peak_memory_bytes: Option<u64>,
    /// Wall time from start to completion.
    pub total_time_ms: Option<u64>,
    /// Initial estimate divided by actual total time; above 1.0 means faster than expected.
    pub efficiency: Option<f64>,
    /// Input bytes processed per second of total time.
    pub throughput_bytes_per_sec: Option<f64>,
    /// Errors recorded during the run.
    pub error_count: u32,
    /// Recoverable errors that were absorbed as retries.
    pub retry_count: u32,
}

/// One tracked run of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ProcessingSession {
    /// Caller-chosen unique identifier.
    pub id: String,
    /// When the current run started.
    pub start_time: DateTime<Utc>,
    /// When the run reached a terminal stage.
    pub end_time: Option<DateTime<Utc>>,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Latest progress snapshot.
    pub progress: ProcessingProgress,
    /// Latest time estimation.
    pub time_estimation: TimeEstimation,
    /// Append-only error history, oldest first.
    pub errors: Vec<SessionError>,
    /// Run metrics.
    pub metrics: SessionMetrics,
    /// Input description supplied at start.
    pub image_metadata: Option<ImageMetadata>,
}

impl ProcessingSession {
    /// Construct a session at `idle` for a new run.
    #[must_use]
    pub fn new(
        id: &str,
        start_time: DateTime<Utc>,
        time_estimation: TimeEstimation,
        image_metadata: Option<ImageMetadata>,
        idle_cancellable: bool,
    ) -> Self {
        Self {
            id: id.to_owned(),
            start_time,
            end_time: None,
            status: SessionStatus::Active,
            progress: ProcessingProgress::initial(
                id,
                start_time,
                time_estimation.estimated_time_ms,
                idle_cancellable,
            ),
            time_estimation,
            errors: Vec::new(),
            metrics: SessionMetrics::default(),
            image_metadata,
        }
    }

    /// Stage the session is currently in.
    #[must_use]
    pub fn current_stage(&self) -> Stage {
        self.progress.current_stage
    }

    /// Whether the session still accepts stage updates.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}
