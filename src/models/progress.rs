//! Progress snapshot published on every tick and stage change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::stage::Stage;

/// Point-in-time view of a session's progress.
///
/// Replaced wholesale on every update; observers may keep old copies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ProcessingProgress {
    /// Session this snapshot belongs to.
    pub session_id: String,
    /// Stage the pipeline is in.
    pub current_stage: Stage,
    /// Weighted overall completion, 0–100.
    pub overall_progress: f64,
    /// Completion of the current stage, 0–100.
    pub stage_progress: f64,
    /// When the current run started.
    pub start_time: DateTime<Utc>,
    /// When this snapshot was taken.
    pub current_time: DateTime<Utc>,
    /// Projected finish time.
    pub estimated_completion: DateTime<Utc>,
    /// Milliseconds since `start_time`.
    pub elapsed_time_ms: u64,
    /// Projected milliseconds until completion.
    pub remaining_time_ms: u64,
    /// Overall progress gained per second of elapsed time.
    pub processing_speed: f64,
    /// Whether a cancel request would be honored right now.
    pub cancellable: bool,
    /// Elapsed time has exceeded the estimate by the configured tolerance.
    #[serde(default)]
    pub delayed: bool,
}

impl ProcessingProgress {
    /// Initial snapshot for a freshly started run.
    #[must_use]
    pub fn initial(
        session_id: &str,
        start_time: DateTime<Utc>,
        estimated_time_ms: u64,
        cancellable: bool,
    ) -> Self {
        Self {
            session_id: session_id.to_owned(),
            current_stage: Stage::Idle,
            overall_progress: 0.0,
            stage_progress: 0.0,
            start_time,
            current_time: start_time,
            estimated_completion: completion_at(start_time, estimated_time_ms),
            elapsed_time_ms: 0,
            remaining_time_ms: estimated_time_ms,
            processing_speed: 0.0,
            cancellable,
            delayed: false,
        }
    }
}

/// Convert whole milliseconds to a chrono duration, saturating on overflow.
#[must_use]
pub fn millis(ms: u64) -> chrono::Duration {
    chrono::Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
}

/// `now` plus `remaining_ms`, pinned to the latest representable instant
/// when a runaway projection would overflow.
#[must_use]
pub fn completion_at(now: DateTime<Utc>, remaining_ms: u64) -> DateTime<Utc> {
    now.checked_add_signed(millis(remaining_ms))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Non-negative milliseconds between two instants.
#[must_use]
pub fn elapsed_ms(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    u64::try_from((to - from).num_milliseconds()).unwrap_or(0)
}
