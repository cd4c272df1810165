//! Errors recorded on a processing session.
//!
//! These never escape the tracker's public operations; they accumulate on
//! [`ProcessingSession::errors`](super::session::ProcessingSession::errors)
//! for post-mortem inspection and drive the retry/abort decision.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::stage::Stage;

/// Classification of a recorded error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Driver requested a stage change the transition table forbids.
    InvalidStageTransition,
    /// Session outlived its absolute deadline.
    Timeout,
    /// Cancel requested during a stage that cannot be interrupted.
    CancellationNotAllowed,
    /// Opaque failure reported by the pipeline driver.
    Processing,
}

/// Error reported to, or raised by, the tracker for one session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ProcessingError {
    /// Error classification.
    pub kind: ErrorKind,
    /// Machine-readable code, e.g. `OCR_RATE_LIMITED`.
    pub code: String,
    /// Human-readable description.
    pub message: String,
    /// Whether retrying the current stage may succeed.
    pub recoverable: bool,
    /// Free-form context from the driver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ProcessingError {
    /// Upstream failure reported by the driver.
    #[must_use]
    pub fn processing(
        code: impl Into<String>,
        message: impl Into<String>,
        recoverable: bool,
    ) -> Self {
        Self {
            kind: ErrorKind::Processing,
            code: code.into(),
            message: message.into(),
            recoverable,
            details: None,
        }
    }

    /// Rejected stage change.
    #[must_use]
    pub fn invalid_transition(from: Stage, to: Stage) -> Self {
        Self {
            kind: ErrorKind::InvalidStageTransition,
            code: "INVALID_STAGE_TRANSITION".into(),
            message: format!("invalid stage transition: {from} -> {to}"),
            recoverable: false,
            details: Some(serde_json::json!({ "from": from, "to": to })),
        }
    }

    /// Session deadline exceeded.
    #[must_use]
    pub fn timeout(limit_ms: u64) -> Self {
        Self {
            kind: ErrorKind::Timeout,
            code: "TIMEOUT".into(),
            message: format!("processing exceeded {limit_ms}ms"),
            recoverable: false,
            details: Some(serde_json::json!({ "limit_ms": limit_ms })),
        }
    }

    /// Cancel rejected because of the current stage.
    #[must_use]
    pub fn cancellation_not_allowed(stage: Stage) -> Self {
        Self {
            kind: ErrorKind::CancellationNotAllowed,
            code: "CANCELLATION_NOT_ALLOWED".into(),
            message: format!("cancellation is not allowed during {stage}"),
            recoverable: false,
            details: Some(serde_json::json!({ "stage": stage })),
        }
    }

    /// Attach driver-supplied context.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Whether recording this error ends the session when no retry applies.
    ///
    /// A rejected cancel only fails the cancel request; the session keeps running.
    #[must_use]
    pub fn ends_session(&self) -> bool {
        self.kind != ErrorKind::CancellationNotAllowed
    }
}

impl Display for ProcessingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A [`ProcessingError`] qualified with where and when it occurred.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct SessionError {
    /// The underlying error.
    #[serde(flatten)]
    pub error: ProcessingError,
    /// Stage the session was in when the error was recorded.
    pub stage: Stage,
    /// When the error was recorded.
    pub timestamp: DateTime<Utc>,
    /// Retry counter value after this error was handled.
    pub retry_count: u32,
}
