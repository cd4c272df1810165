//! Observer events and their fan-out.
//!
//! Events are pushed onto unbounded channels while the emitting session is
//! locked, so each subscriber sees one session's events in the order its
//! transitions were applied.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::models::error::SessionError;
use crate::models::progress::ProcessingProgress;
use crate::models::session::ProcessingSession;
use crate::models::stage::Stage;

/// Notification emitted by the session manager.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Fresh progress snapshot (every tick and every applied update).
    Progress(ProcessingProgress),
    /// The session moved to a different stage.
    StageChanged {
        /// Session that moved.
        session_id: String,
        /// Stage left.
        from: Stage,
        /// Stage entered.
        to: Stage,
        /// When the change was applied.
        at: DateTime<Utc>,
    },
    /// An error was recorded on the session.
    ErrorRecorded {
        /// Session the error belongs to.
        session_id: String,
        /// The recorded error.
        error: SessionError,
    },
    /// Elapsed time passed the estimate by the configured tolerance.
    Delayed {
        /// Session running late.
        session_id: String,
        /// Milliseconds elapsed when detected.
        elapsed_ms: u64,
        /// Current estimate of total time.
        estimated_ms: u64,
    },
    /// The session finished successfully; carries the final snapshot.
    Completed(Box<ProcessingSession>),
}

impl ProgressEvent {
    /// Session the event concerns.
    #[must_use]
    pub fn session_id(&self) -> &str {
        match self {
            Self::Progress(progress) => &progress.session_id,
            Self::StageChanged { session_id, .. }
            | Self::ErrorRecorded { session_id, .. }
            | Self::Delayed { session_id, .. } => session_id,
            Self::Completed(session) => &session.id,
        }
    }
}

/// Fan-out of [`ProgressEvent`]s to any number of subscribers.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ProgressEvent>>>,
}

impl EventBus {
    /// Register a new subscriber.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ProgressEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber, dropping closed ones.
    pub fn publish(&self, event: &ProgressEvent) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}
