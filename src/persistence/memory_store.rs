//! In-process snapshot store.

use std::collections::HashMap;
use std::sync::Mutex;

use super::SnapshotStore;
use crate::models::session::ProcessingSession;
use crate::{AppError, Result};

/// Keeps encoded snapshots in a map for the life of the process.
///
/// Snapshots are held as JSON text, the same artifact the file store writes.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<HashMap<String, String>>,
}

impl MemorySnapshotStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.lock().map_or(0, |guard| guard.len())
    }

    /// Whether the store holds no snapshots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, session_id: &str, session: &ProcessingSession) -> Result<()> {
        let encoded = serde_json::to_string(session)?;
        self.snapshots
            .lock()
            .map_err(|_| AppError::Persistence("snapshot map mutex poisoned".into()))?
            .insert(session_id.to_owned(), encoded);
        Ok(())
    }

    fn load(&self, session_id: &str) -> Result<Option<ProcessingSession>> {
        let guard = self
            .snapshots
            .lock()
            .map_err(|_| AppError::Persistence("snapshot map mutex poisoned".into()))?;
        guard
            .get(session_id)
            .map(|raw| serde_json::from_str(raw).map_err(AppError::from))
            .transpose()
    }

    fn clear(&self, session_id: &str) -> Result<()> {
        self.snapshots
            .lock()
            .map_err(|_| AppError::Persistence("snapshot map mutex poisoned".into()))?
            .remove(session_id);
        Ok(())
    }
}
