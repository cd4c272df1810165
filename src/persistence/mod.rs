//! Best-effort session snapshot persistence.
//!
//! Storage is an injected [`SnapshotStore`]. The session manager only talks
//! to [`ProgressPersistence`], which logs and swallows every store failure so
//! tracking never depends on storage succeeding.

pub mod file_store;
pub mod memory_store;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{PersistenceConfig, StoreBackend};
use crate::models::session::ProcessingSession;
use crate::Result;

pub use file_store::JsonFileSnapshotStore;
pub use memory_store::MemorySnapshotStore;

/// Storage capability for JSON session snapshots keyed by session id.
pub trait SnapshotStore: Send + Sync {
    /// Write (or overwrite) the snapshot for `session_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the underlying write fails.
    fn save(&self, session_id: &str, session: &ProcessingSession) -> Result<()>;

    /// Read the snapshot for `session_id`, if one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the read or decoding fails.
    fn load(&self, session_id: &str) -> Result<Option<ProcessingSession>>;

    /// Remove the snapshot for `session_id`; absent snapshots are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying delete fails.
    fn clear(&self, session_id: &str) -> Result<()>;
}

/// Failure-swallowing front for an optional [`SnapshotStore`].
#[derive(Clone, Default)]
pub struct ProgressPersistence {
    store: Option<Arc<dyn SnapshotStore>>,
}

impl ProgressPersistence {
    /// Persist through `store`.
    #[must_use]
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self { store: Some(store) }
    }

    /// Persistence that stores nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self { store: None }
    }

    /// Build the store selected by configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file store directory cannot be created.
    pub fn from_config(config: &PersistenceConfig) -> Result<Self> {
        if !config.enabled {
            return Ok(Self::disabled());
        }
        let store: Arc<dyn SnapshotStore> = match config.backend {
            StoreBackend::Memory => Arc::new(MemorySnapshotStore::new()),
            StoreBackend::File => Arc::new(JsonFileSnapshotStore::new(config.directory())?),
        };
        Ok(Self::new(store))
    }

    /// Whether a store is attached.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Save a snapshot, logging any failure.
    pub fn save(&self, session_id: &str, session: &ProcessingSession) {
        let Some(store) = &self.store else { return };
        match store.save(session_id, session) {
            Ok(()) => debug!(session_id, "session snapshot saved"),
            Err(err) => warn!(session_id, %err, "failed to save session snapshot"),
        }
    }

    /// Load a snapshot, treating any failure as absent.
    #[must_use]
    pub fn load(&self, session_id: &str) -> Option<ProcessingSession> {
        let store = self.store.as_ref()?;
        match store.load(session_id) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(session_id, %err, "failed to load session snapshot");
                None
            }
        }
    }

    /// Clear a snapshot, logging any failure.
    pub fn clear(&self, session_id: &str) {
        let Some(store) = &self.store else { return };
        if let Err(err) = store.clear(session_id) {
            warn!(session_id, %err, "failed to clear session snapshot");
        }
    }
}
