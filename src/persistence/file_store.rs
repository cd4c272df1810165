//! One-JSON-file-per-session snapshot store.

use std::fmt::Write as _;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::SnapshotStore;
use crate::models::session::ProcessingSession;
use crate::{AppError, Result};

/// Writes `<dir>/<session-id>.json`, replacing the file atomically on save.
#[derive(Debug, Clone)]
pub struct JsonFileSnapshotStore {
    dir: PathBuf,
}

impl JsonFileSnapshotStore {
    /// Store snapshots under `dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the directory cannot be created.
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).map_err(|e| {
            AppError::Io(format!(
                "failed to create snapshot directory {}: {e}",
                dir.display()
            ))
        })?;
        Ok(Self { dir })
    }

    /// Directory snapshots are written to.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the snapshot file for `session_id`.
    ///
    /// ASCII letters, digits, and `-` are kept; every other byte, `_`
    /// included, becomes `_XX` (uppercase hex). The encoding is injective,
    /// so distinct ids never share a file and no id can escape the store
    /// directory.
    #[must_use]
    pub fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_id(session_id)))
    }
}

fn encode_id(session_id: &str) -> String {
    let mut encoded = String::with_capacity(session_id.len());
    for byte in session_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            encoded.push(char::from(byte));
        } else {
            let _ = write!(encoded, "_{byte:02X}");
        }
    }
    encoded
}

impl SnapshotStore for JsonFileSnapshotStore {
    fn save(&self, session_id: &str, session: &ProcessingSession) -> Result<()> {
        let path = self.path_for(session_id);
        let tmp = path.with_extension("json.tmp");
        let encoded = serde_json::to_vec_pretty(session)?;
        fs::write(&tmp, encoded)
            .map_err(|e| AppError::Io(format!("failed to write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &path)
            .map_err(|e| AppError::Io(format!("failed to replace {}: {e}", path.display())))?;
        Ok(())
    }

    fn load(&self, session_id: &str) -> Result<Option<ProcessingSession>> {
        let path = self.path_for(session_id);
        match fs::read(&path) {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(format!("failed to read {}: {e}", path.display()))),
        }
    }

    fn clear(&self, session_id: &str) -> Result<()> {
        let path = self.path_for(session_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Io(format!("failed to remove {}: {e}", path.display()))),
        }
    }
}
