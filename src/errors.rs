//! Error types shared across the tracker.

use std::fmt::{Display, Formatter};

/// Shared tracker result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Tracker error enumeration covering configuration, lookup, and storage failures.
///
/// Session-level failures reported by a pipeline driver are not `AppError`s;
/// they are recorded on the session as
/// [`ProcessingError`](crate::models::error::ProcessingError) values.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// JSON encoding or decoding failure.
    Serialization(String),
    /// Stage name or stage entry that the registry does not know.
    UnknownStage(String),
    /// Snapshot store failure.
    Persistence(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Serialization(msg) => write!(f, "serialization: {msg}"),
            Self::UnknownStage(msg) => write!(f, "unknown stage: {msg}"),
            Self::Persistence(msg) => write!(f, "persistence: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
