#![forbid(unsafe_code)]

//! Progress tracking for multi-stage document processing sessions.
//!
//! A [`SessionManager`] follows each session through
//! `idle → uploading → preprocessing → ai-analysis → data-extraction →
//! validation → completed`, publishing weighted progress, a continuously
//! revised time estimate, and stage-gated cancellation.

pub mod clock;
pub mod config;
pub mod errors;
pub mod estimator;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod registry;

pub use config::TrackerConfig;
pub use errors::{AppError, Result};
pub use orchestrator::{CancelOutcome, ProgressEvent, SessionManager};
