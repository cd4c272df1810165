//! Session orchestration modules.
//!
//! Covers the session state machine, the per-session tick/deadline timer,
//! cooperative cancellation tokens, and observer events.

pub mod cancellation;
pub mod events;
pub mod session_manager;
pub mod session_timer;

pub use cancellation::{CancellationObserver, CancellationToken};
pub use events::{EventBus, ProgressEvent};
pub use session_manager::{CancelOutcome, SessionManager, SessionManagerBuilder};
