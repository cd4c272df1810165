//! Domain model module declarations.

pub mod error;
pub mod estimation;
pub mod progress;
pub mod session;
pub mod stage;
