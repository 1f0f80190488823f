//! Process-level setup for binaries embedding the throttle manager.
//!
//! The library itself never installs a logger; applications call
//! [`init_logger_with`] (or [`init_logger`]) once at startup.

mod logger;

// Re-export public API
pub use logger::{init_logger, init_logger_with};
