//! Throttle configuration and constants.
//!
//! This module provides:
//! - Default policy constants (rate limits, retry timing, breaker thresholds)
//! - The [`ThrottleConfig`] policy struct and its partial [`ConfigUpdate`]
//! - Logging option enums shared with the demo binary

mod constants;
mod types;

// Re-export all constants
pub use constants::*;
pub use types::{ConfigError, ConfigUpdate, LogFormat, LogLevel, ThrottleConfig};
