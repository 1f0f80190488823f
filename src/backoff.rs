//! Exponential backoff with symmetric jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::ThrottleConfig;

/// Pre-jitter delay before retry number `retry` (1-based).
///
/// `min(initial * multiplier^(retry - 1), max)`. Monotonically non-decreasing
/// in `retry` for any valid config and never above `max_retry_delay`.
pub fn base_delay(config: &ThrottleConfig, retry: u32) -> Duration {
    let exponent = retry.saturating_sub(1);
    let factor = config
        .backoff_multiplier
        .powi(i32::try_from(exponent).unwrap_or(i32::MAX));
    let secs = config.initial_retry_delay.as_secs_f64() * factor;
    let max_secs = config.max_retry_delay.as_secs_f64();
    if !secs.is_finite() || secs >= max_secs {
        return config.max_retry_delay;
    }
    Duration::from_secs_f64(secs.max(0.0))
}

/// Perturbs `delay` uniformly within `±jitter_range` of itself, never below zero.
pub fn apply_jitter(delay: Duration, jitter_range: f64, rng: &mut impl Rng) -> Duration {
    if jitter_range <= 0.0 || delay.is_zero() {
        return delay;
    }
    let factor = 1.0 + rng.random_range(-jitter_range..=jitter_range);
    let jittered = (delay.as_secs_f64() * factor).max(0.0);
    Duration::from_secs_f64(jittered)
}

/// Delay to wait before retry number `retry`, jitter included.
pub fn retry_delay(config: &ThrottleConfig, retry: u32) -> Duration {
    apply_jitter(base_delay(config, retry), config.jitter_range, &mut rand::rng())
}
