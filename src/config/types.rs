//! Configuration types.
//!
//! [`ThrottleConfig`] is the full policy of one throttle manager, [`ConfigUpdate`]
//! a partial overlay applied at runtime. Logging enums are shared with the demo
//! binary's CLI.

use std::time::Duration;

use clap::ValueEnum;
use thiserror::Error;

use crate::config::constants::*;

/// Logging level for the application.
///
/// Controls the verbosity of log output, from most restrictive (Error) to most
/// verbose (Trace).
#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and informational messages
    Info,
    /// All messages except trace
    Debug,
    /// All messages including trace
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Log output format.
///
/// - `Plain`: Human-readable format with colors (default)
/// - `Json`: Structured JSON format for machine parsing
#[derive(Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    Plain,
    /// Structured JSON format for machine parsing
    Json,
}

/// Errors produced when validating a [`ThrottleConfig`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A rate limit was set to zero, which would never admit anything.
    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),

    /// Backoff would shrink between attempts.
    #[error("backoff_multiplier must be >= 1.0 (got {0})")]
    InvalidMultiplier(f64),

    /// Jitter outside of `[0, 1]`.
    #[error("jitter_range must be within [0, 1] (got {0})")]
    InvalidJitter(f64),

    /// The first delay already exceeds the cap.
    #[error("initial_retry_delay ({initial:?}) exceeds max_retry_delay ({max:?})")]
    DelayOrdering {
        /// Configured initial delay
        initial: Duration,
        /// Configured maximum delay
        max: Duration,
    },
}

/// Policy of a single throttle manager.
///
/// One manager (and therefore one config) exists per distinct upstream. Use the
/// presets for the common cases and struct update syntax for the rest.
///
/// # Examples
///
/// ```
/// use api_throttle::ThrottleConfig;
/// use std::time::Duration;
///
/// let config = ThrottleConfig {
///     max_requests_per_second: 2,
///     cache_ttl: Duration::from_secs(300),
///     ..ThrottleConfig::for_ai_endpoint()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ThrottleConfig {
    /// Admissions allowed in any rolling second
    pub max_requests_per_second: u32,
    /// Admissions allowed in any rolling minute
    pub max_requests_per_minute: u32,
    /// Retries after the first attempt for retryable failures
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_retry_delay: Duration,
    /// Cap on the computed (pre-jitter) delay
    pub max_retry_delay: Duration,
    /// Growth factor between retry delays
    pub backoff_multiplier: f64,
    /// Symmetric jitter fraction applied to each delay
    pub jitter_range: f64,
    /// Whether cache keys are honored at all
    pub enable_cache: bool,
    /// Lifetime of cached results
    pub cache_ttl: Duration,
    /// Proactive sweep period for expired cache entries
    pub cache_sweep_interval: Duration,
    /// Maximum number of cached results
    pub cache_max_entries: usize,
    /// Consecutive terminal failures that open the circuit
    pub failure_threshold: u32,
    /// Wait after the last failure before half-open probing
    pub circuit_cooldown: Duration,
    /// Probe admissions per cooldown period
    pub half_open_max_probes: u32,
    /// Scheduler loop period
    pub tick_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_requests_per_second: DEFAULT_MAX_REQUESTS_PER_SECOND,
            max_requests_per_minute: DEFAULT_MAX_REQUESTS_PER_MINUTE,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_retry_delay: DEFAULT_INITIAL_RETRY_DELAY,
            max_retry_delay: DEFAULT_MAX_RETRY_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter_range: DEFAULT_JITTER_RANGE,
            enable_cache: true,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_sweep_interval: DEFAULT_CACHE_SWEEP_INTERVAL,
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            circuit_cooldown: DEFAULT_CIRCUIT_COOLDOWN,
            half_open_max_probes: DEFAULT_HALF_OPEN_MAX_PROBES,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

impl ThrottleConfig {
    /// Policy for a conversational AI endpoint (the stock defaults).
    pub fn for_ai_endpoint() -> Self {
        Self::default()
    }

    /// Looser policy for general internal APIs: higher rate budget, fewer and
    /// faster retries.
    pub fn for_general_api() -> Self {
        Self {
            max_requests_per_second: 10,
            max_requests_per_minute: 100,
            max_retries: 2,
            initial_retry_delay: Duration::from_millis(500),
            ..Self::default()
        }
    }

    /// Checks that the config can drive a scheduler.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_requests_per_second == 0 {
            return Err(ConfigError::ZeroLimit("max_requests_per_second"));
        }
        if self.max_requests_per_minute == 0 {
            return Err(ConfigError::ZeroLimit("max_requests_per_minute"));
        }
        if self.failure_threshold == 0 {
            return Err(ConfigError::ZeroLimit("failure_threshold"));
        }
        if self.half_open_max_probes == 0 {
            return Err(ConfigError::ZeroLimit("half_open_max_probes"));
        }
        if self.tick_interval.is_zero() {
            return Err(ConfigError::ZeroLimit("tick_interval"));
        }
        if self.cache_sweep_interval.is_zero() {
            return Err(ConfigError::ZeroLimit("cache_sweep_interval"));
        }
        if self.cache_max_entries == 0 {
            return Err(ConfigError::ZeroLimit("cache_max_entries"));
        }
        if self.backoff_multiplier.is_nan() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidMultiplier(self.backoff_multiplier));
        }
        if !(0.0..=1.0).contains(&self.jitter_range) {
            return Err(ConfigError::InvalidJitter(self.jitter_range));
        }
        if self.initial_retry_delay > self.max_retry_delay {
            return Err(ConfigError::DelayOrdering {
                initial: self.initial_retry_delay,
                max: self.max_retry_delay,
            });
        }
        Ok(())
    }

    /// Returns a copy of this config with every field set in `update` replaced.
    pub fn merged(&self, update: &ConfigUpdate) -> Self {
        Self {
            max_requests_per_second: update
                .max_requests_per_second
                .unwrap_or(self.max_requests_per_second),
            max_requests_per_minute: update
                .max_requests_per_minute
                .unwrap_or(self.max_requests_per_minute),
            max_retries: update.max_retries.unwrap_or(self.max_retries),
            initial_retry_delay: update
                .initial_retry_delay
                .unwrap_or(self.initial_retry_delay),
            max_retry_delay: update.max_retry_delay.unwrap_or(self.max_retry_delay),
            backoff_multiplier: update
                .backoff_multiplier
                .unwrap_or(self.backoff_multiplier),
            jitter_range: update.jitter_range.unwrap_or(self.jitter_range),
            enable_cache: update.enable_cache.unwrap_or(self.enable_cache),
            cache_ttl: update.cache_ttl.unwrap_or(self.cache_ttl),
            cache_sweep_interval: update
                .cache_sweep_interval
                .unwrap_or(self.cache_sweep_interval),
            cache_max_entries: update.cache_max_entries.unwrap_or(self.cache_max_entries),
            failure_threshold: update.failure_threshold.unwrap_or(self.failure_threshold),
            circuit_cooldown: update.circuit_cooldown.unwrap_or(self.circuit_cooldown),
            half_open_max_probes: update
                .half_open_max_probes
                .unwrap_or(self.half_open_max_probes),
            // The loop period is fixed once the scheduler is running.
            tick_interval: self.tick_interval,
        }
    }
}

/// Partial configuration applied by
/// [`ThrottleManager::update_config`](crate::ThrottleManager::update_config).
///
/// Fields left as `None` keep their current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigUpdate {
    /// See [`ThrottleConfig::max_requests_per_second`]
    pub max_requests_per_second: Option<u32>,
    /// See [`ThrottleConfig::max_requests_per_minute`]
    pub max_requests_per_minute: Option<u32>,
    /// See [`ThrottleConfig::max_retries`]
    pub max_retries: Option<u32>,
    /// See [`ThrottleConfig::initial_retry_delay`]
    pub initial_retry_delay: Option<Duration>,
    /// See [`ThrottleConfig::max_retry_delay`]
    pub max_retry_delay: Option<Duration>,
    /// See [`ThrottleConfig::backoff_multiplier`]
    pub backoff_multiplier: Option<f64>,
    /// See [`ThrottleConfig::jitter_range`]
    pub jitter_range: Option<f64>,
    /// See [`ThrottleConfig::enable_cache`]
    pub enable_cache: Option<bool>,
    /// See [`ThrottleConfig::cache_ttl`]
    pub cache_ttl: Option<Duration>,
    /// See [`ThrottleConfig::cache_sweep_interval`]
    pub cache_sweep_interval: Option<Duration>,
    /// See [`ThrottleConfig::cache_max_entries`]
    pub cache_max_entries: Option<usize>,
    /// See [`ThrottleConfig::failure_threshold`]
    pub failure_threshold: Option<u32>,
    /// See [`ThrottleConfig::circuit_cooldown`]
    pub circuit_cooldown: Option<Duration>,
    /// See [`ThrottleConfig::half_open_max_probes`]
    pub half_open_max_probes: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = ThrottleConfig::default();
        assert_eq!(config.max_requests_per_second, 5);
        assert_eq!(config.max_requests_per_minute, 50);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_retry_delay, Duration::from_millis(1000));
        assert_eq!(config.max_retry_delay, Duration::from_millis(32_000));
        assert_eq!(config.backoff_multiplier, 2.0);
        assert_eq!(config.jitter_range, 0.1);
        assert!(config.enable_cache);
        assert_eq!(config.cache_ttl, Duration::from_millis(60_000));
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.circuit_cooldown, Duration::from_secs(30));
        assert_eq!(config.half_open_max_probes, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(ThrottleConfig::for_ai_endpoint().validate().is_ok());
        let general = ThrottleConfig::for_general_api();
        assert!(general.validate().is_ok());
        assert!(general.max_requests_per_second > ThrottleConfig::default().max_requests_per_second);
    }

    #[test]
    fn test_validate_rejects_zero_rps() {
        let config = ThrottleConfig {
            max_requests_per_second: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroLimit("max_requests_per_second"))
        );
    }

    #[test]
    fn test_validate_rejects_bad_jitter_and_multiplier() {
        let config = ThrottleConfig {
            jitter_range: 1.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidJitter(_))));

        let config = ThrottleConfig {
            backoff_multiplier: 0.5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidMultiplier(_))
        ));

        let config = ThrottleConfig {
            backoff_multiplier: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_delays() {
        let config = ThrottleConfig {
            initial_retry_delay: Duration::from_secs(10),
            max_retry_delay: Duration::from_secs(1),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DelayOrdering { .. })
        ));
    }

    #[test]
    fn test_merged_only_overrides_set_fields() {
        let base = ThrottleConfig::default();
        let update = ConfigUpdate {
            max_requests_per_second: Some(1),
            enable_cache: Some(false),
            ..Default::default()
        };
        let merged = base.merged(&update);
        assert_eq!(merged.max_requests_per_second, 1);
        assert!(!merged.enable_cache);
        assert_eq!(merged.max_requests_per_minute, base.max_requests_per_minute);
        assert_eq!(merged.cache_ttl, base.cache_ttl);
    }

    #[test]
    fn test_merged_empty_update_is_identity() {
        let base = ThrottleConfig::for_general_api();
        assert_eq!(base.merged(&ConfigUpdate::default()), base);
    }
}
