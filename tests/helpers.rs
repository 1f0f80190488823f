// Shared test helpers: a scripted upstream and fast throttle configs.
//
// All tests run on a paused Tokio clock, so "seconds" of backoff and cooldown
// elapse instantly while keeping the ordering of timers intact.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use api_throttle::{ThrottleConfig, UpstreamError};
use tokio::time::Instant;

/// Upstream stub that replays a script of outcomes and records every call.
///
/// Once the script is exhausted it keeps returning the fallback outcome.
#[derive(Clone)]
pub struct ScriptedUpstream {
    script: Arc<Mutex<VecDeque<Result<u32, UpstreamError>>>>,
    fallback: Result<u32, UpstreamError>,
    calls: Arc<Mutex<Vec<Instant>>>,
}

#[allow(dead_code)] // Not every test file uses every helper
impl ScriptedUpstream {
    pub fn new(script: Vec<Result<u32, UpstreamError>>, fallback: Result<u32, UpstreamError>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            fallback,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always succeeds with `value`.
    pub fn ok(value: u32) -> Self {
        Self::new(Vec::new(), Ok(value))
    }

    /// Always fails with `error`.
    pub fn failing(error: UpstreamError) -> Self {
        Self::new(Vec::new(), Err(error))
    }

    /// The operation to hand to the manager.
    pub fn operation(
        &self,
    ) -> impl Fn() -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<u32, UpstreamError>> + Send>>
           + Send
           + Sync
           + 'static {
        let this = self.clone();
        move || {
            let this = this.clone();
            Box::pin(async move {
                this.calls.lock().unwrap().push(Instant::now());
                let next = this.script.lock().unwrap().pop_front();
                next.unwrap_or_else(|| this.fallback.clone())
            })
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }
}

/// High limits, no jitter and short delays so tests only wait on what they exercise.
#[allow(dead_code)]
pub fn fast_config() -> ThrottleConfig {
    ThrottleConfig {
        max_requests_per_second: 100,
        max_requests_per_minute: 10_000,
        initial_retry_delay: Duration::from_millis(100),
        max_retry_delay: Duration::from_secs(2),
        jitter_range: 0.0,
        tick_interval: Duration::from_millis(10),
        ..ThrottleConfig::default()
    }
}
