//! Scheduler loop: admission, execution and outcome routing.
//!
//! One loop task per manager wakes every tick, admits as many queued requests
//! as the circuit breaker and both rate windows allow, and spawns each
//! admitted operation as its own task so slow calls never block admission.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::FutureExt;
use log::{debug, info, warn};
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};

use super::request::QueuedRequest;
use super::Shared;
use crate::backoff::retry_delay;
use crate::circuit_breaker::Admission;
use crate::config::MAX_RETRY_AFTER;
use crate::error_handling::{
    classify_failure, FailureClass, ThrottleError, ThrottleEvent, UpstreamError,
};

/// Starts the scheduler loop for `shared`.
///
/// The loop holds only a weak reference and stops when the manager is dropped
/// or its shutdown token is cancelled.
pub(crate) fn spawn_scheduler<T>(shared: &Arc<Shared<T>>, tick: Duration)
where
    T: Clone + Send + Sync + 'static,
{
    let weak: Weak<Shared<T>> = Arc::downgrade(shared);
    let shutdown = shared.shutdown.clone();

    tokio::spawn(async move {
        let mut ticker = interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(shared) = weak.upgrade() else {
                        debug!("Throttle manager dropped, scheduler exiting");
                        break;
                    };
                    shared.tick().await;
                }
                _ = shutdown.cancelled() => {
                    debug!("Scheduler loop shutting down");
                    break;
                }
            }
        }
    });
}

impl<T> Shared<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// One scheduler pass.
    pub(crate) async fn tick(self: &Arc<Self>) {
        let now = Instant::now();
        self.maybe_sweep_cache(now).await;

        if self.paused_remaining(now).await.is_some() {
            return;
        }

        loop {
            if !self.breaker.can_admit().await || !self.windows.has_capacity().await {
                return;
            }

            let (request, probe) = {
                let mut queue = self.queue.lock().await;
                if queue.is_empty() {
                    return;
                }
                let admission = self.breaker.try_admit().await;
                if admission == Admission::Rejected {
                    return;
                }
                if !self.windows.try_admit().await {
                    if admission == Admission::Probe {
                        self.breaker.cancel_probe().await;
                    }
                    return;
                }
                let Some(request) = queue.pop() else {
                    return;
                };
                (request, admission == Admission::Probe)
            };

            self.counters.increment(ThrottleEvent::Admitted);
            self.in_flight.fetch_add(1, Ordering::SeqCst);
            debug!(
                "Admitted {} (priority {}, attempt {}{}, queued {:?})",
                request.id,
                request.priority,
                request.retries + 1,
                if probe { ", probe" } else { "" },
                request.enqueued_at.elapsed()
            );

            let shared = Arc::clone(self);
            tokio::spawn(async move { shared.execute(request, probe).await });
        }
    }

    /// Runs one attempt and routes its outcome.
    async fn execute(self: Arc<Self>, request: QueuedRequest<T>, probe: bool) {
        let outcome = AssertUnwindSafe((request.operation)())
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(UpstreamError::message("operation panicked")));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match outcome {
            Ok(value) => self.complete_success(request, value).await,
            Err(error) => self.complete_failure(request, error, probe).await,
        }
    }

    async fn complete_success(&self, request: QueuedRequest<T>, value: T) {
        self.breaker.record_success().await;

        if let Some(key) = &request.cache_key {
            let (enabled, ttl) = {
                let config = self.config.read().await;
                (config.enable_cache, config.cache_ttl)
            };
            if enabled {
                self.cache.insert(key.clone(), value.clone(), ttl).await;
            }
        }

        self.counters.increment(ThrottleEvent::Succeeded);
        debug!("{} succeeded after {} attempt(s)", request.id, request.retries + 1);
        request.resolve(Ok(value));
    }

    async fn complete_failure(
        self: &Arc<Self>,
        mut request: QueuedRequest<T>,
        error: UpstreamError,
        probe: bool,
    ) {
        if let Some(retry_after) = error.retry_after {
            self.pause_for(retry_after).await;
        }

        let config = self.config.read().await.clone();
        let class = classify_failure(&error);

        if class == FailureClass::Retryable && request.retries < config.max_retries {
            if probe {
                self.breaker.fail_probe().await;
            }
            request.retries += 1;
            let delay = retry_delay(&config, request.retries);
            warn!(
                "{} failed ({}), retry {}/{} in {:?}",
                request.id, error, request.retries, config.max_retries, delay
            );
            self.park_for_retry(request, delay).await;
            return;
        }

        self.breaker.record_failure(probe).await;
        self.counters.increment(ThrottleEvent::Failed);

        let attempts = request.retries + 1;
        let err = match class {
            FailureClass::Retryable => ThrottleError::RetriesExhausted {
                attempts,
                source: error,
            },
            FailureClass::NonRetryable => ThrottleError::NonRetryable(error),
        };
        debug!("{} failed terminally after {} attempt(s): {}", request.id, attempts, err);
        request.resolve(Err(err));
    }

    /// Holds the request outside the ready queue and re-enqueues it after `delay`.
    async fn park_for_retry(self: &Arc<Self>, request: QueuedRequest<T>, delay: Duration) {
        let id = request.id;
        {
            let mut queue = self.queue.lock().await;
            if self.shutdown.is_cancelled() {
                drop(queue);
                request.resolve(Err(ThrottleError::ShutDown));
                return;
            }
            queue.park(id, request.priority, request);
        }
        self.counters.increment(ThrottleEvent::Retried);

        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            sleep(delay).await;
            if let Some(shared) = weak.upgrade() {
                if !shared.queue.lock().await.unpark(id) {
                    debug!("{} was removed while waiting to retry", id);
                }
            }
        });
    }

    /// Stops all admissions until `duration` from now (extends, never shortens).
    ///
    /// `duration` is clamped to [`MAX_RETRY_AFTER`].
    pub(crate) async fn pause_for(&self, duration: Duration) {
        let duration = duration.min(MAX_RETRY_AFTER);
        let now = Instant::now();
        let until = now.checked_add(duration).unwrap_or(now);
        let mut paused = self.paused_until.lock().await;
        if paused.map_or(true, |current| until > current) {
            *paused = Some(until);
            warn!("Pausing all admissions for {:?}", duration);
        }
    }

    /// Time left on the global pause, if any.
    pub(crate) async fn paused_remaining(&self, now: Instant) -> Option<Duration> {
        let mut paused = self.paused_until.lock().await;
        match *paused {
            Some(until) if until > now => Some(until - now),
            Some(_) => {
                *paused = None;
                info!("Admission pause elapsed, resuming");
                None
            }
            None => None,
        }
    }

    async fn maybe_sweep_cache(&self, now: Instant) {
        let mut next_sweep = self.next_sweep.lock().await;
        if now < *next_sweep {
            return;
        }
        let interval = self.config.read().await.cache_sweep_interval;
        *next_sweep = now.checked_add(interval).unwrap_or(now + MAX_RETRY_AFTER);
        drop(next_sweep);

        let removed = self.cache.sweep().await;
        if removed > 0 {
            debug!("Cache sweep removed {} expired entries", removed);
        }
    }
}
