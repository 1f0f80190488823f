//! The throttle manager: public entry point tying the rate windows, queue,
//! cache, circuit breaker and retry policy together.

mod handle;
mod request;
mod scheduler;
mod stats;

pub use handle::ThrottleHandle;
pub use request::{RequestId, ThrottleOptions};
pub use stats::ThrottleStats;

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use log::{debug, info};
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::cache::TtlCache;
use crate::circuit_breaker::CircuitBreaker;
use crate::config::{ConfigError, ConfigUpdate, ThrottleConfig};
use crate::error_handling::{
    EventCounters, InitializationError, ThrottleError, ThrottleEvent, UpstreamError,
};
use crate::queue::PriorityQueue;
use crate::rate_window::RateWindowTracker;
use request::{Operation, QueuedRequest};

/// State shared between the manager handles, the scheduler loop and the
/// spawned attempts.
pub(crate) struct Shared<T> {
    pub(crate) config: RwLock<ThrottleConfig>,
    pub(crate) windows: RateWindowTracker,
    pub(crate) breaker: CircuitBreaker,
    pub(crate) cache: TtlCache<T>,
    pub(crate) queue: Mutex<PriorityQueue<RequestId, QueuedRequest<T>>>,
    pub(crate) counters: EventCounters,
    pub(crate) in_flight: AtomicUsize,
    next_id: AtomicU64,
    pub(crate) paused_until: Mutex<Option<Instant>>,
    pub(crate) next_sweep: Mutex<Instant>,
    pub(crate) shutdown: CancellationToken,
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Client-side resilience layer for calls to a rate-limited upstream.
///
/// Every call goes through a priority queue and is admitted only when both
/// rolling rate windows have room and the circuit breaker allows it.
/// Retryable failures are retried with exponential backoff and jitter;
/// successful results can be cached by key.
///
/// The manager is cheap to clone; clones share all state. The scheduler loop
/// stops once the last clone is dropped or [`shutdown`](Self::shutdown) is
/// called.
///
/// # Examples
///
/// ```no_run
/// use api_throttle::{ThrottleConfig, ThrottleManager, ThrottleOptions, UpstreamError};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let manager: ThrottleManager<String> = ThrottleManager::new(ThrottleConfig::default())?;
///
/// let summary = manager
///     .throttle(
///         || async { Ok::<_, UpstreamError>("fresh summary".to_string()) },
///         ThrottleOptions::new().cache_key("summary:42").priority(5),
///     )
///     .await?;
/// println!("{summary}");
/// # Ok(())
/// # }
/// ```
pub struct ThrottleManager<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for ThrottleManager<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> ThrottleManager<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates a manager and starts its scheduler loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or no Tokio runtime is
    /// running.
    pub fn new(config: ThrottleConfig) -> Result<Self, InitializationError> {
        config.validate()?;
        tokio::runtime::Handle::try_current().map_err(|e| {
            InitializationError::RuntimeError(format!("throttle manager needs a Tokio runtime: {e}"))
        })?;

        let now = Instant::now();
        let tick = config.tick_interval;
        let shared = Arc::new(Shared {
            windows: RateWindowTracker::new(
                config.max_requests_per_second,
                config.max_requests_per_minute,
            ),
            breaker: CircuitBreaker::with_threshold(
                config.failure_threshold,
                config.circuit_cooldown,
                config.half_open_max_probes,
            ),
            cache: TtlCache::new(config.cache_max_entries),
            queue: Mutex::new(PriorityQueue::new()),
            counters: EventCounters::new(),
            in_flight: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
            paused_until: Mutex::new(None),
            next_sweep: Mutex::new(now.checked_add(config.cache_sweep_interval).unwrap_or(now)),
            shutdown: CancellationToken::new(),
            config: RwLock::new(config),
        });

        scheduler::spawn_scheduler(&shared, tick);
        info!("Throttle manager started (tick {:?})", tick);
        Ok(Self { shared })
    }

    /// Submits `operation` and returns a handle to its eventual result.
    ///
    /// Cache hits and open-circuit rejections resolve immediately without
    /// queueing; everything else is queued by priority.
    pub async fn submit<F, Fut>(&self, operation: F, options: ThrottleOptions) -> ThrottleHandle<T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, UpstreamError>> + Send + 'static,
    {
        let shared = &self.shared;
        if shared.shutdown.is_cancelled() {
            return ThrottleHandle::ready(Err(ThrottleError::ShutDown));
        }

        if let Some(key) = options.cache_key.as_deref() {
            let enabled = shared.config.read().await.enable_cache;
            if enabled && !options.skip_cache {
                if let Some(value) = shared.cache.get(key).await {
                    shared.counters.increment(ThrottleEvent::CacheHit);
                    debug!("Cache hit for {}", key);
                    return ThrottleHandle::ready(Ok(value));
                }
                shared.counters.increment(ThrottleEvent::CacheMiss);
            }
        }

        if let Err(open) = shared.breaker.check_submission().await {
            shared.counters.increment(ThrottleEvent::CircuitRejected);
            return ThrottleHandle::ready(Err(ThrottleError::CircuitOpen {
                failures: open.failures,
                retry_in: open.retry_in,
            }));
        }

        let operation: Operation<T> = Arc::new(move || operation().boxed());
        let id = RequestId(shared.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        let priority = options.priority;
        let request = QueuedRequest::new(id, operation, options, tx);

        {
            let mut queue = shared.queue.lock().await;
            if shared.shutdown.is_cancelled() {
                drop(queue);
                request.resolve(Err(ThrottleError::ShutDown));
            } else {
                queue.push(id, priority, request);
                debug!("Queued {} with priority {} ({} waiting)", id, priority, queue.len());
            }
        }

        ThrottleHandle::pending(id, rx)
    }

    /// Runs `operation` under the throttle policy and waits for its result.
    ///
    /// # Errors
    ///
    /// Returns [`ThrottleError::CircuitOpen`] when the circuit is open,
    /// [`ThrottleError::RetriesExhausted`] or [`ThrottleError::NonRetryable`]
    /// when the upstream keeps failing, and the local-rejection variants when
    /// the request is cleared, cancelled or the manager shuts down.
    pub async fn throttle<F, Fut>(&self, operation: F, options: ThrottleOptions) -> Result<T, ThrottleError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, UpstreamError>> + Send + 'static,
    {
        self.submit(operation, options).await.await
    }

    /// Snapshot of queue, window, cache and breaker state plus event totals.
    pub async fn stats(&self) -> ThrottleStats {
        let shared = &self.shared;
        let (queue_size, retrying) = {
            let queue = shared.queue.lock().await;
            (queue.len(), queue.parked_len())
        };
        let (requests_per_second, requests_per_minute) = shared.windows.counts().await;
        let now = Instant::now();
        let paused_for_ms = shared
            .paused_remaining(now)
            .await
            .map(|d| d.as_millis() as u64);
        let next_slot_in_ms = shared
            .windows
            .next_slot()
            .await
            .map(|at| at.saturating_duration_since(now).as_millis() as u64);
        let circuit_breaker_state = shared.breaker.state().await;
        let counters = &shared.counters;

        ThrottleStats {
            queue_size,
            retrying,
            in_flight: shared.in_flight.load(Ordering::SeqCst),
            requests_per_second,
            requests_per_minute,
            cache_size: shared.cache.len().await,
            circuit_breaker_status: circuit_breaker_state.into(),
            circuit_breaker_state,
            failures: shared.breaker.failure_count().await,
            paused_for_ms,
            next_slot_in_ms,
            admitted: counters.get(ThrottleEvent::Admitted),
            succeeded: counters.get(ThrottleEvent::Succeeded),
            retried: counters.get(ThrottleEvent::Retried),
            failed: counters.get(ThrottleEvent::Failed),
            cache_hits: counters.get(ThrottleEvent::CacheHit),
            cache_misses: counters.get(ThrottleEvent::CacheMiss),
            circuit_rejections: counters.get(ThrottleEvent::CircuitRejected),
            cleared: counters.get(ThrottleEvent::Cleared),
            cancelled: counters.get(ThrottleEvent::Cancelled),
        }
    }

    /// Discards every request not yet executing, including those waiting to
    /// retry. Each resolves with [`ThrottleError::QueueCleared`].
    ///
    /// Returns the number of requests discarded.
    pub async fn clear_queue(&self) -> usize {
        let drained = self.shared.queue.lock().await.drain_all();
        let count = drained.len();
        for request in drained {
            request.resolve(Err(ThrottleError::QueueCleared));
        }
        if count > 0 {
            self.shared
                .counters
                .add(ThrottleEvent::Cleared, count as u64);
            info!("Cleared {} queued request(s)", count);
        }
        count
    }

    /// Removes one request that has not started executing.
    ///
    /// Returns `false` if the request is unknown, already running or done.
    pub async fn cancel(&self, id: RequestId) -> bool {
        let removed = self.shared.queue.lock().await.remove(id);
        match removed {
            Some(request) => {
                request.resolve(Err(ThrottleError::Cancelled));
                self.shared.counters.increment(ThrottleEvent::Cancelled);
                debug!("Cancelled {}", id);
                true
            }
            None => false,
        }
    }

    /// Stops the scheduler and resolves every queued request with
    /// [`ThrottleError::ShutDown`]. Operations already executing finish, but
    /// their failures are no longer retried.
    pub async fn shutdown(&self) {
        let shared = &self.shared;
        let drained = {
            let mut queue = shared.queue.lock().await;
            shared.shutdown.cancel();
            queue.drain_all()
        };
        let count = drained.len();
        for request in drained {
            request.resolve(Err(ThrottleError::ShutDown));
        }
        info!("Throttle manager shut down ({} queued request(s) dropped)", count);
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    /// Applies a partial config update. Takes effect on the next tick; in-flight
    /// requests keep the retry count they already have.
    ///
    /// # Errors
    ///
    /// Returns the validation error and leaves the config unchanged if the
    /// merged config is invalid.
    pub async fn update_config(&self, update: ConfigUpdate) -> Result<(), ConfigError> {
        let shared = &self.shared;
        let merged = {
            let mut config = shared.config.write().await;
            let merged = config.merged(&update);
            merged.validate()?;
            *config = merged.clone();
            merged
        };

        shared
            .windows
            .set_limits(merged.max_requests_per_second, merged.max_requests_per_minute)
            .await;
        shared
            .breaker
            .set_policy(
                merged.failure_threshold,
                merged.circuit_cooldown,
                merged.half_open_max_probes,
            )
            .await;
        shared.cache.set_max_entries(merged.cache_max_entries);
        if !merged.enable_cache {
            let dropped = shared.cache.clear().await;
            if dropped > 0 {
                debug!("Caching disabled, dropped {} entries", dropped);
            }
        }

        info!(
            "Throttle config updated: {}/s, {}/min, {} retries, cache {}",
            merged.max_requests_per_second,
            merged.max_requests_per_minute,
            merged.max_retries,
            if merged.enable_cache { "on" } else { "off" }
        );
        Ok(())
    }

    /// Current configuration.
    pub async fn config(&self) -> ThrottleConfig {
        self.shared.config.read().await.clone()
    }

    /// Stops all admissions for `duration`, as if the upstream had sent a
    /// retry-after hint. An existing longer pause is kept.
    pub async fn pause_for(&self, duration: Duration) {
        self.shared.pause_for(duration).await;
    }

    /// Drops the cached result for `key`. Returns whether one existed.
    pub async fn invalidate_cache(&self, key: &str) -> bool {
        self.shared.cache.remove(key).await
    }

    /// Drops every cached result. Returns the number of entries removed.
    pub async fn clear_cache(&self) -> usize {
        self.shared.cache.clear().await
    }
}
