//! Demo binary: drives a throttle manager against a simulated flaky upstream.
//!
//! This is a thin wrapper around the `api_throttle` library that handles:
//! - Command-line argument parsing
//! - Logger initialization
//! - Generating a burst of mixed-priority requests
//! - User-facing output formatting

use std::future::Future;
use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use futures::future::join_all;
use rand::Rng;

use api_throttle::initialization::init_logger;
use api_throttle::{
    LogFormat, LogLevel, ThrottleConfig, ThrottleError, ThrottleManager, ThrottleOptions,
    UpstreamError,
};

/// Built-in policy to start from.
#[derive(Clone, Debug, ValueEnum)]
enum Preset {
    /// Conversational AI endpoint (5/s, 50/min, 3 retries)
    Ai,
    /// General internal API (10/s, 100/min, 2 retries)
    General,
}

/// Command-line options for the demo.
#[derive(Parser, Debug)]
#[command(
    name = "api_throttle",
    about = "Run a burst of requests through the throttle manager against a simulated upstream"
)]
struct DemoArgs {
    /// Number of requests to submit
    #[arg(long, default_value_t = 30)]
    requests: usize,

    /// Policy preset
    #[arg(long, value_enum, default_value_t = Preset::Ai)]
    preset: Preset,

    /// Override the per-second admission limit
    #[arg(long)]
    rps: Option<u32>,

    /// Override the per-minute admission limit
    #[arg(long)]
    rpm: Option<u32>,

    /// Override the retry budget
    #[arg(long)]
    max_retries: Option<u32>,

    /// Probability that a simulated call fails with a transient error
    #[arg(long, default_value_t = 0.2)]
    failure_rate: f64,

    /// Simulated upstream latency in milliseconds
    #[arg(long, default_value_t = 150)]
    latency_ms: u64,

    /// Number of distinct cache keys cycled through (0 disables cache keys)
    #[arg(long, default_value_t = 5)]
    distinct_keys: usize,

    /// Print the final statistics as JSON
    #[arg(long)]
    json_stats: bool,

    /// Log level
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Log format
    #[arg(long, value_enum, default_value_t = LogFormat::Plain)]
    log_format: LogFormat,
}

impl DemoArgs {
    fn throttle_config(&self) -> ThrottleConfig {
        let mut config = match self.preset {
            Preset::Ai => ThrottleConfig::for_ai_endpoint(),
            Preset::General => ThrottleConfig::for_general_api(),
        };
        if let Some(rps) = self.rps {
            config.max_requests_per_second = rps;
        }
        if let Some(rpm) = self.rpm {
            config.max_requests_per_minute = rpm;
        }
        if let Some(retries) = self.max_retries {
            config.max_retries = retries;
        }
        config
    }
}

/// One simulated upstream call.
async fn simulated_call(index: usize, failure_rate: f64, latency: Duration) -> Result<String, UpstreamError> {
    tokio::time::sleep(latency).await;
    let roll: f64 = rand::rng().random();
    if roll < failure_rate * 0.1 {
        Err(UpstreamError::status(429)
            .with_message("rate limited")
            .with_retry_after(Duration::from_secs(1)))
    } else if roll < failure_rate {
        Err(UpstreamError::status(503).with_message("service unavailable"))
    } else if roll > 0.98 {
        Err(UpstreamError::status(404).with_message("no such model"))
    } else {
        Ok(format!("completion #{index}"))
    }
}

/// Submits `requests` calls, one wave per await.
///
/// With cache keys, the first wave holds one request per key so later
/// requests for the same key hit the cache instead of racing the first call.
async fn run_in_waves<F, Fut>(
    manager: &ThrottleManager<String>,
    requests: usize,
    distinct_keys: usize,
    call: F,
) -> Vec<Result<String, ThrottleError>>
where
    F: Fn(usize) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<String, UpstreamError>> + Send + 'static,
{
    let first_wave = distinct_keys.min(requests);
    let mut results = Vec::with_capacity(requests);
    for wave in [0..first_wave, first_wave..requests] {
        let mut handles = Vec::with_capacity(wave.len());
        for index in wave {
            let mut options = ThrottleOptions::new().priority((index % 3) as i32);
            if distinct_keys > 0 {
                options = options.cache_key(format!("prompt:{}", index % distinct_keys));
            }
            let call = call.clone();
            handles.push(manager.submit(move || call(index), options).await);
        }
        results.extend(join_all(handles).await);
    }
    results
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = DemoArgs::parse();

    init_logger(args.log_level.clone(), args.log_format.clone())
        .context("Failed to initialize logger")?;

    let manager: ThrottleManager<String> = ThrottleManager::new(args.throttle_config())
        .context("Failed to start throttle manager")?;

    let latency = Duration::from_millis(args.latency_ms);
    let failure_rate = args.failure_rate;
    let started = tokio::time::Instant::now();

    let results = run_in_waves(&manager, args.requests, args.distinct_keys, move |index| {
        simulated_call(index, failure_rate, latency)
    })
    .await;
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let circuit_rejected = results
        .iter()
        .filter(|r| matches!(r, Err(ThrottleError::CircuitOpen { .. })))
        .count();
    for (index, result) in results.iter().enumerate() {
        if let Err(e) = result {
            log::warn!("request {} failed: {}", index, e);
        }
    }

    let stats = manager.stats().await;
    manager.shutdown().await;

    if args.json_stats {
        match serde_json::to_string_pretty(&stats) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("api_throttle error: {:#}", e);
                process::exit(1);
            }
        }
    } else {
        stats.log_summary();
    }

    println!(
        "✅ {} request{} in {:.1}s: {} succeeded, {} failed ({} rejected by open circuit), {} cache hit{}",
        results.len(),
        if results.len() == 1 { "" } else { "s" },
        started.elapsed().as_secs_f64(),
        succeeded,
        results.len() - succeeded,
        circuit_rejected,
        stats.cache_hits,
        if stats.cache_hits == 1 { "" } else { "s" },
    );
    Ok(())
}
