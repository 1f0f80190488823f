//! `env_logger` setup for the demo binary and embedding applications.

use std::io::Write;

use colored::*;
use log::{Level, LevelFilter};

use crate::config::{LogFormat, LogLevel};
use crate::error_handling::InitializationError;

/// Installs a global logger writing either colored lines or JSON objects.
///
/// `RUST_LOG` is read first; `level` then applies to this crate and as the
/// default for everything else. HTTP client internals stay at info.
///
/// # Errors
///
/// Returns `InitializationError::LoggerError` if a logger is already installed.
pub fn init_logger_with(level: LevelFilter, format: LogFormat) -> Result<(), InitializationError> {
    let mut builder = env_logger::Builder::from_default_env();
    builder
        .filter_level(level)
        .filter_module("reqwest", LevelFilter::Info)
        .filter_module("hyper", LevelFilter::Info)
        .filter_module("api_throttle", level);

    match format {
        LogFormat::Json => builder.format(|buf, record| {
            let line = json_line(
                chrono::Utc::now().timestamp_millis(),
                record.level(),
                record.target(),
                &record.args().to_string(),
            );
            writeln!(buf, "{line}")
        }),
        LogFormat::Plain => builder.format(|buf, record| {
            let line = plain_line(record.level(), record.target(), &record.args().to_string());
            writeln!(buf, "{line}")
        }),
    };

    builder.try_init().map_err(InitializationError::from)?;
    Ok(())
}

/// Installs the logger from the CLI-facing [`LogLevel`].
///
/// # Errors
///
/// Returns `InitializationError::LoggerError` if a logger is already installed.
pub fn init_logger(level: LogLevel, format: LogFormat) -> Result<(), InitializationError> {
    init_logger_with(level.into(), format)
}

fn json_line(ts_millis: i64, level: Level, target: &str, msg: &str) -> String {
    serde_json::json!({
        "ts": ts_millis,
        "level": level.as_str(),
        "target": target,
        "msg": msg,
    })
    .to_string()
}

fn plain_line(level: Level, target: &str, msg: &str) -> String {
    let tag = match level {
        Level::Error => level.as_str().red().bold(),
        Level::Warn => level.as_str().yellow(),
        Level::Info => level.as_str().green(),
        Level::Debug => level.as_str().blue(),
        Level::Trace => level.as_str().dimmed(),
    };
    format!(
        "{} {} {} {}",
        chrono::Local::now().format("%H:%M:%S%.3f"),
        tag,
        target.cyan(),
        msg
    )
}
