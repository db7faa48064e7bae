//! Diagnostic logging setup.

use crate::config::LoggingConfig;
use crate::error::{AssistantError, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// File name prefix of the daily-rotated log files.
pub const LOG_FILE_PREFIX: &str = "lara.log";

/// Filter from `RUST_LOG`, falling back to the configured directive.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter))
}

/// Directory the file layer writes to.
pub fn log_dir(config: &LoggingConfig) -> PathBuf {
    config
        .log_dir
        .clone()
        .unwrap_or_else(crate::lara_dirs::logs_dir)
}

/// Install the global subscriber: stderr always, plus a daily-rolling file
/// when `file_logging` is on.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes and closes the file writer.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created or a global
/// subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let stderr = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(env_filter(config));

    let (file, guard) = if config.file_logging {
        let dir = log_dir(config);
        std::fs::create_dir_all(&dir)?;
        let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .with_ansi(false)
            .with_writer(writer)
            .with_filter(env_filter(config));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(stderr)
        .with(file)
        .try_init()
        .map_err(|e| AssistantError::Config(format!("cannot install tracing subscriber: {e}")))?;

    Ok(guard)
}
