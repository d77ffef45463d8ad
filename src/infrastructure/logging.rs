//! Tracing subscriber setup, with a secret-scrubbing regex layer guarding
//! log output against accidental credential leakage (API keys, bearer
//! tokens, and similar long opaque strings that end up in agent-runtime
//! request/response bodies).

use std::io;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::domain::models::{LogFormat, LoggingConfig};

mod secret_scrubbing;
pub use secret_scrubbing::SecretScrubber;

pub struct LoggerGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the global tracing subscriber. Returns a guard that must be
/// held for the process lifetime to flush the non-blocking file writer.
pub fn init(config: &LoggingConfig) -> anyhow::Result<LoggerGuard> {
    let level = parse_level(&config.level)?;
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let file_guard = if let Some(ref log_dir) = config.log_dir {
        let file_appender = rolling::daily(log_dir, "taskforge.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let file_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true);

        match config.format {
            LogFormat::Json => {
                let stdout_layer = tracing_subscriber::fmt::layer().json().with_writer(io::stdout);
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(file_layer)
                    .with(stdout_layer)
                    .init();
            }
            LogFormat::Pretty => {
                let stdout_layer = tracing_subscriber::fmt::layer().pretty().with_writer(io::stdout);
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(file_layer)
                    .with(stdout_layer)
                    .init();
            }
        }
        Some(guard)
    } else {
        match config.format {
            LogFormat::Json => {
                let stdout_layer = tracing_subscriber::fmt::layer().json().with_writer(io::stdout);
                tracing_subscriber::registry().with(env_filter).with(stdout_layer).init();
            }
            LogFormat::Pretty => {
                let stdout_layer = tracing_subscriber::fmt::layer().pretty().with_writer(io::stdout);
                tracing_subscriber::registry().with(env_filter).with(stdout_layer).init();
            }
        }
        None
    };

    tracing::info!(level = %config.level, format = ?config.format, "logging initialized");
    Ok(LoggerGuard { _file_guard: file_guard })
}

fn parse_level(level: &str) -> anyhow::Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => anyhow::bail!("invalid log level: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_levels_case_insensitively() {
        assert!(matches!(parse_level("INFO"), Ok(Level::INFO)));
        assert!(matches!(parse_level("warn"), Ok(Level::WARN)));
    }

    #[test]
    fn rejects_unknown_level() {
        assert!(parse_level("verbose").is_err());
    }
}
