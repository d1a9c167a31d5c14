//! Logging setup.
//!
//! - **Production**: JSON to daily rolling files plus compact stdout for journald
//! - **Development**: pretty stdout with span open/close events
//!
//! The filter comes from `RUST_LOG`, then [`LOG_LEVEL_ENV`], then a default
//! that keeps HTTP client internals quiet.

use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log level override, used when `RUST_LOG` is not set.
pub const LOG_LEVEL_ENV: &str = "TTLOCK_LOG_LEVEL";

const DEFAULT_FILTER: &str = "info,hyper=warn,reqwest=warn";

const LOG_FILE_PREFIX: &str = "ttlock-bridge";

// The non-blocking writers stop flushing once their guards drop.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static STDOUT_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Output style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    /// Files plus journald-friendly stdout.
    Production,
    /// Human-friendly stdout.
    Development,
}

impl LogMode {
    /// Mode matching the `server.production` setting.
    #[must_use]
    pub const fn from_production_flag(production: bool) -> Self {
        if production {
            Self::Production
        } else {
            Self::Development
        }
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns an error if the filter does not parse or the log directory cannot
/// be created.
pub fn init(mode: LogMode) -> anyhow::Result<()> {
    let filter = env_filter()?;

    match mode {
        LogMode::Production => init_production(filter),
        LogMode::Development => {
            init_development(filter);
            Ok(())
        }
    }
}

fn env_filter() -> anyhow::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directives = std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| DEFAULT_FILTER.to_string());
    EnvFilter::try_new(&directives).with_context(|| format!("invalid {LOG_LEVEL_ENV}: {directives}"))
}

fn init_production(filter: EnvFilter) -> anyhow::Result<()> {
    let log_dir = log_directory();
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("cannot create log directory {}", log_dir.display()))?;

    let (file_writer, file_guard) = tracing_appender::non_blocking(RollingFileAppender::new(
        Rotation::DAILY,
        &log_dir,
        LOG_FILE_PREFIX,
    ));
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(file_writer)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(stdout_writer)
                .with_target(true)
                .with_ansi(false),
        )
        .init();

    let _ = FILE_GUARD.set(file_guard);
    let _ = STDOUT_GUARD.set(stdout_guard);
    Ok(())
}

fn init_development(filter: EnvFilter) {
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE),
        )
        .init();
}

/// Where production logs go.
fn log_directory() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/log/ttlock-bridge")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "ttlock-bridge")
            .map(|dirs| dirs.data_dir().join("logs"))
            .unwrap_or_else(|| PathBuf::from("./logs"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_directory_is_valid_path() {
        assert!(!log_directory().as_os_str().is_empty());
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    #[test]
    fn test_mode_from_flag() {
        assert_eq!(LogMode::from_production_flag(true), LogMode::Production);
        assert_eq!(LogMode::from_production_flag(false), LogMode::Development);
    }
}
