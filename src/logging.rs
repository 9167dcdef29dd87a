//! Logging initialization for tkw.
//!
//! Logs to stderr by default, or to `<dir>/tkw-{datetime}.log` when
//! `logging.dir` is set.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingSettings;

/// Result of logging initialization
pub struct LoggingHandle {
    /// Guard that must be kept alive for the duration of the program.
    /// When dropped, ensures all buffered logs are flushed.
    pub _guard: Option<WorkerGuard>,

    /// Path to the log file (only set when file logging is configured)
    pub log_file_path: Option<PathBuf>,
}

/// Resolve the effective filter directive.
///
/// Precedence: `--debug`, then `RUST_LOG` (`env_directive`), then settings.
fn filter_directive(
    settings: &LoggingSettings,
    debug_override: bool,
    env_directive: Option<String>,
) -> String {
    if debug_override {
        return "debug".to_string();
    }
    env_directive.unwrap_or_else(|| settings.level.clone())
}

fn log_file_name() -> String {
    let timestamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
    format!("tkw-{}.log", timestamp)
}

/// Initialize logging.
///
/// `RUST_LOG` overrides the configured level and `--debug` overrides both.
/// Returns a handle that must be kept alive for the duration of the program.
pub fn init_logging(settings: &LoggingSettings, debug_override: bool) -> Result<LoggingHandle> {
    let directive = filter_directive(settings, debug_override, std::env::var("RUST_LOG").ok());
    let filter = tracing_subscriber::EnvFilter::new(directive);

    if let Some(dir) = settings.dir.as_deref() {
        let logs_dir = Path::new(dir);
        std::fs::create_dir_all(logs_dir)?;

        let log_filename = log_file_name();
        let log_file_path = logs_dir.join(&log_filename);

        let file_appender = tracing_appender::rolling::never(logs_dir, &log_filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(false) // No ANSI codes in log files
                    .with_writer(non_blocking),
            )
            .init();

        Ok(LoggingHandle {
            _guard: Some(guard),
            log_file_path: Some(log_file_path),
        })
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();

        Ok(LoggingHandle {
            _guard: None,
            log_file_path: None,
        })
    }
}
