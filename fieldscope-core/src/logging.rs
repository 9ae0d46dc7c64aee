//! File logging for the fieldscope client
//!
//! The watch dashboard owns the terminal, so nothing here may write to
//! stdout or stderr. All output is appended to a daily-rolling file under
//! the XDG state directory (`~/.local/state/fieldscope/fieldscope.log`).
//! `RUST_LOG` overrides the configured level when set.

use crate::config::{Config, LoggingConfig};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Flushes pending log writes when dropped. Keep it alive for the whole
/// process, including the terminal restore path.
pub struct LoggingGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Route all tracing output to the rolling log file.
///
/// Call once at startup, before the terminal is put into raw mode.
pub fn init(config: &LoggingConfig) -> crate::error::Result<LoggingGuard> {
    let log_dir = Config::state_dir();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "fieldscope.log");

    // Writes happen off the render thread
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .init();

    tracing::info!(
        log_dir = %log_dir.display(),
        level = %config.level,
        "Logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}

/// Initialize logging for tests. Output goes through the test writer so
/// it shows up with `--nocapture` or on failure; repeat calls are no-ops.
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
