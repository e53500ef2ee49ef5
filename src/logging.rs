use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_DIRECTIVE: &str = "superstore_normalizer=info,superstore=info";

/// Initializes the logging system with both console and file output.
///
/// The returned guard flushes the file writer when dropped, so the caller
/// keeps it alive for the duration of the run.
pub fn init_logging(log_dir: &Path) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    if fs::create_dir_all(log_dir).is_err() {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
        tracing::warn!(
            "Could not create log directory {}, logging to console only",
            log_dir.display()
        );
        return None;
    }

    // Create a non-blocking file appender for daily log rotation
    let file_appender = tracing_appender::rolling::daily(log_dir, "superstore.log");
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Create a JSON layer for file logging
    let file_layer = fmt::layer()
        .json()
        .with_ansi(false)
        .with_writer(non_blocking_writer);

    // Console output goes to stderr so `--json` summaries on stdout stay parseable
    let console_layer = fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    Some(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_logging_creates_log_dir_and_keeps_guard() {
        let dir = tempdir().unwrap();
        let log_dir = dir.path().join("logs");

        let guard = init_logging(&log_dir);

        assert!(guard.is_some());
        assert!(log_dir.is_dir());
    }
}
