use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Non-blocking writer for `{log_dir}/run-{timestamp}.log`.
///
/// The guard must outlive all logging; dropping it flushes the file.
pub fn create_log_writer(log_dir: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log dir {}", log_dir.display()))?;

    let file_name = format!("run-{}.log", Utc::now().format("%Y%m%d-%H%M%S"));
    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    Ok(tracing_appender::non_blocking(file_appender))
}

/// Stderr logging filtered by `RUST_LOG`, plus a log file when `log_dir` is
/// set. Initialises at most once per process.
pub fn init(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let stderr = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = match log_dir.map(create_log_writer) {
        Some(Ok((writer, guard))) => (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(writer),
            ),
            Some(guard),
        ),
        Some(Err(err)) => {
            eprintln!("Warning: file logging disabled: {err:#}");
            (None, None)
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(stderr)
        .with(file_layer)
        .try_init()
        .ok();
    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_log_writer_creates_run_file() {
        let tmp = tempfile::tempdir().unwrap();
        let log_dir = tmp.path().join("logs");

        let (_writer, _guard) = create_log_writer(&log_dir).unwrap();

        let entries: Vec<_> = std::fs::read_dir(&log_dir).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let name = entries[0].as_ref().unwrap().file_name();
        let name = name.to_string_lossy();
        assert!(name.starts_with("run-"), "{name}");
        assert!(name.ends_with(".log"), "{name}");
    }
}
