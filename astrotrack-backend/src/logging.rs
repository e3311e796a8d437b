use anyhow::Context;
use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};
use tokio::task;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, filter::LevelFilter, fmt, fmt::writer::BoxMakeWriter, prelude::*};

const MAX_LOG_AGE: Duration = Duration::from_secs(60 * 60 * 24 * 3);
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Keeps the file writer flushing; drop it only at shutdown.
#[allow(dead_code)]
pub struct LoggerGuard(WorkerGuard);

/// Unknown level names fall back to `info`.
fn level_filter(level: &str) -> (LevelFilter, bool) {
    match level.parse() {
        Ok(filter) => (filter, true),
        Err(_) => (LevelFilter::INFO, false),
    }
}

/// Console plus daily-rotated file logging. `RUST_LOG` overrides `level`.
///
/// Console output goes to stderr when `console_stderr` is set, leaving stdout
/// to program output.
///
/// Must be called from within a Tokio runtime: old log files are pruned by a
/// background task.
pub fn init_logging(
    log_dir: impl AsRef<Path>,
    prefix: &str,
    level: &str,
    console_stderr: bool,
) -> anyhow::Result<LoggerGuard> {
    let log_dir = log_dir.as_ref().to_path_buf();
    let (default_level, known_level) = level_filter(level);

    let builder = EnvFilter::builder().with_default_directive(default_level.into());
    let rust_log = std::env::var("RUST_LOG").unwrap_or_default();
    let console_filter = builder.clone().parse_lossy(&rust_log);
    let file_filter = builder.parse_lossy(&rust_log);

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(&log_dir)
        .with_context(|| format!("Failed to create log appender in {:?}", log_dir))?;
    let (non_blocking, guard) = NonBlocking::new(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_filter(file_filter);
    let console_writer = if console_stderr {
        BoxMakeWriter::new(std::io::stderr)
    } else {
        BoxMakeWriter::new(std::io::stdout)
    };
    let console_layer = fmt::layer()
        .with_writer(console_writer)
        .with_ansi(!console_stderr)
        .with_filter(console_filter);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    if !known_level {
        tracing::warn!("Invalid log level '{}', defaulting to '{}'", level, default_level);
    }

    start_log_cleanup_task(log_dir, prefix.to_string());

    Ok(LoggerGuard(guard))
}

fn start_log_cleanup_task(log_dir: PathBuf, prefix: String) {
    task::spawn(async move {
        loop {
            if let Err(e) = cleanup_old_logs(&log_dir, &prefix, MAX_LOG_AGE) {
                tracing::warn!("Failed to delete old log file: {}", e);
            }
            tokio::time::sleep(CLEANUP_INTERVAL).await;
        }
    });
}

/// Remove `<prefix>*.log` files last modified more than `max_age` ago.
fn cleanup_old_logs(log_dir: &Path, prefix: &str, max_age: Duration) -> std::io::Result<usize> {
    let now = SystemTime::now();
    let mut removed = 0;

    for entry in fs::read_dir(log_dir)? {
        let path = entry?.path();

        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !(file_name.starts_with(prefix) && file_name.ends_with(".log")) {
            continue;
        }

        let modified = fs::metadata(&path)?.modified()?;
        if now.duration_since(modified).unwrap_or_default() > max_age {
            fs::remove_file(&path)?;
            tracing::info!("Old log file deleted: {}", file_name);
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter() {
        assert_eq!(level_filter("debug"), (LevelFilter::DEBUG, true));
        assert_eq!(level_filter("off"), (LevelFilter::OFF, true));
        assert_eq!(level_filter("verbose"), (LevelFilter::INFO, false));
    }

    #[test]
    fn test_cleanup_keeps_recent_and_foreign_files() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join("astrotrack-backend.2025-01-05.log"), "x").unwrap();
        fs::write(dir.path().join("other.log"), "x").unwrap();

        let removed = cleanup_old_logs(dir.path(), "astrotrack-backend", MAX_LOG_AGE).unwrap();
        assert_eq!(removed, 0);

        // Everything is older than a zero max age, but only prefixed logs go
        std::thread::sleep(Duration::from_millis(20));
        let removed = cleanup_old_logs(dir.path(), "astrotrack-backend", Duration::ZERO).unwrap();
        assert_eq!(removed, 1);
        assert!(dir.path().join("other.log").exists());
    }
}
