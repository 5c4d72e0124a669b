use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing_appender::rolling;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "ots.log";
const LOG_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// How the process should log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// Filter used when neither `OTS_LOG` nor `RUST_LOG` is set.
    pub level: String,
    /// Write a daily-rolling log file in addition to stderr.
    pub file: bool,
    /// Directory for log files; [`log_dir`] when unset.
    pub dir: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: false,
            dir: None,
        }
    }
}

/// Where log files go when [`LogSettings::dir`] is unset: `OTS_LOG_DIR`,
/// else `ots/logs` under the platform's local data directory.
pub fn log_dir() -> PathBuf {
    std::env::var_os("OTS_LOG_DIR")
        .map(PathBuf::from)
        .or_else(|| dirs::data_local_dir().map(|d| d.join("ots").join("logs")))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

/// Delete rolled log files in `dir` last written more than `keep` before
/// `now`. Returns how many were removed.
fn prune_logs(dir: &Path, keep: Duration, now: SystemTime) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().starts_with(LOG_FILE_PREFIX))
        .filter(|e| {
            e.metadata()
                .and_then(|m| m.modified())
                .is_ok_and(|written| now.duration_since(written).is_ok_and(|age| age > keep))
        })
        .filter(|e| fs::remove_file(e.path()).is_ok())
        .count()
}

/// Build the filter: `OTS_LOG`, then `RUST_LOG`, then `default`.
pub fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_env("OTS_LOG")
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(default))
}

/// Initialize the logging subsystem.
///
/// Human-readable output goes to stderr; stdout carries the wire protocol.
/// With file logging enabled (or `OTS_LOG_DIR` set) a daily-rotated file is
/// written too, keeping a week of history.
pub fn init(settings: &LogSettings) {
    let filter = env_filter(&settings.level);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let want_file = settings.file || std::env::var_os("OTS_LOG_DIR").is_some();
    let mut pruned = 0;
    let file_layer = if want_file {
        let log_path = settings.dir.clone().unwrap_or_else(log_dir);
        if let Err(e) = fs::create_dir_all(&log_path) {
            eprintln!("warning: cannot create log directory {}: {e}", log_path.display());
        }
        pruned = prune_logs(&log_path, LOG_RETENTION, SystemTime::now());

        let file_appender = rolling::daily(&log_path, LOG_FILE_PREFIX);
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    if pruned > 0 {
        tracing::debug!(pruned, "removed expired log files");
    }
}
