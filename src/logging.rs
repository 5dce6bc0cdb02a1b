//! Tracing setup for the command line driver.
//!
//! Events go to stderr, leaving stdout to command output, and optionally to a
//! per-run file under `.mllab/logs`. Only this crate's own log files are ever
//! pruned.

use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use time::{OffsetDateTime, UtcOffset, format_description::FormatItem, macros::format_description};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

use crate::app_dirs::{self, AppDirError};
use crate::config::LoggingSettings;

const LOG_FILE_PREFIX: &str = "mllab_";
const LOG_FILE_SUFFIX: &str = ".log";

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static INSTALLED: OnceLock<()> = OnceLock::new();

/// Errors that keep logging from starting.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error(transparent)]
    Dir(#[from] AppDirError),
    /// A filesystem step on a log file or directory failed.
    #[error("Failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to format log filename time: {0}")]
    FormatTime(#[from] time::error::Format),
    #[error("Invalid log filter '{filter}': {reason}")]
    Filter { filter: String, reason: String },
    #[error("Failed to install global tracing subscriber: {0}")]
    SetGlobal(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Install the global subscriber once per process.
///
/// `RUST_LOG` wins over the configured filter. Returns the log file path
/// when file output is enabled.
pub fn init(settings: &LoggingSettings) -> Result<Option<PathBuf>, LoggingError> {
    if INSTALLED.get().is_some() {
        return Ok(None);
    }
    let filter = env_filter(&settings.filter)?;
    let stderr_layer = fmt::layer()
        .with_timer(local_timer())
        .with_writer(std::io::stderr);

    if !settings.to_file {
        tracing::subscriber::set_global_default(Registry::default().with(filter).with(stderr_layer))?;
        let _ = INSTALLED.set(());
        return Ok(None);
    }

    let dir = app_dirs::logs_dir()?;
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let file_name = log_file_name(now)?;
    let path = dir.join(&file_name);
    touch(&path)?;
    prune_run_logs(&dir, settings.keep_files)?;

    let (writer, guard) = tracing_appender::non_blocking(rolling::never(&dir, file_name));
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_timer(local_timer())
        .with_writer(writer);
    tracing::subscriber::set_global_default(
        Registry::default()
            .with(filter)
            .with(stderr_layer)
            .with(file_layer),
    )?;
    let _ = FILE_GUARD.set(guard);
    let _ = INSTALLED.set(());
    tracing::debug!(path = %path.display(), "Logging to file");
    Ok(Some(path))
}

fn env_filter(configured: &str) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(configured).map_err(|err| LoggingError::Filter {
        filter: configured.to_string(),
        reason: err.to_string(),
    })
}

fn local_timer() -> fmt::time::OffsetTime<time::format_description::BorrowedFormatItem<'static>> {
    const DISPLAY_FORMAT: &[FormatItem<'static>] =
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]");
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    fmt::time::OffsetTime::new(offset, DISPLAY_FORMAT.into())
}

fn log_file_name(now: OffsetDateTime) -> Result<String, LoggingError> {
    const NAME_FORMAT: &[FormatItem<'_>] =
        format_description!("[year][month][day]-[hour][minute][second]");
    Ok(format!("{LOG_FILE_PREFIX}{}{LOG_FILE_SUFFIX}", now.format(NAME_FORMAT)?))
}

fn touch(path: &Path) -> Result<(), LoggingError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(drop)
        .map_err(|source| LoggingError::Io {
            action: "create log file",
            path: path.to_path_buf(),
            source,
        })
}

/// Delete the oldest run logs so at most `keep` remain.
///
/// Run log names embed a sortable timestamp, so name order is age order.
fn prune_run_logs(dir: &Path, keep: usize) -> Result<(), LoggingError> {
    let entries = std::fs::read_dir(dir).map_err(|source| LoggingError::Io {
        action: "read log directory",
        path: dir.to_path_buf(),
        source,
    })?;
    let mut runs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_run_log(path))
        .collect();
    runs.sort();
    let excess = runs.len().saturating_sub(keep);
    for path in runs.drain(..excess) {
        std::fs::remove_file(&path).map_err(|source| LoggingError::Io {
            action: "remove old log",
            path,
            source,
        })?;
    }
    Ok(())
}

fn is_run_log(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX) && name.ends_with(LOG_FILE_SUFFIX))
}
