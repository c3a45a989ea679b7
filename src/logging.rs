//! Per-run logging for the download and training programs.
//!
//! Each run gets its own `credit-scoring_<local timestamp>.log` in the app
//! `logs/` folder and mirrors every event to stderr, leaving stdout to the
//! program's single confirmation line. Only the newest run logs are kept.

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::OnceLock,
};

use time::{OffsetDateTime, UtcOffset, format_description::FormatItem, macros::format_description};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

use crate::app_dirs::{self, AppDirError};

/// Run logs kept in the logs folder, including the current one.
const KEPT_RUN_LOGS: usize = 10;
const RUN_LOG_PREFIX: &str = "credit-scoring_";
const RUN_LOG_EXTENSION: &str = ".log";
const DEFAULT_FILTER: &str = "info";

/// Keeps the non-blocking file writer flushing until the process exits.
static FILE_WRITER_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Errors that keep file logging from starting.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error(transparent)]
    AppDir(#[from] AppDirError),
    #[error("Failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to format run log timestamp: {0}")]
    FormatTime(#[from] time::error::Format),
    #[error("Failed to install global tracing subscriber: {0}")]
    SetGlobal(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Install the stderr and run-log subscriber and return this run's log path.
///
/// Filtering comes from `RUST_LOG`, defaulting to `info`.
/// A second call in the same process returns the path without reinstalling.
pub fn init() -> Result<PathBuf, LoggingError> {
    static RUN_LOG_PATH: OnceLock<PathBuf> = OnceLock::new();
    if let Some(path) = RUN_LOG_PATH.get() {
        return Ok(path.clone());
    }

    let log_dir = app_dirs::logs_dir()?;
    let file_name = run_log_file_name(now_local_or_utc())?;
    let log_path = log_dir.join(&file_name);
    create_run_log(&log_path)?;
    prune_run_logs(&log_dir, KEPT_RUN_LOGS)?;

    let (file_writer, guard) = tracing_appender::non_blocking(rolling::never(&log_dir, file_name));
    let timer = local_timer();
    let subscriber = Registry::default()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        )
        .with(
            fmt::layer()
                .with_timer(timer.clone())
                .with_writer(std::io::stderr),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_timer(timer)
                .with_writer(file_writer),
        );
    tracing::subscriber::set_global_default(subscriber)?;
    let _ = FILE_WRITER_GUARD.set(guard);
    let _ = RUN_LOG_PATH.set(log_path.clone());

    tracing::debug!("Run log at {}", log_path.display());
    Ok(log_path)
}

fn create_run_log(path: &Path) -> Result<(), LoggingError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(|_| ())
        .map_err(|source| LoggingError::Io {
            action: "create run log",
            path: path.to_path_buf(),
            source,
        })
}

/// Delete the oldest run logs so at most `keep` remain.
///
/// Run log names embed a zero-padded timestamp, so name order is run order.
/// Files not named like a run log are left alone.
fn prune_run_logs(dir: &Path, keep: usize) -> Result<(), LoggingError> {
    let io_err = |action, path: &Path| {
        let path = path.to_path_buf();
        move |source| LoggingError::Io {
            action,
            path,
            source,
        }
    };
    let mut run_logs: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(io_err("read logs folder", dir))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_file()))
        .filter(|entry| is_run_log_name(&entry.file_name().to_string_lossy()))
        .map(|entry| entry.path())
        .collect();
    run_logs.sort();
    let excess = run_logs.len().saturating_sub(keep);
    for path in &run_logs[..excess] {
        fs::remove_file(path).map_err(io_err("remove old run log", path))?;
    }
    Ok(())
}

fn is_run_log_name(name: &str) -> bool {
    name.starts_with(RUN_LOG_PREFIX) && name.ends_with(RUN_LOG_EXTENSION)
}

fn run_log_file_name(started: OffsetDateTime) -> Result<String, LoggingError> {
    const NAME_FORMAT: &[FormatItem<'_>] =
        format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]");
    let stamp = started.format(NAME_FORMAT)?;
    Ok(format!("{RUN_LOG_PREFIX}{stamp}{RUN_LOG_EXTENSION}"))
}

fn local_timer() -> fmt::time::OffsetTime<time::format_description::BorrowedFormatItem<'static>> {
    const EVENT_FORMAT: &[FormatItem<'static>] =
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    fmt::time::OffsetTime::new(offset, EVENT_FORMAT.into())
}

fn now_local_or_utc() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}
