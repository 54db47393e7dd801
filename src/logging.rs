//! Tracing setup for pixclass binaries.
//!
//! Events go to stderr and to a per-run file under the app `logs` directory.
//! Only the newest `keep_files` run logs are kept. `RUST_LOG` overrides the
//! configured filter.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;

use thiserror::Error;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::app_dirs::{self, AppDirError};
use crate::config::LoggingSettings;

/// Run logs are named `pixclass-<timestamp>.log`.
const RUN_LOG_PREFIX: &str = "pixclass-";
const RUN_LOG_EXTENSION: &str = "log";

const FILE_STAMP: &[BorrowedFormatItem<'static>] =
    format_description!("[year][month][day]T[hour][minute][second]");
const LINE_STAMP: &[BorrowedFormatItem<'static>] =
    format_description!("[hour]:[minute]:[second].[subsecond digits:3]");

/// Keeps the file writer flushing until the process exits.
static FILE_WRITER: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error(transparent)]
    AppDir(#[from] AppDirError),
    #[error("Cannot {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        source: io::Error,
    },
    #[error("Cannot stamp the run log name: {0}")]
    Stamp(#[from] time::error::Format),
    #[error("Invalid log filter {filter:?}: {source}")]
    Filter {
        filter: String,
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("A global tracing subscriber is already installed")]
    AlreadyInstalled,
}

fn io_error(action: &'static str, path: &Path) -> impl FnOnce(io::Error) -> LoggingError {
    let path = path.to_path_buf();
    move |source| LoggingError::Io {
        action,
        path,
        source,
    }
}

/// Start logging into the app `logs` directory; returns this run's log file.
///
/// Calling it again after a successful start returns the same file.
pub fn init(settings: &LoggingSettings) -> Result<PathBuf, LoggingError> {
    init_in(&app_dirs::logs_dir()?, settings)
}

/// Start logging with run logs written to `dir`.
pub fn init_in(dir: &Path, settings: &LoggingSettings) -> Result<PathBuf, LoggingError> {
    static RUN_LOG: OnceLock<PathBuf> = OnceLock::new();
    if let Some(path) = RUN_LOG.get() {
        return Ok(path.clone());
    }

    let filter = filter_for(&settings.filter)?;
    let name = run_log_name(local_now())?;
    let path = dir.join(&name);
    File::create(&path).map_err(io_error("create", &path))?;
    let removed = remove_old_run_logs(dir, settings.keep_files)?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, &name));
    let stamp = OffsetTime::new(
        UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC),
        LINE_STAMP,
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_timer(stamp.clone())
                .with_target(false)
                .with_writer(io::stderr),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_timer(stamp)
                .with_writer(writer),
        )
        .try_init()
        .map_err(|_| LoggingError::AlreadyInstalled)?;
    let _ = FILE_WRITER.set(guard);
    let _ = RUN_LOG.set(path.clone());

    tracing::info!(log = %path.display(), removed, "pixclass logging started");
    Ok(path)
}

/// `RUST_LOG` when set, else the configured directives.
fn filter_for(configured: &str) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(configured).map_err(|source| LoggingError::Filter {
        filter: configured.to_string(),
        source,
    })
}

fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

fn run_log_name(at: OffsetDateTime) -> Result<String, LoggingError> {
    Ok(format!(
        "{RUN_LOG_PREFIX}{}.{RUN_LOG_EXTENSION}",
        at.format(FILE_STAMP)?
    ))
}

fn is_run_log(path: &Path) -> bool {
    let named = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(RUN_LOG_PREFIX));
    named && path.extension().is_some_and(|ext| ext == RUN_LOG_EXTENSION)
}

/// Delete all but the `keep` most recently modified run logs in `dir`.
///
/// Other files in the directory are left alone. Returns how many were removed.
fn remove_old_run_logs(dir: &Path, keep: usize) -> Result<usize, LoggingError> {
    let mut logs: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error("list", dir))? {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if !is_run_log(&path) {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|meta| meta.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        logs.push((modified, path));
    }
    logs.sort_by(|a, b| b.cmp(a));
    let stale = logs.into_iter().skip(keep.max(1));
    let mut removed = 0;
    for (_, path) in stale {
        fs::remove_file(&path).map_err(io_error("remove", &path))?;
        removed += 1;
    }
    Ok(removed)
}
