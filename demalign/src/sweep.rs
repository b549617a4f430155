//! Stale-artifact sweeper.
//!
//! Deletes regular files with a given extension (case-insensitive) whose
//! last-modified time is older than a threshold. Each deletion is
//! independent: a failure is logged and recorded, and the sweep goes on.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use thiserror::Error;
use tracing::{debug, info, warn};

/// Default age threshold: 24 hours.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Default extension of swept files.
pub const DEFAULT_EXTENSION: &str = "tif";

/// Errors that stop a sweep before any file is considered.
#[derive(Error, Debug)]
pub enum SweepError {
    #[error("cannot read directory {dir}: {source}")]
    ReadDir {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What to sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepConfig {
    /// Directory to scan (not recursive).
    pub dir: PathBuf,
    /// File extension to match, with or without the leading dot.
    pub extension: String,
    /// Files modified longer ago than this are deleted.
    pub max_age: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            extension: DEFAULT_EXTENSION.to_string(),
            max_age: DEFAULT_MAX_AGE,
        }
    }
}

impl SweepConfig {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    fn matches(&self, path: &Path) -> bool {
        let wanted = self.extension.trim_start_matches('.');
        path.extension()
            .and_then(OsStr::to_str)
            .is_some_and(|ext| ext.eq_ignore_ascii_case(wanted))
    }
}

/// A file that could not be inspected or deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Result of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Files that were deleted.
    pub deleted: Vec<PathBuf>,
    /// Files that matched but could not be handled.
    pub failed: Vec<SweepFailure>,
}

impl SweepReport {
    /// Number of deleted files.
    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }
}

/// Sweep `config.dir` using the current time.
pub fn sweep(config: &SweepConfig) -> Result<SweepReport, SweepError> {
    sweep_at(config, SystemTime::now())
}

/// Sweep `config.dir` as if the current time were `now`.
pub fn sweep_at(config: &SweepConfig, now: SystemTime) -> Result<SweepReport, SweepError> {
    let entries = fs::read_dir(&config.dir).map_err(|source| SweepError::ReadDir {
        dir: config.dir.clone(),
        source,
    })?;
    // A threshold reaching before the epoch means nothing is old enough.
    let cutoff = now.checked_sub(config.max_age).unwrap_or(SystemTime::UNIX_EPOCH);

    let mut report = SweepReport::default();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(dir = %config.dir.display(), error = %e, "skipping unreadable entry");
                report.failed.push(SweepFailure {
                    path: config.dir.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let path = entry.path();
        if !config.matches(&path) {
            continue;
        }

        let modified = match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => meta.modified(),
            Ok(_) => continue,
            Err(e) => Err(e),
        };
        let modified = match modified {
            Ok(time) => time,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read modification time");
                report.failed.push(SweepFailure {
                    path,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        if modified >= cutoff {
            debug!(path = %path.display(), "keeping recent file");
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                info!(path = %path.display(), "deleted stale file");
                report.deleted.push(path);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to delete stale file");
                report.failed.push(SweepFailure {
                    path,
                    reason: e.to_string(),
                });
            }
        }
    }

    report.deleted.sort();
    Ok(report)
}
