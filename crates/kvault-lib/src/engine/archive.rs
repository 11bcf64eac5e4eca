//! Backup pipeline: per-path staleness check, compress and put.

use std::fs::File;
use std::path::Path;
use std::thread;
use std::time::SystemTime;

use chrono::TimeDelta;
use log::{debug, info};

use crate::error::{FileError, SetupError};
use crate::pool::{WorkerPool, DEFAULT_WORKERS};
use crate::selector::PathSet;
use crate::store::entry::utc_time;
use crate::store::{CompressionLevel, Entry, EntryHeader, Store};

use super::{FileOutcome, FileStatus, RunObserver, RunReport, Tally};

/// Default staleness threshold in seconds.
pub const DEFAULT_MAX_AGE: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupOptions {
    /// Maximum number of files processed at once.
    pub workers: usize,
    pub level: CompressionLevel,
    /// A stored snapshot is replaced only when the file on disk is newer
    /// than it by more than this many seconds.
    pub max_age: u64,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            level: CompressionLevel::default(),
            max_age: DEFAULT_MAX_AGE,
        }
    }
}

/// Decide whether a file modified at `current` needs a fresh snapshot.
///
/// The stored time has whole-second precision, so an edit made within the
/// same second as the stored snapshot may go unnoticed. A time outside the
/// representable range on either side counts as stale.
pub fn is_stale(current: SystemTime, stored: &EntryHeader, max_age: u64) -> bool {
    let (Some(current), Some(stored)) = (utc_time(current), stored.modified_at()) else {
        return true;
    };
    let age = current - stored;
    match i64::try_from(max_age).ok().and_then(TimeDelta::try_seconds) {
        Some(threshold) => age > threshold,
        // Threshold beyond any representable age.
        None => false,
    }
}

/// Back up a single file.
///
/// Reads the stored entry for `path`, and if the file is stale (or was never
/// stored) compresses it and writes the new entry in one transaction.
pub fn archive_file(
    store: &Store,
    path: &Path,
    options: &BackupOptions,
) -> Result<FileStatus, FileError> {
    let key = path.to_str().ok_or_else(|| FileError::InvalidKey {
        key: path.display().to_string(),
    })?;

    let file = File::open(path).map_err(|source| FileError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let modified = file
        .metadata()
        .and_then(|meta| meta.modified())
        .map_err(|source| FileError::Stat {
            path: path.to_path_buf(),
            source,
        })?;
    if utc_time(modified).is_none() {
        return Err(FileError::ModifiedOutOfRange {
            path: path.to_path_buf(),
        });
    }

    let existing = store.get(key).map_err(|source| FileError::Store {
        path: path.to_path_buf(),
        source,
    })?;

    if let Some(stored) = existing {
        let header = Entry::decode_header(&stored).map_err(|source| FileError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        if !is_stale(modified, &header, options.max_age) {
            debug!("{}: stored snapshot at {} is fresh", key, header.modified);
            return Ok(FileStatus::UpToDate);
        }
    }

    let blob = Entry::compress(key, modified, options.level, &file)
        .and_then(|entry| entry.encode())
        .map_err(|source| FileError::Compress {
            path: path.to_path_buf(),
            source,
        })?;

    store.put(key, &blob).map_err(|source| FileError::Store {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(FileStatus::Updated)
}

/// Back up every path in `paths`, at most `options.workers` at a time.
///
/// Per-file failures are reported through `observer` and counted in the
/// returned report; they never stop the run.
pub fn backup_paths(
    store: &Store,
    paths: &PathSet,
    options: &BackupOptions,
    observer: &dyn RunObserver,
) -> Result<RunReport, SetupError> {
    let pool = WorkerPool::new(options.workers)?;
    let tally = Tally::new(observer);

    info!(
        "backing up {} file(s) with {} worker(s), level {}, max age {}s",
        paths.len(),
        pool.capacity(),
        options.level.get(),
        options.max_age
    );

    thread::scope(|s| {
        for path in paths {
            let tally = &tally;
            pool.spawn(s, move || {
                let result = archive_file(store, path, options);
                tally.report(FileOutcome {
                    path: path.clone(),
                    result,
                });
            });
        }
        pool.wait();
    });

    let report = tally.finish();
    info!(
        "backup finished: {} updated, {} up to date, {} failed",
        report.updated,
        report.up_to_date,
        report.failed.len()
    );
    Ok(report)
}
