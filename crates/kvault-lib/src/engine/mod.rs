//! Backup and restore pipelines.
//!
//! Both pipelines run one task per file, gated by a [`WorkerPool`](crate::pool::WorkerPool):
//!
//! ```text
//! backup:   PathSet ──► WorkerPool ──► archive_file ──► Store::put
//! restore:  Store::for_each ──► WorkerPool ──► restore_entry ──► disk
//!           (streaming: scan ──► queue ──► decoder pool ──► queue ──► writer pool)
//! ```
//!
//! A failing file produces a [`FileError`] in its [`FileOutcome`]; it never
//! stops sibling tasks. Every outcome is handed to a [`RunObserver`] as it
//! completes and tallied into the [`RunReport`] returned at the end.
//!
//! ## Modules
//!
//! - [`archive`]: staleness check and compress-and-put for one path
//! - [`restore`]: decompress-and-write for one entry, plain and streaming runs
//! - [`queue`]: bounded hand-off queue between the store scan and the writers

pub mod archive;
pub mod queue;
pub mod restore;

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use log::{info, warn};

use crate::error::FileError;
use crate::store::{Entry, EntryHeader, Store, StoreError};

pub use archive::{archive_file, backup_paths, BackupOptions};
pub use queue::HandoffQueue;
pub use restore::{restore_all, restore_entry, RestoreOptions, DEFAULT_DECODERS};

/// What happened to one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    /// A fresh snapshot was written to the store.
    Updated,
    /// The stored snapshot is recent enough; nothing was written.
    UpToDate,
    /// The entry was written to disk at `to`.
    Restored { to: PathBuf },
}

/// Result of processing one path (backup) or one key (restore).
#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub result: Result<FileStatus, FileError>,
}

/// Receives per-file outcomes as tasks complete.
///
/// Called from worker threads, in completion order.
pub trait RunObserver: Send + Sync {
    fn on_outcome(&self, _outcome: &FileOutcome) {}
}

/// Observer that reports outcomes through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl RunObserver for LogObserver {
    fn on_outcome(&self, outcome: &FileOutcome) {
        match &outcome.result {
            Ok(FileStatus::Updated) => info!("{}: updated", outcome.path.display()),
            Ok(FileStatus::UpToDate) => info!("{}: up to date", outcome.path.display()),
            Ok(FileStatus::Restored { to }) => {
                info!("{} -> {}", outcome.path.display(), to.display())
            }
            Err(e) => warn!("{}", e),
        }
    }
}

/// Totals for one run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub updated: usize,
    pub up_to_date: usize,
    pub restored: usize,
    /// Paths (or keys) whose task failed.
    pub failed: Vec<PathBuf>,
}

impl RunReport {
    pub fn total(&self) -> usize {
        self.updated + self.up_to_date + self.restored + self.failed.len()
    }

    /// True when no file failed.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(&mut self, outcome: &FileOutcome) {
        match &outcome.result {
            Ok(FileStatus::Updated) => self.updated += 1,
            Ok(FileStatus::UpToDate) => self.up_to_date += 1,
            Ok(FileStatus::Restored { .. }) => self.restored += 1,
            Err(_) => self.failed.push(outcome.path.clone()),
        }
    }
}

/// Shared tally that tasks report into.
struct Tally<'a> {
    report: Mutex<RunReport>,
    observer: &'a dyn RunObserver,
}

impl<'a> Tally<'a> {
    fn new(observer: &'a dyn RunObserver) -> Self {
        Self {
            report: Mutex::new(RunReport::default()),
            observer,
        }
    }

    fn report(&self, outcome: FileOutcome) {
        self.observer.on_outcome(&outcome);
        self.report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(&outcome);
    }

    fn finish(self) -> RunReport {
        let mut report = self
            .report
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        report.failed.sort();
        report
    }
}

/// One row of a store listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySummary {
    pub key: String,
    /// `None` when the stored header cannot be decoded.
    pub header: Option<EntryHeader>,
    /// Stored (compressed) size in bytes.
    pub stored_size: usize,
}

/// List every entry in the store, in engine order.
///
/// An absent collection lists nothing.
pub fn list_entries(store: &Store) -> Result<Vec<EntrySummary>, StoreError> {
    let mut entries = Vec::new();
    store.for_each(|key, value| {
        entries.push(EntrySummary {
            key: key.to_string(),
            header: Entry::decode_header(value).ok(),
            stored_size: value.len(),
        });
    })?;
    Ok(entries)
}
