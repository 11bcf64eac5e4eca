pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod pool;
pub mod selector;
pub mod store;

pub use config::{Config, ConfigError};
pub use engine::{
    archive_file, backup_paths, list_entries, restore_all, restore_entry, BackupOptions,
    EntrySummary, FileOutcome, FileStatus, HandoffQueue, LogObserver, RestoreOptions,
    RunObserver, RunReport,
};
pub use error::{FileError, SetupError};
pub use pool::{WorkSlot, WorkerPool};
pub use selector::{select, Manifest, PathSet, SelectionError};
pub use store::{CompressionLevel, Entry, EntryHeader, Store, StoreError};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
