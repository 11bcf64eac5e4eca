//! Durable key -> entry mapping backed by redb.
//!
//! Every record lives in one named table (the "collection"). Each public
//! operation runs inside its own transaction; there is no multi-key batch.
//! Write serialization and crash consistency are redb's job, this wrapper
//! never takes a lock of its own.
//!
//! ## Modules
//!
//! - [`entry`]: the record format stored as each value (metadata header + compressed body)

pub mod entry;

use std::path::{Path, PathBuf};

use log::debug;
use redb::{Database, ReadableTable, TableDefinition, TableError};
use thiserror::Error;

pub use entry::{CodecError, CompressionLevel, Entry, EntryHeader};

/// Collection name used when none is configured.
pub const DEFAULT_COLLECTION: &str = "files";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to open store {}: {message}", .path.display())]
    Open { path: PathBuf, message: String },

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("commit failed: {0}")]
    Commit(String),
}

/// Handle on the embedded database plus the name of the collection in use.
///
/// `Store` is `Send + Sync`; archive and restore tasks share one instance by
/// reference and each call opens a fresh transaction.
pub struct Store {
    db: Database,
    path: Option<PathBuf>,
    collection: String,
}

impl Store {
    /// Open the database at `path`, creating the file if it does not exist.
    pub fn open(path: impl AsRef<Path>, collection: &str) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let db = Database::create(path).map_err(|e| StoreError::Open {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        debug!("Store::open: {:?} (collection {:?})", path, collection);

        Ok(Self {
            db,
            path: Some(path.to_path_buf()),
            collection: collection.to_string(),
        })
    }

    /// Open an existing database. Fails if the file is missing.
    pub fn open_existing(path: impl AsRef<Path>, collection: &str) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let db = Database::open(path).map_err(|e| StoreError::Open {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        debug!("Store::open_existing: {:?} (collection {:?})", path, collection);

        Ok(Self {
            db,
            path: Some(path.to_path_buf()),
            collection: collection.to_string(),
        })
    }

    /// Create an in-memory store for testing.
    pub fn in_memory(collection: &str) -> Result<Self, StoreError> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .map_err(|e| StoreError::Open {
                path: PathBuf::from(":memory:"),
                message: e.to_string(),
            })?;

        Ok(Self {
            db,
            path: None,
            collection: collection.to_string(),
        })
    }

    /// Path of the database file (`None` for in-memory stores).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Name of the collection this handle reads and writes.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn table(&self) -> TableDefinition<'_, &'static str, &'static [u8]> {
        TableDefinition::new(&self.collection)
    }

    /// Create the collection if it does not exist yet. Idempotent.
    pub fn ensure_collection(&self) -> Result<(), StoreError> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        txn.open_table(self.table())
            .map_err(|e| StoreError::Table(e.to_string()))?;
        txn.commit().map_err(|e| StoreError::Commit(e.to_string()))?;
        Ok(())
    }

    /// Read the value stored under `key` in a single read transaction.
    ///
    /// An absent collection reads as "not found".
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        let table = match txn.open_table(self.table()) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(StoreError::Table(e.to_string())),
        };
        let value = table
            .get(key)
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(value.map(|guard| guard.value().to_vec()))
    }

    /// Write `value` under `key` in a single write transaction, replacing any
    /// prior value.
    pub fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        {
            let mut table = txn
                .open_table(self.table())
                .map_err(|e| StoreError::Table(e.to_string()))?;
            table
                .insert(key, value)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Commit(e.to_string()))?;
        debug!("Store::put: {} ({} bytes)", key, value.len());
        Ok(())
    }

    /// Visit every entry inside one read transaction, in engine order.
    ///
    /// An absent collection visits nothing. Returns the number of entries visited.
    pub fn for_each<F>(&self, mut visit: F) -> Result<usize, StoreError>
    where
        F: FnMut(&str, &[u8]),
    {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        let table = match txn.open_table(self.table()) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => {
                debug!("Store::for_each: collection {:?} absent", self.collection);
                return Ok(0);
            }
            Err(e) => return Err(StoreError::Table(e.to_string())),
        };

        let mut visited = 0;
        for item in table.iter().map_err(|e| StoreError::Storage(e.to_string()))? {
            let (key, value) = item.map_err(|e| StoreError::Storage(e.to_string()))?;
            visit(key.value(), value.value());
            visited += 1;
        }
        Ok(visited)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("collection", &self.collection)
            .finish()
    }
}
