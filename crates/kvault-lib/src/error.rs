//! Error taxonomy shared by the backup and restore pipelines.
//!
//! Two kinds live here:
//! - [`SetupError`] is fatal and aborts a run before any file task is dispatched.
//! - [`FileError`] is scoped to a single path. It is reported and absorbed;
//!   sibling tasks keep running.
//!
//! Manifest resolution failures are [`crate::SelectionError`] and engine
//! failures are [`crate::StoreError`]; both live next to the code that raises them.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::ConfigError;
use crate::store::{CodecError, StoreError};

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("worker count must be at least 1 (got {0})")]
    InvalidWorkers(usize),

    #[error("invalid compression level {0} (expected 0..=9)")]
    InvalidCompression(u32),

    #[error("no store path given: pass --db or set store.path in the config file")]
    MissingStorePath,

    #[error("manifest not found: {}", .0.display())]
    ManifestNotFound(PathBuf),

    #[error("store not found: {}", .0.display())]
    StoreNotFound(PathBuf),

    #[error("cannot read output directory {}: {source}", .path.display())]
    OutputDir { path: PathBuf, source: io::Error },

    #[error("output path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Error, Debug)]
pub enum FileError {
    #[error("{}: cannot open: {source}", .path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("{}: cannot stat: {source}", .path.display())]
    Stat { path: PathBuf, source: io::Error },

    #[error("{}: modification time is outside the supported range", .path.display())]
    ModifiedOutOfRange { path: PathBuf },

    #[error("{}: cannot compress contents: {source}", .path.display())]
    Compress { path: PathBuf, source: CodecError },

    #[error("{}: stored entry is unreadable: {source}", .path.display())]
    Decode { path: PathBuf, source: CodecError },

    #[error("{}: store transaction failed: {source}", .path.display())]
    Store { path: PathBuf, source: StoreError },

    #[error("{key}: key cannot be mapped to a path under the output directory")]
    InvalidKey { key: String },

    #[error("{}: cannot create parent directories: {source}", .path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("{}: cannot write file: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("{}: cannot decompress entry: {source}", .path.display())]
    Decompress { path: PathBuf, source: CodecError },
}

impl FileError {
    /// The path (or store key) the failure is scoped to.
    pub fn path(&self) -> &Path {
        match self {
            FileError::Open { path, .. }
            | FileError::Stat { path, .. }
            | FileError::ModifiedOutOfRange { path }
            | FileError::Compress { path, .. }
            | FileError::Decode { path, .. }
            | FileError::Store { path, .. }
            | FileError::CreateDir { path, .. }
            | FileError::Write { path, .. }
            | FileError::Decompress { path, .. } => path,
            FileError::InvalidKey { key } => Path::new(key),
        }
    }
}
