//! Optional TOML configuration.
//!
//! ```toml
//! [store]
//! path = "~/backups/files.redb"
//! collection = "files"
//!
//! [backup]
//! manifest = "~/.backup"
//! workers = 20
//! compression = 9
//! max_age = 1
//!
//! [restore]
//! workers = 20
//! streaming = false
//! decoders = 4
//! queue_capacity = 64
//! ```
//!
//! Every key is optional. Command-line flags override whatever is loaded here.

use std::path::{Path, PathBuf};

use log::debug;
use serde::Deserialize;
use thiserror::Error;

use crate::engine::archive::DEFAULT_MAX_AGE;
use crate::engine::queue::DEFAULT_CAPACITY;
use crate::engine::{BackupOptions, RestoreOptions, DEFAULT_DECODERS};
use crate::error::SetupError;
use crate::pool::DEFAULT_WORKERS;
use crate::store::{CompressionLevel, DEFAULT_COLLECTION};

/// Manifest location used when neither the config nor the command line names one.
pub const DEFAULT_MANIFEST: &str = "~/.backup";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("TOML parse error in {}: {source}", .path.display())]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub store: StoreSection,
    pub backup: BackupSection,
    pub restore: RestoreSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSection {
    /// Store file; there is no default location.
    pub path: Option<PathBuf>,
    pub collection: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackupSection {
    pub manifest: PathBuf,
    pub workers: usize,
    pub compression: u32,
    pub max_age: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RestoreSection {
    pub workers: usize,
    pub streaming: bool,
    /// Concurrent decompressions in streaming mode.
    pub decoders: usize,
    pub queue_capacity: usize,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: None,
            collection: DEFAULT_COLLECTION.to_string(),
        }
    }
}

impl Default for BackupSection {
    fn default() -> Self {
        Self {
            manifest: PathBuf::from(DEFAULT_MANIFEST),
            workers: DEFAULT_WORKERS,
            compression: u32::from(CompressionLevel::default().get()),
            max_age: DEFAULT_MAX_AGE,
        }
    }
}

impl Default for RestoreSection {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            streaming: false,
            decoders: DEFAULT_DECODERS,
            queue_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl Config {
    /// Load a config file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&content).map_err(|source| ConfigError::TomlParse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Config::load: {:?}", path);
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// `<config_dir>/kvault/config.toml`, if the platform has a config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("kvault").join("config.toml"))
    }

    /// Load the default config file if it exists, otherwise use defaults.
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// Store path with `~` expanded, if one is configured.
    pub fn store_path(&self) -> Option<PathBuf> {
        self.store.path.as_deref().map(expand_home)
    }

    /// Manifest path with `~` expanded.
    pub fn manifest_path(&self) -> PathBuf {
        expand_home(&self.backup.manifest)
    }

    /// Validated backup options.
    pub fn backup_options(&self) -> Result<BackupOptions, SetupError> {
        if self.backup.workers == 0 {
            return Err(SetupError::InvalidWorkers(0));
        }
        Ok(BackupOptions {
            workers: self.backup.workers,
            level: CompressionLevel::try_from(self.backup.compression)?,
            max_age: self.backup.max_age,
        })
    }

    /// Validated restore options.
    pub fn restore_options(&self) -> Result<RestoreOptions, SetupError> {
        if self.restore.workers == 0 || self.restore.decoders == 0 {
            return Err(SetupError::InvalidWorkers(0));
        }
        Ok(RestoreOptions {
            workers: self.restore.workers,
            streaming: self.restore.streaming,
            decoders: self.restore.decoders,
            queue_capacity: self.restore.queue_capacity,
        })
    }
}

/// Expand a leading `~` to the home directory.
///
/// Paths without a leading `~`, and every path when no home directory is
/// known, are returned unchanged. `~user` forms are not supported.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) if rest.as_os_str().is_empty() => home,
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}
