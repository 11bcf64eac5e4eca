//! Manifest resolution.
//!
//! A manifest is a plain-text list of glob lines, read relative to the
//! manifest's own directory:
//!
//! ```text
//! # comments start with '#'
//! notes/*.md        <- inclusion: matches are added
//! !notes/draft.md   <- exclusion: matches are removed
//! photos            <- directories expand to every file beneath them
//! ```
//!
//! Lines are applied strictly in file order. An exclusion only removes what
//! earlier lines added, and a later inclusion adds the path back.

mod pattern;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;

use pattern::{expand, Pattern};

/// The resolved, de-duplicated set of absolute file paths.
pub type PathSet = BTreeSet<PathBuf>;

const COMMENT_MARKER: char = '#';
const EXCLUDE_MARKER: char = '!';

#[derive(Error, Debug)]
pub enum SelectionError {
    #[error("cannot read manifest {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("line {line}: invalid pattern {pattern:?}: {reason}")]
    InvalidPattern {
        line: usize,
        pattern: String,
        reason: String,
    },

    #[error("line {line}: exclusion marker without a pattern")]
    EmptyPattern { line: usize },

    #[error("cannot stat {}: {source}", .path.display())]
    Stat {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot walk {}: {source}", .path.display())]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },
}

/// One line of a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestLine {
    Blank,
    Comment(String),
    Include(String),
    Exclude(String),
}

impl ManifestLine {
    fn parse(raw: &str, line: usize) -> Result<Self, SelectionError> {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        if raw.trim().is_empty() {
            return Ok(ManifestLine::Blank);
        }
        if let Some(comment) = raw.strip_prefix(COMMENT_MARKER) {
            return Ok(ManifestLine::Comment(comment.to_string()));
        }
        if let Some(pattern) = raw.strip_prefix(EXCLUDE_MARKER) {
            if pattern.trim().is_empty() {
                return Err(SelectionError::EmptyPattern { line });
            }
            return Ok(ManifestLine::Exclude(pattern.to_string()));
        }
        Ok(ManifestLine::Include(raw.to_string()))
    }
}

/// A parsed manifest, ready to be resolved against the filesystem.
#[derive(Debug, Clone)]
pub struct Manifest {
    base_dir: PathBuf,
    lines: Vec<ManifestLine>,
}

impl Manifest {
    /// Read and parse the manifest at `path`.
    ///
    /// The manifest path is canonicalized; its parent directory becomes the
    /// base for every relative pattern.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SelectionError> {
        let path = path.as_ref();
        let read_error = |source| SelectionError::Read {
            path: path.to_path_buf(),
            source,
        };

        let path = std::fs::canonicalize(path).map_err(read_error)?;
        let text = std::fs::read_to_string(&path).map_err(read_error)?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));

        debug!("Manifest::load: {:?} (base {:?})", path, base_dir);
        Self::parse(base_dir, &text)
    }

    /// Parse manifest text whose relative patterns resolve against `base_dir`.
    pub fn parse(base_dir: impl Into<PathBuf>, text: &str) -> Result<Self, SelectionError> {
        let lines = text
            .lines()
            .enumerate()
            .map(|(index, raw)| ManifestLine::parse(raw, index + 1))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            base_dir: base_dir.into(),
            lines,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn lines(&self) -> &[ManifestLine] {
        &self.lines
    }

    /// Apply every line in order and return the resulting path set.
    ///
    /// Matches that are directories are replaced by the files beneath them;
    /// directories are never members of the result.
    pub fn resolve(&self) -> Result<PathSet, SelectionError> {
        let mut selected = PathSet::new();

        for (index, line) in self.lines.iter().enumerate() {
            let (raw, include) = match line {
                ManifestLine::Include(raw) => (raw, true),
                ManifestLine::Exclude(raw) => (raw, false),
                ManifestLine::Blank | ManifestLine::Comment(_) => continue,
            };

            let pattern = Pattern::compile(&self.base_dir, raw, index + 1)?;
            let leaves = expand(pattern.matches())?;
            debug!(
                "line {}: {} {:?} -> {} file(s)",
                index + 1,
                if include { "include" } else { "exclude" },
                raw,
                leaves.len()
            );

            for leaf in leaves {
                if include {
                    selected.insert(leaf);
                } else {
                    selected.remove(&leaf);
                }
            }
        }

        Ok(selected)
    }
}

/// Load the manifest at `path` and resolve it to a path set.
pub fn select(path: impl AsRef<Path>) -> Result<PathSet, SelectionError> {
    Manifest::load(path)?.resolve()
}
