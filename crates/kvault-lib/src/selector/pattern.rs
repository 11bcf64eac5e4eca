//! Filesystem glob matching and directory expansion for manifest lines.
//!
//! A pattern is split on `/` into a literal root (the leading segments
//! without wildcards) and the remaining glob segments. Only the root is
//! walked, and only as deep as the number of glob segments, so `*` never
//! crosses a separator:
//!
//! ```text
//! /home/me/docs/*/draft-?.txt
//! └──── root ───┘└─ 2 segments ─┘   -> walk /home/me/docs to depth 2
//! ```
//!
//! Supported syntax is shell-style: `*`, `?`, `[abc]`, `[a-z]`, `[!abc]`.
//! Braces are literal.

use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use log::debug;
use walkdir::WalkDir;

use super::SelectionError;

/// Characters that turn a path segment into a glob segment.
const WILDCARDS: &[char] = &['*', '?', '['];

/// Escape glob metacharacters so `s` matches literally.
pub(crate) fn escape_glob(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '*' | '?' | '[' | ']' | '{' | '}' | '\\' => {
                escaped.push('\\');
                escaped.push(ch);
            }
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// A manifest pattern compiled against a base directory.
#[derive(Debug)]
pub(crate) enum Pattern {
    /// No wildcards: matches the path itself if it exists.
    Literal(PathBuf),
    /// Walk `root` to `depth` and keep entries accepted by `matcher`.
    Glob {
        root: PathBuf,
        depth: usize,
        matcher: GlobMatcher,
    },
}

impl Pattern {
    /// Compile `raw` relative to `base`. Absolute patterns ignore `base`.
    pub(crate) fn compile(base: &Path, raw: &str, line: usize) -> Result<Self, SelectionError> {
        let invalid = |reason: String| SelectionError::InvalidPattern {
            line,
            pattern: raw.to_string(),
            reason,
        };

        let mut root = if raw.starts_with('/') {
            PathBuf::from("/")
        } else {
            base.to_path_buf()
        };

        let segments: Vec<&str> = raw
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .collect();

        let first_glob = segments.iter().position(|s| s.contains(WILDCARDS));
        let (literal, globbed) = match first_glob {
            Some(i) => segments.split_at(i),
            None => (&segments[..], &[][..]),
        };

        for segment in literal {
            if *segment == ".." {
                root.pop();
            } else {
                root.push(segment);
            }
        }

        if globbed.is_empty() {
            return Ok(Pattern::Literal(root));
        }
        if globbed.contains(&"..") {
            return Err(invalid("'..' after a wildcard segment".to_string()));
        }

        let root_str = root
            .to_str()
            .ok_or_else(|| invalid("base directory is not valid UTF-8".to_string()))?;
        let mut glob = escape_glob(root_str.trim_end_matches('/'));
        for segment in globbed {
            glob.push('/');
            // Braces are literal in shell-style globs.
            glob.push_str(&segment.replace('{', "\\{").replace('}', "\\}"));
        }

        let matcher = GlobBuilder::new(&glob)
            .literal_separator(true)
            .backslash_escape(true)
            .build()
            .map_err(|e| invalid(e.kind().to_string()))?
            .compile_matcher();

        Ok(Pattern::Glob {
            root,
            depth: globbed.len(),
            matcher,
        })
    }

    /// Paths on disk matching this pattern, sorted, before directory expansion.
    pub(crate) fn matches(&self) -> Vec<PathBuf> {
        match self {
            Pattern::Literal(path) => {
                if path.symlink_metadata().is_ok() {
                    vec![path.clone()]
                } else {
                    Vec::new()
                }
            }
            Pattern::Glob {
                root,
                depth,
                matcher,
            } => {
                if !root.is_dir() {
                    return Vec::new();
                }
                WalkDir::new(root)
                    .follow_links(true)
                    .min_depth(*depth)
                    .max_depth(*depth)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(|entry| match entry {
                        Ok(entry) => Some(entry),
                        Err(e) => {
                            // Unreadable directories simply do not match.
                            debug!("skipping while matching {:?}: {}", root, e);
                            None
                        }
                    })
                    .filter(|entry| matcher.is_match(entry.path()))
                    .map(|entry| entry.into_path())
                    .collect()
            }
        }
    }
}

/// Replace every directory in `matches` with the non-directory leaves beneath it.
pub(crate) fn expand(matches: Vec<PathBuf>) -> Result<Vec<PathBuf>, SelectionError> {
    let mut leaves = Vec::new();
    for path in matches {
        let meta = std::fs::metadata(&path).map_err(|source| SelectionError::Stat {
            path: path.clone(),
            source,
        })?;
        if !meta.is_dir() {
            leaves.push(path);
            continue;
        }

        for entry in WalkDir::new(&path).sort_by_file_name() {
            let entry = entry.map_err(|source| SelectionError::Walk {
                path: path.clone(),
                source,
            })?;
            if !entry.path().is_dir() {
                leaves.push(entry.into_path());
            }
        }
    }
    Ok(leaves)
}
