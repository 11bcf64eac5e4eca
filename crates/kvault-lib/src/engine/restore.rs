//! Restore pipeline: write every stored entry back to disk under an output
//! directory.
//!
//! Two shapes, same result:
//!
//! ```text
//! plain:      Store::for_each ──► writers (decompress + write)
//! streaming:  scanner ──► [queue] ──► decoders ──► [queue] ──► writers
//! ```
//!
//! In streaming mode decompression and disk writes run in separate pools,
//! each with its own bound, and the bounded queues between the stages hold
//! at most `queue_capacity` entries each. Decoded bodies are buffered in
//! memory between the two pools.
//!
//! A file is written to a temporary sibling and renamed over the target
//! only once its contents are complete, so a failed restore never clobbers
//! an existing file.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::thread;

use log::{debug, info};
use tempfile::NamedTempFile;

use crate::error::{FileError, SetupError};
use crate::pool::{WorkerPool, DEFAULT_WORKERS};
use crate::store::{CodecError, Entry, EntryHeader, Store, StoreError};

use super::queue::{HandoffQueue, DEFAULT_CAPACITY};
use super::{FileOutcome, FileStatus, RunObserver, RunReport, Tally};

/// Default number of concurrent decompressions in streaming mode.
pub const DEFAULT_DECODERS: usize = 4;

const TEMP_PREFIX: &str = ".kvault-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOptions {
    /// Maximum number of files written at once.
    pub workers: usize,
    /// Split decompression and writing into separately bounded stages.
    pub streaming: bool,
    /// Maximum number of entries decompressed at once in streaming mode.
    pub decoders: usize,
    /// Entries buffered between stages in streaming mode.
    pub queue_capacity: usize,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            streaming: false,
            decoders: DEFAULT_DECODERS,
            queue_capacity: DEFAULT_CAPACITY,
        }
    }
}

/// A decompressed entry waiting to be written.
struct Decoded {
    key: String,
    header: EntryHeader,
    contents: Vec<u8>,
}

/// Map a store key to a path relative to the output directory.
///
/// Root and drive prefixes are dropped. Keys with `..` components, or with
/// nothing left after stripping, are rejected.
fn relative_target(key: &str) -> Option<PathBuf> {
    let mut relative = PathBuf::new();
    for component in Path::new(key).components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
            Component::ParentDir => return None,
            Component::Normal(part) => relative.push(part),
        }
    }
    if relative.as_os_str().is_empty() {
        None
    } else {
        Some(relative)
    }
}

fn target_for(out_dir: &Path, key: &str) -> Result<PathBuf, FileError> {
    relative_target(key)
        .map(|relative| out_dir.join(relative))
        .ok_or_else(|| FileError::InvalidKey {
            key: key.to_string(),
        })
}

/// Check the output directory once before any entry is written.
fn check_output_dir(out_dir: &Path) -> Result<(), SetupError> {
    let meta = std::fs::metadata(out_dir).map_err(|source| SetupError::OutputDir {
        path: out_dir.to_path_buf(),
        source,
    })?;
    if !meta.is_dir() {
        return Err(SetupError::NotADirectory(out_dir.to_path_buf()));
    }
    Ok(())
}

fn temp_file_in(dir: &Path) -> std::io::Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(TEMP_PREFIX);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // Same mode File::create would use; the umask still applies.
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }
    builder.tempfile_in(dir)
}

/// Write `target` through a temporary sibling that replaces it only after
/// `fill` succeeded and the data is flushed.
fn write_replacing<F>(target: &Path, header: &EntryHeader, fill: F) -> Result<(), FileError>
where
    F: FnOnce(&mut BufWriter<&mut File>) -> Result<(), FileError>,
{
    let write_error = |source| FileError::Write {
        path: target.to_path_buf(),
        source,
    };

    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|source| FileError::CreateDir {
        path: parent.to_path_buf(),
        source,
    })?;

    let mut temp = temp_file_in(parent).map_err(write_error)?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        fill(&mut writer)?;
        writer.flush().map_err(write_error)?;
    }
    if let Some(modified) = header.modified_time() {
        temp.as_file().set_modified(modified).map_err(write_error)?;
    }
    temp.persist(target).map_err(|e| write_error(e.error))?;
    Ok(())
}

/// Map an unpack failure: output-side I/O is a write error, the rest is a
/// corrupt entry.
fn unpack_error(key: &str, target: &Path, error: CodecError) -> FileError {
    match error {
        CodecError::Write(source) => FileError::Write {
            path: target.to_path_buf(),
            source,
        },
        source => FileError::Decompress {
            path: PathBuf::from(key),
            source,
        },
    }
}

/// Decompress one stored value and write it to `out_dir/<key>`.
///
/// Parent directories are created as needed and the file's modification time
/// is set to the one recorded in the entry. An existing file at the target is
/// replaced only if the whole entry was restored.
pub fn restore_entry(out_dir: &Path, key: &str, value: &[u8]) -> Result<FileStatus, FileError> {
    let target = target_for(out_dir, key)?;
    let header = Entry::decode_header(value).map_err(|source| FileError::Decompress {
        path: PathBuf::from(key),
        source,
    })?;

    write_replacing(&target, &header, |writer| {
        Entry::unpack(value, writer)
            .map(|_| ())
            .map_err(|e| unpack_error(key, &target, e))
    })?;

    debug!("{} -> {:?} ({} bytes)", key, target, header.size);
    Ok(FileStatus::Restored { to: target })
}

/// Decompression stage of a streaming restore.
fn decode_entry(key: String, value: &[u8]) -> Result<Decoded, FileError> {
    let decompress_error = |source| FileError::Decompress {
        path: PathBuf::from(&key),
        source,
    };
    let header = Entry::decode_header(value).map_err(decompress_error)?;
    // The header size is untrusted until the body has been checked against it.
    let mut contents = Vec::with_capacity(usize::try_from(header.size).unwrap_or(0).min(1 << 20));
    Entry::unpack(value, &mut contents).map_err(decompress_error)?;
    Ok(Decoded {
        key,
        header,
        contents,
    })
}

/// Write stage of a streaming restore.
fn write_decoded(out_dir: &Path, decoded: &Decoded) -> Result<FileStatus, FileError> {
    let target = target_for(out_dir, &decoded.key)?;
    write_replacing(&target, &decoded.header, |writer| {
        writer
            .write_all(&decoded.contents)
            .map_err(|source| FileError::Write {
                path: target.clone(),
                source,
            })
    })?;
    debug!("{} -> {:?} ({} bytes)", decoded.key, target, decoded.header.size);
    Ok(FileStatus::Restored { to: target })
}

/// Run a three-stage pipeline over every stored entry:
/// scan ──► `decode` (at most `decoders.capacity()` at once) ──► `write`
/// (at most `writers.capacity()` at once).
///
/// `decode` returning `None` drops the entry. Returns the number of entries
/// scanned.
fn run_streaming<T, D, W>(
    store: &Store,
    queue_capacity: usize,
    decoders: &WorkerPool,
    writers: &WorkerPool,
    decode: &D,
    write: &W,
) -> Result<usize, StoreError>
where
    T: Send,
    D: Fn(String, Vec<u8>) -> Option<T> + Sync,
    W: Fn(T) + Sync,
{
    let scanned = HandoffQueue::with_capacity(queue_capacity);
    let decoded = HandoffQueue::with_capacity(queue_capacity);

    thread::scope(|s| {
        let scanned = &scanned;
        let decoded = &decoded;

        let scanner = s.spawn(move || {
            let _close = scanned.close_on_drop();
            store.for_each(|key, value| {
                // Only closed after the scan, so push cannot be refused here.
                let _ = scanned.push((key.to_string(), value.to_vec()));
            })
        });

        s.spawn(move || {
            let _close = decoded.close_on_drop();
            while let Some((key, value)) = scanned.pop() {
                decoders.spawn(s, move || {
                    if let Some(item) = decode(key, value) {
                        let _ = decoded.push(item);
                    }
                });
            }
            decoders.wait();
        });

        while let Some(item) = decoded.pop() {
            writers.spawn(s, move || write(item));
        }
        writers.wait();

        match scanner.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    })
}

/// Restore every entry in the store into `out_dir`.
///
/// An absent collection restores nothing. Per-file failures are reported
/// and counted; only setup and store-scan failures abort.
pub fn restore_all(
    store: &Store,
    out_dir: &Path,
    options: &RestoreOptions,
    observer: &dyn RunObserver,
) -> Result<RunReport, SetupError> {
    check_output_dir(out_dir)?;
    let writers = WorkerPool::new(options.workers)?;
    let tally = Tally::new(observer);

    let scanned = if options.streaming {
        let decoders = WorkerPool::new(options.decoders)?;
        info!(
            "restoring collection {:?} into {:?}: {} decoder(s), {} writer(s), queue {}",
            store.collection(),
            out_dir,
            decoders.capacity(),
            writers.capacity(),
            options.queue_capacity
        );

        let decode = |key: String, value: Vec<u8>| match decode_entry(key.clone(), &value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                tally.report(FileOutcome {
                    path: PathBuf::from(key),
                    result: Err(e),
                });
                None
            }
        };
        let write = |decoded: Decoded| {
            let result = write_decoded(out_dir, &decoded);
            tally.report(FileOutcome {
                path: PathBuf::from(decoded.key),
                result,
            });
        };
        run_streaming(
            store,
            options.queue_capacity,
            &decoders,
            &writers,
            &decode,
            &write,
        )?
    } else {
        info!(
            "restoring collection {:?} into {:?} with {} worker(s)",
            store.collection(),
            out_dir,
            writers.capacity()
        );

        thread::scope(|s| {
            let tally = &tally;
            let writers = &writers;
            let scanned = store.for_each(|key, value| {
                let key = key.to_string();
                let value = value.to_vec();
                writers.spawn(s, move || {
                    let result = restore_entry(out_dir, &key, &value);
                    tally.report(FileOutcome {
                        path: PathBuf::from(key),
                        result,
                    });
                });
            });
            writers.wait();
            scanned
        })?
    };

    let report = tally.finish();
    info!(
        "restore finished: {} of {} entries written, {} failed",
        report.restored,
        scanned,
        report.failed.len()
    );
    Ok(report)
}
