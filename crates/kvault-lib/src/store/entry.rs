//! Stored entry format.
//!
//! Each value in the store is laid out as:
//!
//! ```text
//! ┌──────────────────────────────┬──────────────────────────────┐
//! │ EntryHeader (bincode)        │ body (zstd frame, or raw     │
//! │ format, name, modified,      │ bytes when level == 0)       │
//! │ level, size                  │                              │
//! └──────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! The header is an explicit record kept next to the payload, so staleness
//! checks and listings decode it without touching the body. `modified` is
//! whole seconds since the Unix epoch, floored.

use std::io::{self, Read, Write};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::SetupError;

/// Current on-disk layout version.
pub const ENTRY_FORMAT: u8 = 1;

const DECODE_BUFFER: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("header encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("header decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("unknown entry format {0}")]
    UnknownFormat(u8),

    #[error("output write error: {0}")]
    Write(io::Error),

    #[error("size mismatch: header says {expected} bytes, body holds {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("modification time is outside the representable range")]
    TimeOutOfRange,
}

/// Compression level in `0..=9`. Level 0 stores the body uncompressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CompressionLevel(u8);

impl CompressionLevel {
    pub const STORED: CompressionLevel = CompressionLevel(0);
    pub const MAX: CompressionLevel = CompressionLevel(9);

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self::MAX
    }
}

impl TryFrom<u32> for CompressionLevel {
    type Error = SetupError;

    fn try_from(level: u32) -> Result<Self, Self::Error> {
        if level > 9 {
            return Err(SetupError::InvalidCompression(level));
        }
        Ok(CompressionLevel(level as u8))
    }
}

/// Metadata stored in front of every entry body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryHeader {
    pub format: u8,
    /// Original path of the file this entry was taken from.
    pub name: String,
    /// Modification time, whole seconds since the Unix epoch.
    pub modified: i64,
    pub level: u8,
    /// Uncompressed size in bytes.
    pub size: u64,
}

impl EntryHeader {
    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.modified, 0)
    }

    /// `modified` as a `SystemTime`, if the platform can represent it.
    pub fn modified_time(&self) -> Option<SystemTime> {
        let offset = Duration::from_secs(self.modified.unsigned_abs());
        if self.modified >= 0 {
            UNIX_EPOCH.checked_add(offset)
        } else {
            UNIX_EPOCH.checked_sub(offset)
        }
    }
}

/// A decoded entry: header plus the still-compressed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    header: EntryHeader,
    body: Vec<u8>,
}

/// Convert a filesystem timestamp, keeping sub-second precision.
///
/// Returns `None` for times chrono cannot represent.
pub fn utc_time(time: SystemTime) -> Option<DateTime<Utc>> {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => {
            DateTime::from_timestamp(i64::try_from(after.as_secs()).ok()?, after.subsec_nanos())
        }
        Err(e) => {
            let before = e.duration();
            let secs = i64::try_from(before.as_secs()).ok()?;
            match before.subsec_nanos() {
                0 => DateTime::from_timestamp(-secs, 0),
                nanos => DateTime::from_timestamp(-secs - 1, 1_000_000_000 - nanos),
            }
        }
    }
}

/// Floor a timestamp to whole seconds since the epoch.
pub fn unix_seconds(time: SystemTime) -> Option<i64> {
    utc_time(time).map(|time| time.timestamp())
}

impl Entry {
    /// Read `reader` to the end and compress it at `level`.
    pub fn compress<R: Read>(
        name: &str,
        modified: SystemTime,
        level: CompressionLevel,
        mut reader: R,
    ) -> Result<Self, CodecError> {
        let modified = unix_seconds(modified).ok_or(CodecError::TimeOutOfRange)?;
        let (body, size) = if level == CompressionLevel::STORED {
            let mut body = Vec::new();
            let size = io::copy(&mut reader, &mut body)?;
            (body, size)
        } else {
            let mut encoder = zstd::stream::write::Encoder::new(Vec::new(), level.get() as i32)?;
            let size = io::copy(&mut reader, &mut encoder)?;
            (encoder.finish()?, size)
        };

        Ok(Self {
            header: EntryHeader {
                format: ENTRY_FORMAT,
                name: name.to_string(),
                modified,
                level: level.get(),
                size,
            },
            body,
        })
    }

    pub fn header(&self) -> &EntryHeader {
        &self.header
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Serialize header and body into the stored byte layout.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut bytes = bincode::serde::encode_to_vec(&self.header, bincode::config::standard())?;
        bytes.extend_from_slice(&self.body);
        Ok(bytes)
    }

    /// Decode a stored value, copying the body out.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let (header, consumed) = split_header(bytes)?;
        Ok(Self {
            header,
            body: bytes[consumed..].to_vec(),
        })
    }

    /// Decode only the header of a stored value.
    pub fn decode_header(bytes: &[u8]) -> Result<EntryHeader, CodecError> {
        split_header(bytes).map(|(header, _)| header)
    }

    /// Decompress a stored value straight into `writer`.
    ///
    /// Returns the number of bytes written.
    pub fn unpack<W: Write>(bytes: &[u8], writer: &mut W) -> Result<u64, CodecError> {
        let (header, consumed) = split_header(bytes)?;
        decompress(&header, &bytes[consumed..], writer)
    }

    /// Decompress this entry's body into `writer`.
    pub fn decompress_to<W: Write>(&self, writer: &mut W) -> Result<u64, CodecError> {
        decompress(&self.header, &self.body, writer)
    }
}

fn split_header(bytes: &[u8]) -> Result<(EntryHeader, usize), CodecError> {
    let (header, consumed): (EntryHeader, usize) =
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
    if header.format != ENTRY_FORMAT {
        return Err(CodecError::UnknownFormat(header.format));
    }
    Ok((header, consumed))
}

fn decompress<W: Write>(header: &EntryHeader, body: &[u8], writer: &mut W) -> Result<u64, CodecError> {
    let written = if header.level == 0 {
        writer.write_all(body).map_err(CodecError::Write)?;
        body.len() as u64
    } else {
        let mut decoder = zstd::stream::read::Decoder::new(body)?;
        let mut buf = vec![0u8; DECODE_BUFFER];
        let mut written = 0u64;
        loop {
            let n = match decoder.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(CodecError::Io(e)),
            };
            writer.write_all(&buf[..n]).map_err(CodecError::Write)?;
            written += n as u64;
        }
        written
    };

    if written != header.size {
        return Err(CodecError::SizeMismatch {
            expected: header.size,
            actual: written,
        });
    }
    Ok(written)
}
