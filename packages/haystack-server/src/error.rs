//! The unified error surface for the storage layer (§7 of the design).
//!
//! The dispatcher never surfaces these to a client -- every read-path
//! failure becomes "no response" and every write-path failure becomes a
//! log line -- but the store itself always returns a typed `Result` so
//! callers above the dispatcher (tests, the `--stats` CLI mode) can
//! distinguish failure modes.

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by the `Store` capability and the file-format layer
/// beneath it.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A wire or record payload was the wrong length.
    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length in bytes.
        actual: usize,
    },
    /// A record's digest did not match the hash of its payload.
    #[error("digest does not match hash of payload")]
    InvalidDigest,
    /// The requested digest is absent, tombstoned, or expired.
    #[error("not found")]
    NotFound,
    /// The data or index file has reached its configured capacity.
    #[error("{0} file is full (capacity reached)")]
    Full(&'static str),
    /// An offset fell outside the data area, or was not aligned to a
    /// record boundary.
    #[error("invalid offset {offset} (data area is {data_area_len} bytes, record size {record_size})")]
    InvalidOffset {
        /// The rejected offset.
        offset: u64,
        /// Length of the file's data area in bytes.
        data_area_len: u64,
        /// Fixed record size in bytes.
        record_size: u32,
    },
    /// A file's header failed magic, version, or checksum validation.
    #[error("corrupted file {0}: {1}")]
    CorruptedFile(PathBuf, &'static str),
    /// A file's header declared a format version this build cannot read.
    #[error("incompatible version {found} in {0} (expected {expected})", found = .1, expected = .2)]
    IncompatibleVersion(PathBuf, u32, u32),
    /// Path traversal, wrong permissions, wrong owner, or a world-writable
    /// directory, per §4.G.
    #[error("security violation: {0}")]
    SecurityViolation(String),
    /// An OS-level failure on mmap, read, write, rename, or similar.
    #[error("io failure: {0}")]
    IoFailure(#[from] std::io::Error),
}

impl From<haystack_core::CoreError> for StoreError {
    fn from(err: haystack_core::CoreError) -> Self {
        match err {
            haystack_core::CoreError::InvalidLength { expected, actual } => {
                Self::InvalidLength { expected, actual }
            }
            haystack_core::CoreError::InvalidDigest => Self::InvalidDigest,
        }
    }
}
