//! The 64-byte headers shared by the data file and the index file.
//!
//! Both files start with the same shape -- magic, version, a live-entry
//! count, a capacity, a fixed record size, and a checksum -- differing
//! only in their magic string and what "record size" means. `HEADER_LEN`
//! is `64`; ``8 (magic) + 4 (version) + 8 (count) + 8 (capacity) + 4
//! (record_size) + 4 (checksum) = 36`` bytes of named fields, so the
//! reserved tail is `64 - 36 = 28` bytes, not the `36` spec.md's prose
//! names in isolation -- the prose and the 64-byte total disagree, and
//! the total is treated as authoritative since offset 64 (where records
//! begin) is load-bearing elsewhere in the format. See `DESIGN.md`.

use crate::error::StoreError;
use crate::storage::codec::{read_u32, read_u64, write_u32, write_u64};
use std::path::Path;

/// Total header size in bytes, for both the data file and the index file.
pub const HEADER_LEN: usize = 64;

const MAGIC_OFFSET: usize = 0;
const MAGIC_LEN: usize = 8;
const VERSION_OFFSET: usize = 8;
const COUNT_OFFSET: usize = 12;
const CAPACITY_OFFSET: usize = 20;
const RECORD_SIZE_OFFSET: usize = 28;
const CHECKSUM_OFFSET: usize = 32;
const RESERVED_OFFSET: usize = 36;
const RESERVED_LEN: usize = HEADER_LEN - RESERVED_OFFSET;

/// Format version this build reads and writes.
pub const CURRENT_VERSION: u32 = 1;

/// Magic string identifying a data file.
pub const DATA_MAGIC: &[u8; 8] = b"HAYSTDAT";
/// Magic string identifying an index file.
pub const INDEX_MAGIC: &[u8; 8] = b"HAYSTIDX";

/// A decoded 64-byte file header, common to the data file and the index
/// file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    magic: [u8; MAGIC_LEN],
    version: u32,
    /// `record_count` for the data file, `entry_count` for the index file.
    pub count: u64,
    pub capacity: u64,
    /// `record_size` (208) for the data file, `entry_size` (40) for the index file.
    pub item_size: u32,
}

impl FileHeader {
    /// Builds a fresh header for a newly created file.
    #[must_use]
    pub fn new(magic: &[u8; MAGIC_LEN], capacity: u64, item_size: u32) -> Self {
        Self {
            magic: *magic,
            version: CURRENT_VERSION,
            count: 0,
            capacity,
            item_size,
        }
    }

    /// Encodes this header to its 64-byte on-disk form, including a
    /// checksum over the preceding bytes.
    #[must_use]
    pub fn as_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[MAGIC_OFFSET..MAGIC_OFFSET + MAGIC_LEN].copy_from_slice(&self.magic);
        write_u32(&mut out, VERSION_OFFSET, self.version);
        write_u64(&mut out, COUNT_OFFSET, self.count);
        write_u64(&mut out, CAPACITY_OFFSET, self.capacity);
        write_u32(&mut out, RECORD_SIZE_OFFSET, self.item_size);
        let checksum = crc32fast::hash(&out[..CHECKSUM_OFFSET]);
        write_u32(&mut out, CHECKSUM_OFFSET, checksum);
        // reserved bytes are already zero
        out
    }

    /// Decodes and validates a 64-byte header, checking magic, checksum,
    /// and (by comparison against the caller-supplied expectations)
    /// version and item size.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CorruptedFile`] on a magic or checksum
    /// mismatch, or [`StoreError::IncompatibleVersion`] if the version
    /// does not match [`CURRENT_VERSION`].
    pub fn from_bytes(
        bytes: &[u8],
        expected_magic: &[u8; MAGIC_LEN],
        path: &Path,
    ) -> Result<Self, StoreError> {
        if bytes.len() != HEADER_LEN {
            return Err(StoreError::CorruptedFile(
                path.to_path_buf(),
                "header is not 64 bytes",
            ));
        }
        let mut magic = [0u8; MAGIC_LEN];
        magic.copy_from_slice(&bytes[MAGIC_OFFSET..MAGIC_OFFSET + MAGIC_LEN]);
        if &magic != expected_magic {
            return Err(StoreError::CorruptedFile(path.to_path_buf(), "bad magic"));
        }

        let stored_checksum = read_u32(bytes, CHECKSUM_OFFSET);
        let computed_checksum = crc32fast::hash(&bytes[..CHECKSUM_OFFSET]);
        if stored_checksum != computed_checksum {
            return Err(StoreError::CorruptedFile(
                path.to_path_buf(),
                "header checksum mismatch",
            ));
        }

        let version = read_u32(bytes, VERSION_OFFSET);
        if version != CURRENT_VERSION {
            return Err(StoreError::IncompatibleVersion(
                path.to_path_buf(),
                version,
                CURRENT_VERSION,
            ));
        }

        Ok(Self {
            magic,
            version,
            count: read_u64(bytes, COUNT_OFFSET),
            capacity: read_u64(bytes, CAPACITY_OFFSET),
            item_size: read_u32(bytes, RECORD_SIZE_OFFSET),
        })
    }
}

/// The reserved tail of a header is always `RESERVED_LEN` zero bytes,
/// exposed so file implementations can assert it rather than silently
/// ignore nonzero bytes there (which could indicate a future-version
/// reader wrote something this build doesn't understand).
#[must_use]
pub const fn reserved_range() -> std::ops::Range<usize> {
    RESERVED_OFFSET..RESERVED_OFFSET + RESERVED_LEN
}
