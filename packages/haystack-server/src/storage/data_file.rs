//! The append-oriented data file (§4.C): fixed 208-byte record slots
//! behind a 64-byte header, mmap-backed.
//!
//! Grounded on the teacher's mmap-backed engines for the file-lifecycle
//! shape (open-or-create, validate header, remap on growth) and on
//! `header.rs`/`stored_record.rs` for the on-disk layout. The physical
//! file can be smaller than `capacity` allows -- it starts at one chunk
//! and grows in `chunk_size` increments as `append` needs room; `Full`
//! is reserved for when the logical slot capacity itself is exhausted.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::MmapMut;
use parking_lot::RwLock;

use crate::error::StoreError;
use crate::storage::header::{FileHeader, DATA_MAGIC, HEADER_LEN};
use crate::storage::security;
use crate::storage::stored_record::{StoredRecord, STORED_RECORD_LEN};

/// Per-file, decoded-from-the-mapping tallies (§4.C `stats`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataFileStats {
    /// Total slots written (`record_count`).
    pub total: u64,
    /// Slots that are active and not yet expired as of `now`.
    pub active: u64,
    /// Slots that are active but past their expiration.
    pub expired: u64,
    /// Slots whose active bit has been cleared.
    pub deleted: u64,
    /// Current physical file size in bytes.
    pub bytes: u64,
}

struct MappedState {
    mmap: MmapMut,
    header: FileHeader,
}

/// The mmap-backed data file.
pub struct DataFile {
    path: PathBuf,
    file: File,
    state: RwLock<MappedState>,
    chunk_size: u64,
}

impl DataFile {
    /// Opens an existing data file or creates a fresh one at `path`.
    ///
    /// A new file is truncated to `header + max(chunk_size, one record)`
    /// and given a fresh header with the given logical `capacity`. An
    /// existing file's header is validated against `DATA_MAGIC` and
    /// against `STORED_RECORD_LEN`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SecurityViolation`] if the path fails the
    /// security gate, or [`StoreError::CorruptedFile`] /
    /// [`StoreError::IncompatibleVersion`] if an existing file's header
    /// is invalid.
    pub fn open(path: &Path, capacity: u64, chunk_size: u64) -> Result<Self, StoreError> {
        security::ensure_secure_file(path)?;

        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let existing_len = file.metadata()?.len();
        let is_new = existing_len == 0;

        if is_new {
            let initial_len = HEADER_LEN as u64 + chunk_size.max(STORED_RECORD_LEN as u64);
            file.set_len(initial_len)?;
        }

        // SAFETY: `file` is exclusively owned by this `DataFile` for the
        // lifetime of the mapping; nothing else truncates it outside of
        // `grow_locked`, which holds the same write lock.
        let mut mmap = unsafe { MmapMut::map_mut(&file)? };

        let header = if is_new {
            let header = FileHeader::new(DATA_MAGIC, capacity, STORED_RECORD_LEN as u32);
            mmap[..HEADER_LEN].copy_from_slice(&header.as_bytes());
            header
        } else {
            FileHeader::from_bytes(&mmap[..HEADER_LEN], DATA_MAGIC, path)?
        };

        if header.item_size as usize != STORED_RECORD_LEN {
            return Err(StoreError::CorruptedFile(
                path.to_path_buf(),
                "record size does not match this build",
            ));
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            state: RwLock::new(MappedState { mmap, header }),
            chunk_size: chunk_size.max(STORED_RECORD_LEN as u64),
        })
    }

    /// Appends `record` with `expiration`, growing the file first if the
    /// next slot doesn't fit in the current mapping.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Full`] if `record_count == capacity`.
    pub fn append(&self, record: &haystack_core::Record, expiration: u64) -> Result<u64, StoreError> {
        let mut state = self.state.write();
        if state.header.count >= state.header.capacity {
            return Err(StoreError::Full("data file"));
        }

        let offset = HEADER_LEN as u64 + state.header.count * STORED_RECORD_LEN as u64;
        let required_end = offset + STORED_RECORD_LEN as u64;
        if required_end > state.mmap.len() as u64 {
            Self::grow_locked(&self.file, &mut state, self.chunk_size, required_end)?;
        }

        let stored = StoredRecord::new(*record, expiration);
        let start = offset as usize;
        state.mmap[start..start + STORED_RECORD_LEN].copy_from_slice(&stored.as_bytes());

        state.header.count += 1;
        let header_bytes = state.header.as_bytes();
        state.mmap[..HEADER_LEN].copy_from_slice(&header_bytes);

        Ok(offset)
    }

    /// Overwrites the record at `offset`, refreshing its payload and
    /// expiration and clearing any tombstone.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidOffset`] if `offset` is outside the
    /// written data area or misaligned to a record boundary.
    pub fn update(&self, offset: u64, record: &haystack_core::Record, expiration: u64) -> Result<(), StoreError> {
        let mut state = self.state.write();
        self.validate_offset(&state, offset)?;
        let stored = StoredRecord::new(*record, expiration);
        let start = offset as usize;
        state.mmap[start..start + STORED_RECORD_LEN].copy_from_slice(&stored.as_bytes());
        Ok(())
    }

    /// Reads and decodes a copy of the stored record at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidOffset`] if `offset` is outside the
    /// written data area or misaligned.
    pub fn read(&self, offset: u64) -> Result<StoredRecord, StoreError> {
        let state = self.state.read();
        self.validate_offset(&state, offset)?;
        let start = offset as usize;
        StoredRecord::from_bytes(&state.mmap[start..start + STORED_RECORD_LEN])
    }

    /// Clears the active bit of the record at `offset` with a single
    /// 64-bit little-endian write.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidOffset`] if `offset` is invalid.
    pub fn mark_deleted(&self, offset: u64) -> Result<(), StoreError> {
        let mut state = self.state.write();
        self.validate_offset(&state, offset)?;
        let flags_range = StoredRecord::flags_byte_range();
        let start = offset as usize + flags_range.start;
        let end = offset as usize + flags_range.end;
        let cleared = StoredRecord::encode_flags(false);
        state.mmap[start..end].copy_from_slice(&cleared.to_le_bytes());
        Ok(())
    }

    /// Scans every written record and tallies active/expired/deleted
    /// counts as of `now`.
    #[must_use]
    pub fn stats(&self, now: u64) -> DataFileStats {
        let state = self.state.read();
        let mut stats = DataFileStats {
            total: state.header.count,
            bytes: state.mmap.len() as u64,
            ..DataFileStats::default()
        };
        for index in 0..state.header.count {
            let start = (HEADER_LEN as u64 + index * STORED_RECORD_LEN as u64) as usize;
            let slice = &state.mmap[start..start + STORED_RECORD_LEN];
            let flags = crate::storage::codec::read_u64(slice, StoredRecord::flags_byte_range().start);
            let expiration = crate::storage::codec::read_u64(slice, StoredRecord::expiration_byte_range().start);
            if !StoredRecord::flags_active(flags) {
                stats.deleted += 1;
            } else if now >= expiration {
                stats.expired += 1;
            } else {
                stats.active += 1;
            }
        }
        stats
    }

    /// Forces the mapping's dirty pages to disk.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IoFailure`] if the underlying `msync` fails.
    pub fn sync(&self) -> Result<(), StoreError> {
        self.state.read().mmap.flush().map_err(StoreError::from)
    }

    /// Current logical record count (`record_count`).
    #[must_use]
    pub fn record_count(&self) -> u64 {
        self.state.read().header.count
    }

    /// Configured logical capacity.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.state.read().header.capacity
    }

    /// The path this data file was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn validate_offset(&self, state: &MappedState, offset: u64) -> Result<(), StoreError> {
        let data_area_len = state.mmap.len() as u64 - HEADER_LEN as u64;
        let within_header = offset < HEADER_LEN as u64;
        let relative = offset.saturating_sub(HEADER_LEN as u64);
        let misaligned = relative % STORED_RECORD_LEN as u64 != 0;
        let beyond_count = relative / STORED_RECORD_LEN as u64 >= state.header.count;
        if within_header || misaligned || beyond_count {
            return Err(StoreError::InvalidOffset {
                offset,
                data_area_len,
                record_size: STORED_RECORD_LEN as u32,
            });
        }
        Ok(())
    }

    fn grow_locked(
        file: &File,
        state: &mut MappedState,
        chunk_size: u64,
        min_len: u64,
    ) -> Result<(), StoreError> {
        let current_len = state.mmap.len() as u64;
        let new_len = current_len + chunk_size.max(min_len - current_len);
        state.mmap.flush()?;
        file.set_len(new_len)?;
        // SAFETY: the write lock on `state` serializes growth against
        // every other operation on this file.
        let new_mmap = unsafe { MmapMut::map_mut(file)? };
        state.mmap = new_mmap;
        Ok(())
    }

    /// Unmaps and closes the file. Idempotent in the sense that it may
    /// be called once the store holding this `DataFile` is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IoFailure`] if the final `sync` fails.
    pub fn close(&self) -> Result<(), StoreError> {
        self.sync()
    }
}
