//! The sorted digest->offset index (§4.D): a dense, binary-searchable
//! array of 40-byte entries behind the same 64-byte header shape as the
//! data file.
//!
//! Grounded on `header.rs` for the shared header layout and on the
//! data file's mmap-and-RwLock shape for the mapping lifecycle. Unlike
//! the data file, the index is truncated to its full `capacity` up
//! front -- entries are small and capacity is known at store-open time,
//! so there's no lazy-growth case to handle here.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use haystack_core::{Digest, DIGEST_LEN};
use memmap2::MmapMut;
use parking_lot::RwLock;

use crate::error::StoreError;
use crate::storage::codec::{read_u64, write_u64};
use crate::storage::header::{FileHeader, HEADER_LEN, INDEX_MAGIC};
use crate::storage::security;

/// `digest (32B) || offset (8B LE)`.
pub const ENTRY_LEN: usize = DIGEST_LEN + 8;

struct MappedState {
    mmap: MmapMut,
    header: FileHeader,
}

/// The mmap-backed sorted index file.
pub struct IndexFile {
    path: PathBuf,
    state: RwLock<MappedState>,
}

impl IndexFile {
    /// Opens an existing index file or creates a fresh one at `path`,
    /// truncated to `header + capacity * ENTRY_LEN` up front.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SecurityViolation`] if the path fails the
    /// security gate, or [`StoreError::CorruptedFile`] /
    /// [`StoreError::IncompatibleVersion`] if an existing file's header
    /// is invalid.
    pub fn open(path: &Path, capacity: u64) -> Result<Self, StoreError> {
        security::ensure_secure_file(path)?;

        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let existing_len = file.metadata()?.len();
        let is_new = existing_len == 0;

        if is_new {
            let full_len = HEADER_LEN as u64 + capacity * ENTRY_LEN as u64;
            file.set_len(full_len)?;
        }

        // SAFETY: `file` is exclusively owned by this `IndexFile`; the
        // index never grows after open, so no remap can race a reader.
        let mut mmap = unsafe { MmapMut::map_mut(&file)? };

        let header = if is_new {
            let header = FileHeader::new(INDEX_MAGIC, capacity, ENTRY_LEN as u32);
            mmap[..HEADER_LEN].copy_from_slice(&header.as_bytes());
            header
        } else {
            FileHeader::from_bytes(&mmap[..HEADER_LEN], INDEX_MAGIC, path)?
        };

        if header.item_size as usize != ENTRY_LEN {
            return Err(StoreError::CorruptedFile(
                path.to_path_buf(),
                "entry size does not match this build",
            ));
        }

        Ok(Self {
            path: path.to_path_buf(),
            state: RwLock::new(MappedState { mmap, header }),
        })
    }

    /// Binary searches for `digest`. Returns the entry's data-file
    /// offset and whether it was found.
    #[must_use]
    pub fn find(&self, digest: &Digest) -> (u64, bool) {
        let state = self.state.read();
        match Self::search(&state, digest) {
            Ok(index) => (Self::entry_offset(&state, index), true),
            Err(_) => (0, false),
        }
    }

    /// Inserts or updates `digest -> offset`. If an entry for `digest`
    /// already exists, its offset is overwritten in place; otherwise the
    /// tail is shifted right one slot to make room.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Full`] if `entry_count == capacity` and
    /// `digest` is new.
    pub fn insert(&self, digest: &Digest, offset: u64) -> Result<(), StoreError> {
        let mut state = self.state.write();
        match Self::search(&state, digest) {
            Ok(index) => {
                Self::write_entry(&mut state, index, digest, offset);
                Ok(())
            }
            Err(insert_at) => {
                if state.header.count >= state.header.capacity {
                    return Err(StoreError::Full("index file"));
                }
                let count = state.header.count as usize;
                for slot in (insert_at..count).rev() {
                    let (d, o) = Self::read_entry(&state, slot);
                    Self::write_entry(&mut state, slot + 1, &d, o);
                }
                Self::write_entry(&mut state, insert_at, digest, offset);
                state.header.count += 1;
                let header_bytes = state.header.as_bytes();
                state.mmap[..HEADER_LEN].copy_from_slice(&header_bytes);
                Ok(())
            }
        }
    }

    /// Visits every entry in digest order, stopping early if `visitor`
    /// returns `false`.
    pub fn for_each<F: FnMut(&Digest, u64) -> bool>(&self, mut visitor: F) {
        let state = self.state.read();
        for index in 0..state.header.count as usize {
            let (digest, offset) = Self::read_entry(&state, index);
            if !visitor(&digest, offset) {
                break;
            }
        }
    }

    /// Clears the entry count to zero without shrinking the mapping,
    /// used before an index rebuild from the data file.
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.header.count = 0;
        let header_bytes = state.header.as_bytes();
        state.mmap[..HEADER_LEN].copy_from_slice(&header_bytes);
    }

    /// Current entry count.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.state.read().header.count
    }

    /// Configured capacity.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.state.read().header.capacity
    }

    /// The path this index file was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Forces the mapping's dirty pages to disk.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IoFailure`] if the underlying `msync` fails.
    pub fn sync(&self) -> Result<(), StoreError> {
        self.state.read().mmap.flush().map_err(StoreError::from)
    }

    /// Unmaps and closes the file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IoFailure`] if the final `sync` fails.
    pub fn close(&self) -> Result<(), StoreError> {
        self.sync()
    }

    /// `Ok(index)` if `digest` is present at `index`; `Err(insert_at)`
    /// with the sorted-insertion position otherwise.
    fn search(state: &MappedState, digest: &Digest) -> Result<usize, usize> {
        let count = state.header.count as usize;
        let mut low = 0usize;
        let mut high = count;
        while low < high {
            let mid = low + (high - low) / 2;
            let (mid_digest, _) = Self::read_entry(state, mid);
            match mid_digest.as_bytes().cmp(digest.as_bytes()) {
                std::cmp::Ordering::Equal => return Ok(mid),
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
            }
        }
        Err(low)
    }

    fn entry_offset(state: &MappedState, index: usize) -> u64 {
        Self::read_entry(state, index).1
    }

    fn entry_byte_offset(index: usize) -> usize {
        HEADER_LEN + index * ENTRY_LEN
    }

    fn read_entry(state: &MappedState, index: usize) -> (Digest, u64) {
        let start = Self::entry_byte_offset(index);
        let mut digest_bytes = [0u8; DIGEST_LEN];
        digest_bytes.copy_from_slice(&state.mmap[start..start + DIGEST_LEN]);
        let offset = read_u64(&state.mmap, start + DIGEST_LEN);
        (Digest::from_bytes(digest_bytes), offset)
    }

    fn write_entry(state: &mut MappedState, index: usize, digest: &Digest, offset: u64) {
        let start = Self::entry_byte_offset(index);
        state.mmap[start..start + DIGEST_LEN].copy_from_slice(digest.as_bytes());
        write_u64(&mut state.mmap, start + DIGEST_LEN, offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn digest(byte: u8) -> Digest {
        Digest::from_bytes([byte; DIGEST_LEN])
    }

    #[test]
    fn insert_then_find_round_trips() {
        let dir = tempdir().unwrap();
        let index = IndexFile::open(&dir.path().join("index"), 16).unwrap();

        index.insert(&digest(5), 100).unwrap();
        let (offset, found) = index.find(&digest(5));
        assert!(found);
        assert_eq!(offset, 100);
    }

    #[test]
    fn find_missing_digest_reports_not_found() {
        let dir = tempdir().unwrap();
        let index = IndexFile::open(&dir.path().join("index"), 16).unwrap();
        index.insert(&digest(1), 10).unwrap();

        let (_, found) = index.find(&digest(2));
        assert!(!found);
    }

    #[test]
    fn insert_keeps_entries_sorted() {
        let dir = tempdir().unwrap();
        let index = IndexFile::open(&dir.path().join("index"), 16).unwrap();

        index.insert(&digest(5), 1).unwrap();
        index.insert(&digest(1), 2).unwrap();
        index.insert(&digest(9), 3).unwrap();
        index.insert(&digest(3), 4).unwrap();

        let mut seen = Vec::new();
        index.for_each(|d, offset| {
            seen.push((d.as_bytes()[0], offset));
            true
        });
        assert_eq!(seen, vec![(1, 2), (3, 4), (5, 1), (9, 3)]);
    }

    #[test]
    fn repeated_insert_updates_offset_in_place() {
        let dir = tempdir().unwrap();
        let index = IndexFile::open(&dir.path().join("index"), 16).unwrap();

        index.insert(&digest(5), 1).unwrap();
        index.insert(&digest(5), 2).unwrap();
        assert_eq!(index.entry_count(), 1);
        assert_eq!(index.find(&digest(5)), (2, true));
    }

    #[test]
    fn insert_beyond_capacity_fails() {
        let dir = tempdir().unwrap();
        let index = IndexFile::open(&dir.path().join("index"), 1).unwrap();
        index.insert(&digest(1), 1).unwrap();
        let err = index.insert(&digest(2), 2).unwrap_err();
        assert!(matches!(err, StoreError::Full("index file")));
    }

    #[test]
    fn clear_resets_entry_count() {
        let dir = tempdir().unwrap();
        let index = IndexFile::open(&dir.path().join("index"), 16).unwrap();
        index.insert(&digest(1), 1).unwrap();
        index.clear();
        assert_eq!(index.entry_count(), 0);
        assert!(!index.find(&digest(1)).1);
    }

    #[test]
    fn reopen_preserves_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index");
        {
            let index = IndexFile::open(&path, 16).unwrap();
            index.insert(&digest(7), 70).unwrap();
            index.sync().unwrap();
        }
        let reopened = IndexFile::open(&path, 16).unwrap();
        assert_eq!(reopened.find(&digest(7)), (70, true));
    }
}
