//! The 208-byte on-disk representation of a record: the wire-form
//! [`Record`](haystack_core::Record) plus an expiration and a flags word
//! (§3, "Stored record").

use haystack_core::{Record, RECORD_LEN};

use crate::error::StoreError;
use crate::storage::codec::{read_u64, write_u64};

/// `record (192B) || expiration (8B LE) || flags (8B LE)`.
pub const STORED_RECORD_LEN: usize = RECORD_LEN + 8 + 8;

const EXPIRATION_OFFSET: usize = RECORD_LEN;
const FLAGS_OFFSET: usize = RECORD_LEN + 8;

/// Bit 0 of the flags word: set means the record is live, clear means
/// it has been tombstoned. Bits 1..63 are reserved and must be zero.
const FLAG_ACTIVE: u64 = 1;

/// A record plus its expiration (nanoseconds since the epoch) and
/// active/tombstoned state, exactly as laid out on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredRecord {
    record: Record,
    expiration: u64,
    active: bool,
}

impl StoredRecord {
    /// Builds a fresh, active stored record with the given expiration.
    #[must_use]
    pub const fn new(record: Record, expiration: u64) -> Self {
        Self {
            record,
            expiration,
            active: true,
        }
    }

    /// Decodes a 208-byte on-disk slot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidLength`] if `bytes.len() !=
    /// STORED_RECORD_LEN`, or a wire-format error if the embedded record
    /// fails content-addressing validation.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        if bytes.len() != STORED_RECORD_LEN {
            return Err(StoreError::InvalidLength {
                expected: STORED_RECORD_LEN,
                actual: bytes.len(),
            });
        }
        let record = Record::from_bytes(&bytes[..RECORD_LEN])?;
        let expiration = read_u64(bytes, EXPIRATION_OFFSET);
        let flags = read_u64(bytes, FLAGS_OFFSET);
        Ok(Self {
            record,
            expiration,
            active: flags & FLAG_ACTIVE != 0,
        })
    }

    /// Encodes this stored record to its 208-byte on-disk form.
    #[must_use]
    pub fn as_bytes(&self) -> [u8; STORED_RECORD_LEN] {
        let mut out = [0u8; STORED_RECORD_LEN];
        out[..RECORD_LEN].copy_from_slice(&self.record.as_bytes());
        write_u64(&mut out, EXPIRATION_OFFSET, self.expiration);
        write_u64(&mut out, FLAGS_OFFSET, u64::from(self.active));
        out
    }

    /// The embedded wire-form record.
    #[must_use]
    pub const fn record(&self) -> &Record {
        &self.record
    }

    /// Expiration time, in nanoseconds since the Unix epoch.
    #[must_use]
    pub const fn expiration(&self) -> u64 {
        self.expiration
    }

    /// `true` unless the active bit has been cleared by a tombstone.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// `true` if `now` is past this record's expiration.
    #[must_use]
    pub const fn is_expired(&self, now: u64) -> bool {
        now >= self.expiration
    }

    /// Decodes only the flags word at `bytes[200..208]` without decoding
    /// the whole 208-byte slot -- used by [`mark_deleted`](super::data_file::DataFile::mark_deleted)'s
    /// read-modify-write of a single field.
    #[must_use]
    pub fn flags_active(flags_word: u64) -> bool {
        flags_word & FLAG_ACTIVE != 0
    }

    /// The flags-word byte range within a stored record slot.
    #[must_use]
    pub const fn flags_byte_range() -> std::ops::Range<usize> {
        FLAGS_OFFSET..FLAGS_OFFSET + 8
    }

    /// The expiration-word byte range within a stored record slot.
    #[must_use]
    pub const fn expiration_byte_range() -> std::ops::Range<usize> {
        EXPIRATION_OFFSET..EXPIRATION_OFFSET + 8
    }

    /// The encoded flags word for an active (or tombstoned) record.
    #[must_use]
    pub const fn encode_flags(active: bool) -> u64 {
        if active {
            FLAG_ACTIVE
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> Record {
        let payload: Vec<u8> = (0..haystack_core::PAYLOAD_LEN).map(|i| i as u8).collect();
        Record::from_payload(&payload).unwrap()
    }

    #[test]
    fn round_trips_through_bytes() {
        let stored = StoredRecord::new(sample_record(), 123_456_789);
        let bytes = stored.as_bytes();
        assert_eq!(bytes.len(), STORED_RECORD_LEN);
        let decoded = StoredRecord::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, stored);
        assert!(decoded.is_active());
    }

    #[test]
    fn tombstoned_flag_round_trips() {
        let mut stored = StoredRecord::new(sample_record(), 1);
        stored.active = false;
        let bytes = stored.as_bytes();
        let decoded = StoredRecord::from_bytes(&bytes).unwrap();
        assert!(!decoded.is_active());
    }

    #[test]
    fn is_expired_is_inclusive_of_now() {
        let stored = StoredRecord::new(sample_record(), 100);
        assert!(!stored.is_expired(99));
        assert!(stored.is_expired(100));
        assert!(stored.is_expired(101));
    }

    #[test]
    fn rejects_wrong_length() {
        let err = StoredRecord::from_bytes(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, StoreError::InvalidLength { .. }));
    }

    #[test]
    fn rejects_mismatched_embedded_digest() {
        let stored = StoredRecord::new(sample_record(), 1);
        let mut bytes = stored.as_bytes();
        bytes[0] ^= 0xff;
        let err = StoredRecord::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, StoreError::InvalidDigest));
    }
}
