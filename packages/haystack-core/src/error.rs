//! Errors produced while constructing or validating [`crate::record::Record`]s.

use thiserror::Error;

/// Failures from [`crate::record::Record::from_payload`] and
/// [`crate::record::Record::from_bytes`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CoreError {
    /// The supplied byte slice was not the exact length the constructor requires.
    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// The length the constructor requires.
        expected: usize,
        /// The length actually supplied.
        actual: usize,
    },
    /// The digest field did not equal the hash of the payload field.
    #[error("digest does not match hash of payload")]
    InvalidDigest,
}
