//! Content digest: the 32-byte identifier that names and authenticates a
//! [`crate::record::Record`]'s payload.

use std::fmt;

/// Number of bytes in a digest.
pub const DIGEST_LEN: usize = 32;

/// A 32-byte cryptographic digest, computed from a payload with a single
/// build-time-fixed hash function (BLAKE3-256 in this build).
///
/// Equality is byte-wise; ordering is byte-lexicographic, matching the
/// sort order the on-disk index file relies on.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    /// Wraps a raw 32-byte array as a digest without recomputing anything.
    ///
    /// Used when reading a digest back out of a record or an index entry,
    /// where the hash has already been validated (or is being validated by
    /// the caller immediately after).
    #[must_use]
    pub const fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Computes the digest of `payload` using the build's fixed hash function.
    #[must_use]
    pub fn hash(payload: &[u8]) -> Self {
        Self(*blake3::hash(payload).as_bytes())
    }

    /// Borrows the digest as a byte slice.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({self})")
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let a = Digest::hash(b"hello");
        let b = Digest::hash(b"hello");
        assert_eq!(a, b);
    }

    #[test]
    fn different_payloads_hash_differently() {
        let a = Digest::hash(b"hello");
        let b = Digest::hash(b"world");
        assert_ne!(a, b);
    }

    #[test]
    fn display_is_lowercase_hex_of_length_64() {
        let d = Digest::from_bytes([0xab; 32]);
        let s = d.to_string();
        assert_eq!(s.len(), 64);
        assert_eq!(&s[0..2], "ab");
    }

    #[test]
    fn ordering_is_byte_lexicographic() {
        let a = Digest::from_bytes([0x01; 32]);
        let b = Digest::from_bytes([0x02; 32]);
        assert!(a < b);
    }
}
