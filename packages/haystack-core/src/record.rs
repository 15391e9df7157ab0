//! Record types: the unit of transfer and storage.
//!
//! Defines [`Payload`] (the 160-byte opaque value) and [`Record`] (a
//! [`Digest`](crate::digest::Digest) concatenated with a [`Payload`],
//! 192 bytes total). Content addressing means a `Record` is valid iff its
//! digest equals the hash of its payload; `from_bytes` enforces this at
//! construction, so nothing downstream needs to re-check it.

use crate::digest::{Digest, DIGEST_LEN};
use crate::error::CoreError;

/// Number of bytes in a payload.
pub const PAYLOAD_LEN: usize = 160;

/// Number of bytes in a wire-form record (digest || payload).
pub const RECORD_LEN: usize = DIGEST_LEN + PAYLOAD_LEN;

/// Exactly 160 bytes of opaque octets: the value half of a [`Record`].
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Payload([u8; PAYLOAD_LEN]);

impl Payload {
    /// Builds a payload from an exact-length byte array.
    #[must_use]
    pub const fn from_array(bytes: [u8; PAYLOAD_LEN]) -> Self {
        Self(bytes)
    }

    /// Validates and wraps a byte slice as a payload.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidLength`] if `bytes.len() != PAYLOAD_LEN`.
    pub fn try_from_slice(bytes: &[u8]) -> Result<Self, CoreError> {
        if bytes.len() != PAYLOAD_LEN {
            return Err(CoreError::InvalidLength {
                expected: PAYLOAD_LEN,
                actual: bytes.len(),
            });
        }
        let mut buf = [0u8; PAYLOAD_LEN];
        buf.copy_from_slice(bytes);
        Ok(Self(buf))
    }

    /// Borrows the payload as a byte slice.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; PAYLOAD_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Payload").field(&"<160 bytes>").finish()
    }
}

/// A digest paired with the payload it authenticates: the unit of
/// transfer and storage. Exactly 192 bytes on the wire.
///
/// A `Record` can only be constructed through [`Record::from_payload`] or
/// [`Record::from_bytes`], both of which guarantee
/// `digest == hash(payload)` -- there is no way to build an inconsistent
/// record, so nothing downstream ever needs to re-validate one.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Record {
    digest: Digest,
    payload: Payload,
}

impl Record {
    /// Builds a record from a 160-byte payload, computing its digest.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidLength`] if `payload.len() != PAYLOAD_LEN`.
    pub fn from_payload(payload: &[u8]) -> Result<Self, CoreError> {
        let payload = Payload::try_from_slice(payload)?;
        let digest = Digest::hash(payload.as_bytes());
        Ok(Self { digest, payload })
    }

    /// Builds a record from 192 bytes of wire form (digest || payload),
    /// validating that the digest matches the hash of the payload.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidLength`] if `bytes.len() != RECORD_LEN`,
    /// or [`CoreError::InvalidDigest`] if the digest does not match.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        if bytes.len() != RECORD_LEN {
            return Err(CoreError::InvalidLength {
                expected: RECORD_LEN,
                actual: bytes.len(),
            });
        }
        let mut digest_bytes = [0u8; DIGEST_LEN];
        digest_bytes.copy_from_slice(&bytes[..DIGEST_LEN]);
        let digest = Digest::from_bytes(digest_bytes);
        let payload = Payload::try_from_slice(&bytes[DIGEST_LEN..])?;

        if Digest::hash(payload.as_bytes()) != digest {
            return Err(CoreError::InvalidDigest);
        }
        Ok(Self { digest, payload })
    }

    /// This record's digest.
    #[must_use]
    pub const fn digest(&self) -> &Digest {
        &self.digest
    }

    /// This record's payload.
    #[must_use]
    pub const fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Renders the record back to its 192-byte wire form (digest || payload).
    #[must_use]
    pub fn as_bytes(&self) -> [u8; RECORD_LEN] {
        let mut out = [0u8; RECORD_LEN];
        out[..DIGEST_LEN].copy_from_slice(self.digest.as_bytes());
        out[DIGEST_LEN..].copy_from_slice(self.payload.as_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> Vec<u8> {
        (0..PAYLOAD_LEN).map(|i| (i % 256) as u8).collect()
    }

    #[test]
    fn from_payload_computes_digest() {
        let p = sample_payload();
        let r = Record::from_payload(&p).unwrap();
        assert_eq!(*r.digest(), Digest::hash(&p));
        assert_eq!(r.payload().as_bytes().as_slice(), p.as_slice());
    }

    #[test]
    fn from_payload_rejects_wrong_length() {
        let err = Record::from_payload(&[0u8; 10]).unwrap_err();
        assert_eq!(
            err,
            CoreError::InvalidLength {
                expected: PAYLOAD_LEN,
                actual: 10
            }
        );
    }

    #[test]
    fn round_trip_through_bytes() {
        let p = sample_payload();
        let r1 = Record::from_payload(&p).unwrap();
        let bytes = r1.as_bytes();
        let r2 = Record::from_bytes(&bytes).unwrap();
        assert_eq!(r1, r2);
    }

    #[test]
    fn from_bytes_rejects_wrong_length() {
        let err = Record::from_bytes(&[0u8; 191]).unwrap_err();
        assert_eq!(
            err,
            CoreError::InvalidLength {
                expected: RECORD_LEN,
                actual: 191
            }
        );
    }

    #[test]
    fn from_bytes_rejects_mismatched_digest() {
        let p = sample_payload();
        let r = Record::from_payload(&p).unwrap();
        let mut bytes = r.as_bytes();
        bytes[0] ^= 0xff; // corrupt a digest byte
        let err = Record::from_bytes(&bytes).unwrap_err();
        assert_eq!(err, CoreError::InvalidDigest);
    }

    proptest::proptest! {
        #[test]
        fn content_addressing_holds_for_any_payload(bytes in proptest::collection::vec(proptest::num::u8::ANY, PAYLOAD_LEN)) {
            let r = Record::from_payload(&bytes).unwrap();
            proptest::prop_assert_eq!(*r.digest(), Digest::hash(&bytes));
            let r2 = Record::from_bytes(&r.as_bytes()).unwrap();
            proptest::prop_assert_eq!(r, r2);
        }
    }
}
