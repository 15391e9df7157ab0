//! Haystack core -- content-addressed `Digest`/`Record` types, and the
//! clock/logger capability traits the storage and dispatcher layers
//! consume without depending on a concrete backend.
//!
//! This crate defines the wire format: a [`Digest`] is the hash of a
//! [`Payload`]; a [`Record`] is the two concatenated. Everything
//! downstream -- the mmap storage engine, the in-memory TTL store, the
//! UDP dispatcher -- builds on these types and never re-implements
//! content addressing.

pub mod clock;
pub mod digest;
pub mod error;
pub mod logger;
pub mod record;

pub use clock::{Clock, SystemClock};
pub use digest::{Digest, DIGEST_LEN};
pub use error::CoreError;
pub use logger::{Logger, NullLogger};
pub use record::{Payload, Record, PAYLOAD_LEN, RECORD_LEN};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {}

    #[test]
    fn reexports_accessible() {
        let payload: Vec<u8> = std::iter::repeat(0u8).take(PAYLOAD_LEN).collect();
        let record = Record::from_payload(&payload).unwrap();
        assert_eq!(record.as_bytes().len(), RECORD_LEN);
        let _ = NullLogger;
        let _ = SystemClock.now_nanos();
    }
}
