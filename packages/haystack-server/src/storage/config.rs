//! Configuration for the storage layer (§4.C/§4.D/§4.E).
//!
//! Grounded on the teacher's `ServerConfig`/`NetworkConfig` pattern: a
//! plain, explicitly-constructed struct with a `Default` impl, passed
//! into the store at construction. No module-level globals, per the
//! design notes' "no global mutable state" mandate.

use std::path::PathBuf;
use std::time::Duration;

/// Which storage backend a store was built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// The concurrent in-memory TTL store (§4.B). No durability.
    Memory,
    /// The mmap-backed persistent store (§4.C/§4.D/§4.E).
    Mmap,
}

/// Construction-time configuration for either storage backend.
///
/// Every field here is a value the reference hard-codes as a
/// package-level default; the design notes require treating them as
/// explicit configuration instead.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Which backend to build.
    pub kind: StorageKind,
    /// Directory both files live in, for `StorageKind::Mmap`.
    pub data_dir: PathBuf,
    /// Time-to-live applied to every `set`. Any positive duration is
    /// accepted; the command layer, not this store, is what fixes it at
    /// 24h in the shipping CLI (Open Question 4).
    pub ttl: Duration,
    /// Upper bound on live entries (`max-items` in §6).
    pub max_items: u64,
    /// Data/index file growth increment, in bytes.
    pub chunk_size: u64,
    /// Fraction of tombstoned+expired records (of `total`) that triggers
    /// compaction on the next tick.
    pub compact_threshold: f64,
    /// How often the compaction worker (§4.E) or evictor (§4.B) ticks.
    pub cleanup_interval: Duration,
    /// Whether `set` calls `sync()` on both files before returning.
    pub sync_writes: bool,
    /// Bound on the in-memory evictor's pending-expiration channel
    /// (§4.B). Once exceeded the evictor drops the oldest pending event
    /// eagerly rather than growing unboundedly.
    pub max_pending_expirations: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::Memory,
            data_dir: PathBuf::from("./data"),
            ttl: Duration::from_secs(24 * 60 * 60),
            max_items: 2_000_000,
            chunk_size: 1024 * 1024,
            compact_threshold: 0.25,
            cleanup_interval: Duration::from_secs(30),
            sync_writes: false,
            max_pending_expirations: 4096,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = StoreConfig::default();
        assert_eq!(config.max_items, 2_000_000);
        assert_eq!(config.ttl, Duration::from_secs(86_400));
        assert_eq!(config.kind, StorageKind::Memory);
    }
}
