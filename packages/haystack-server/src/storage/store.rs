//! The `Store` capability (§2, row E / row B): the single interface the
//! UDP dispatcher (§4.F) talks to, fronting either the in-memory TTL
//! store or the mmap-backed persistent store.
//!
//! This collapses the teacher's three-layer split (`StorageEngine` /
//! `RecordStore` / `MapDataStore`) into one trait, because Haystack has
//! no external persistence backend beyond its own data/index files --
//! but the trait-object-first shape (`Arc<dyn Store>`, `#[async_trait]`
//! for object safety) is carried over directly from the teacher's
//! `RecordStore` and `ServerStorage` traits.

use async_trait::async_trait;
use haystack_core::{Digest, Record};

use crate::error::StoreError;

/// A digest-keyed value store with a fixed capability surface: get, set,
/// close. Implemented by [`crate::storage::memory_store::MemoryStore`]
/// and [`crate::storage::persistent_store::PersistentStore`].
///
/// `async` because `set` may suspend (§5): the in-memory variant awaits
/// room in its bounded eviction channel, the persistent variant awaits
/// the exclusive store lock across index insert and, occasionally, file
/// growth. Wrapped in `Arc<dyn Store>` so the dispatcher can share one
/// handle across all worker tasks.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Looks up `digest`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the digest is absent,
    /// tombstoned, or past its expiration.
    async fn get(&self, digest: &Digest) -> Result<Record, StoreError>;

    /// Stores `record`, refreshing its expiration to `now + TTL` whether
    /// or not it already existed (§3 invariant 6).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Full`] if the store is at capacity and
    /// cannot accommodate a new digest.
    async fn set(&self, record: Record) -> Result<(), StoreError>;

    /// Releases all resources (background workers, file mappings).
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IoFailure`] if a final `sync` fails.
    async fn close(&self) -> Result<(), StoreError>;
}
