//! The in-memory TTL store (§4.B): a concurrent digest->payload map with
//! per-entry expiration and a single background evictor.
//!
//! Grounded on the teacher's `HashMapStorage` backend -- a `DashMap`
//! gives lock-free, sharded concurrent access without an external
//! `RwLock`, which is exactly what §5 asks for ("many
//! concurrent `get`s, one `set` at a time" falls naturally out of
//! `DashMap`'s per-shard locking: two `set`s to different digests don't
//! contend, and a `get` never blocks a `set` to an unrelated digest).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use haystack_core::{Clock, Digest, Logger, Payload, Record};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::StoreError;
use crate::storage::config::StoreConfig;
use crate::storage::store::Store;

#[derive(Clone, Copy)]
struct MemoryEntry {
    payload: Payload,
    expiration: u64,
}

/// An expiration to re-check once its deadline passes.
struct PendingExpiration {
    digest: Digest,
    expiration: u64,
}

/// Concurrent, non-durable digest->payload map with TTL-driven eviction.
///
/// `set` pushes a [`PendingExpiration`] onto a bounded channel that the
/// evictor task drains. The evictor only removes an entry if its
/// *current* expiration still matches the event's expiration -- a
/// `set`-triggered refresh naturally invalidates stale events without
/// any extra bookkeeping.
pub struct MemoryStore {
    entries: Arc<DashMap<Digest, MemoryEntry>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    max_items: u64,
    expiry_tx: mpsc::Sender<PendingExpiration>,
    shutdown_tx: watch::Sender<bool>,
    evictor: parking_lot::Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl MemoryStore {
    /// Builds a new in-memory store and spawns its evictor task.
    #[must_use]
    pub fn new(config: &StoreConfig, clock: Arc<dyn Clock>, logger: Arc<dyn Logger>) -> Self {
        let entries: Arc<DashMap<Digest, MemoryEntry>> = Arc::new(DashMap::new());
        let (expiry_tx, expiry_rx) = mpsc::channel(config.max_pending_expirations.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let evictor = tokio::spawn(run_evictor(
            Arc::clone(&entries),
            expiry_rx,
            Arc::clone(&clock),
            logger,
            config.max_pending_expirations,
            shutdown_rx,
        ));

        Self {
            entries,
            clock,
            ttl: config.ttl,
            max_items: config.max_items,
            expiry_tx,
            shutdown_tx,
            evictor: parking_lot::Mutex::new(Some(evictor)),
            closed: AtomicBool::new(false),
        }
    }

    /// Current number of live entries (tombstones don't exist in this
    /// backend; an entry is either present or gone).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

async fn run_evictor(
    entries: Arc<DashMap<Digest, MemoryEntry>>,
    mut expiry_rx: mpsc::Receiver<PendingExpiration>,
    clock: Arc<dyn Clock>,
    logger: Arc<dyn Logger>,
    max_pending: usize,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let event = tokio::select! {
            biased;
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    return;
                }
                continue;
            }
            event = expiry_rx.recv() => match event {
                Some(event) => event,
                None => return,
            },
        };

        // If the pending queue is backed up to capacity, skip the sleep
        // and evict eagerly -- otherwise the evictor falls permanently
        // behind under sustained write load (§4.B).
        let backlogged = expiry_rx.len() >= max_pending.saturating_sub(1);
        if !backlogged {
            let now = clock.now_nanos();
            if event.expiration > now {
                tokio::time::sleep(Duration::from_nanos(event.expiration - now)).await;
            }
        }

        let removed = entries.remove_if(&event.digest, |_, entry| entry.expiration == event.expiration);
        if removed.is_some() {
            haystack_core::log_debug!(logger, "evicted digest {}", event.digest);
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, digest: &Digest) -> Result<Record, StoreError> {
        let now = self.clock.now_nanos();
        let entry = self.entries.get(digest).ok_or(StoreError::NotFound)?;
        if entry.expiration <= now {
            return Err(StoreError::NotFound);
        }
        let payload = entry.payload;
        drop(entry);
        let bytes = {
            let mut buf = Vec::with_capacity(haystack_core::DIGEST_LEN + haystack_core::PAYLOAD_LEN);
            buf.extend_from_slice(digest.as_bytes());
            buf.extend_from_slice(payload.as_bytes());
            buf
        };
        Record::from_bytes(&bytes).map_err(StoreError::from)
    }

    async fn set(&self, record: Record) -> Result<(), StoreError> {
        let digest = *record.digest();
        let now = self.clock.now_nanos();
        let expiration = now.saturating_add(self.ttl.as_nanos() as u64);

        if !self.entries.contains_key(&digest) && self.entries.len() as u64 >= self.max_items {
            return Err(StoreError::Full("memory store"));
        }

        self.entries.insert(
            digest,
            MemoryEntry {
                payload: *record.payload(),
                expiration,
            },
        );

        // Backpressure: if the evictor is behind, this await suspends
        // the caller until it drains room (§5).
        let _ = self
            .expiry_tx
            .send(PendingExpiration { digest, expiration })
            .await;
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.evictor.lock().take() {
            let _ = handle.await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use haystack_core::clock::test_util::FakeClock;
    use haystack_core::NullLogger;

    fn sample_record(byte: u8) -> Record {
        let payload = vec![byte; haystack_core::PAYLOAD_LEN];
        Record::from_payload(&payload).unwrap()
    }

    fn store_with_clock(ttl: Duration, clock: Arc<FakeClock>) -> (MemoryStore, Arc<FakeClock>) {
        let config = StoreConfig {
            ttl,
            ..StoreConfig::default()
        };
        let store = MemoryStore::new(&config, clock.clone(), Arc::new(NullLogger));
        (store, clock)
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let clock = Arc::new(FakeClock::new(0));
        let (store, _clock) = store_with_clock(Duration::from_secs(60), clock);
        let record = sample_record(7);

        store.set(record).await.unwrap();
        let fetched = store.get(record.digest()).await.unwrap();
        assert_eq!(fetched, record);
    }

    #[tokio::test]
    async fn unknown_digest_is_not_found() {
        let clock = Arc::new(FakeClock::new(0));
        let (store, _clock) = store_with_clock(Duration::from_secs(60), clock);
        let digest = Digest::from_bytes([0xff; 32]);
        assert!(matches!(store.get(&digest).await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn expired_entry_is_not_found() {
        let clock = Arc::new(FakeClock::new(0));
        let (store, clock) = store_with_clock(Duration::from_millis(100), clock);
        let record = sample_record(1);
        store.set(record).await.unwrap();

        clock.advance(Duration::from_millis(10).as_nanos() as u64);
        assert_eq!(store.get(record.digest()).await.unwrap(), record);

        clock.advance(Duration::from_millis(200).as_nanos() as u64);
        assert!(matches!(
            store.get(record.digest()).await,
            Err(StoreError::NotFound)
        ));
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn repeated_set_refreshes_expiration_not_payload() {
        let clock = Arc::new(FakeClock::new(0));
        let (store, clock) = store_with_clock(Duration::from_millis(100), clock);
        let record = sample_record(2);

        store.set(record).await.unwrap();
        clock.advance(50_000_000);
        store.set(record).await.unwrap();
        clock.advance(80_000_000);

        // Original TTL (100ms) from T0 would have expired by 130ms, but
        // the refresh at 50ms pushes expiration to 150ms.
        assert_eq!(store.get(record.digest()).await.unwrap(), record);
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn full_store_rejects_new_digest() {
        let clock = Arc::new(FakeClock::new(0));
        let config = StoreConfig {
            ttl: Duration::from_secs(60),
            max_items: 2,
            ..StoreConfig::default()
        };
        let store = MemoryStore::new(&config, clock, Arc::new(NullLogger));

        store.set(sample_record(1)).await.unwrap();
        store.set(sample_record(2)).await.unwrap();
        let err = store.set(sample_record(3)).await.unwrap_err();
        assert!(matches!(err, StoreError::Full(_)));

        // Updating an existing digest is still fine even at capacity.
        store.set(sample_record(1)).await.unwrap();
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let clock = Arc::new(FakeClock::new(0));
        let (store, _clock) = store_with_clock(Duration::from_secs(60), clock);
        store.close().await.unwrap();
        store.close().await.unwrap();
    }
}
