//! The persistent store (§4.E): composes the data file and index file
//! behind the same [`Store`] capability as [`MemoryStore`](super::memory_store::MemoryStore),
//! adding durability, lazy expiration, and background compaction.
//!
//! Grounded on the teacher's background-worker-owning storage engines
//! for the overall shape (open, spawn a maintenance task, close joins
//! it) and on §4.E's numbered `set`/`get`/startup/compaction recipes for
//! the exact sequencing.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use haystack_core::{Clock, Digest, Logger, Record};
use parking_lot::{Mutex, RwLock};

use crate::error::StoreError;
use crate::service::worker::BackgroundWorker;
use crate::storage::config::StoreConfig;
use crate::storage::data_file::DataFile;
use crate::storage::header::HEADER_LEN;
use crate::storage::index_file::IndexFile;
use crate::storage::security;
use crate::storage::store::Store;
use crate::storage::stored_record::STORED_RECORD_LEN;

struct StoreFiles {
    data: DataFile,
    index: IndexFile,
}

/// The mmap-backed, durable implementation of [`Store`].
pub struct PersistentStore {
    files: RwLock<StoreFiles>,
    clock: Arc<dyn Clock>,
    logger: Arc<dyn Logger>,
    ttl: Duration,
    sync_writes: bool,
    data_dir: PathBuf,
    capacity: u64,
    chunk_size: u64,
    compact_threshold: f64,
    compactor: Mutex<Option<BackgroundWorker>>,
    closed: AtomicBool,
}

impl PersistentStore {
    /// Opens (creating if absent) the data and index files under
    /// `config.data_dir`, rebuilds the index from the data file if
    /// needed, and starts the background compaction worker.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SecurityViolation`] if the data directory
    /// or either file fails the security gate, or a file-format error if
    /// an existing file is corrupt or from an incompatible version.
    pub fn open(
        config: &StoreConfig,
        clock: Arc<dyn Clock>,
        logger: Arc<dyn Logger>,
    ) -> Result<Arc<Self>, StoreError> {
        let data_dir = security::canonicalize_safe(&config.data_dir)?;
        security::ensure_data_directory(&data_dir)?;

        let data_path = data_dir.join("haystack.data");
        let index_path = data_dir.join("haystack.index");

        // A crash mid-compaction leaves `.compact` siblings behind; the
        // originals are still intact, so the fix is to discard the
        // half-built replacements and restart from them (§4.E).
        let _ = fs::remove_file(data_dir.join("haystack.data.compact"));
        let _ = fs::remove_file(data_dir.join("haystack.index.compact"));

        let data = DataFile::open(&data_path, config.max_items, config.chunk_size)?;
        let index = IndexFile::open(&index_path, config.max_items)?;

        if data.record_count() > 0 {
            rebuild_index(&data, &index)?;
        }

        let store = Arc::new(Self {
            files: RwLock::new(StoreFiles { data, index }),
            clock,
            logger,
            ttl: config.ttl,
            sync_writes: config.sync_writes,
            data_dir,
            capacity: config.max_items,
            chunk_size: config.chunk_size,
            compact_threshold: config.compact_threshold,
            compactor: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        let compaction_target = Arc::clone(&store);
        let worker = BackgroundWorker::spawn(config.cleanup_interval, move || {
            let target = Arc::clone(&compaction_target);
            async move {
                if let Err(err) = target.maybe_compact() {
                    haystack_core::log_error!(target.logger, "compaction tick failed: {err}");
                }
            }
        });
        *store.compactor.lock() = Some(worker);

        Ok(store)
    }

    /// Current data-file statistics, for the `--stats` CLI mode.
    #[must_use]
    pub fn stats(&self) -> crate::storage::data_file::DataFileStats {
        let now = self.clock.now_nanos();
        self.files.read().data.stats(now)
    }

    /// Runs one compaction check: compacts if `(deleted + expired) /
    /// total` exceeds the configured threshold, otherwise does nothing.
    fn maybe_compact(&self) -> Result<(), StoreError> {
        let now = self.clock.now_nanos();
        let reclaimable_ratio = {
            let files = self.files.read();
            let stats = files.data.stats(now);
            if stats.total == 0 {
                return Ok(());
            }
            (stats.deleted + stats.expired) as f64 / stats.total as f64
        };
        if reclaimable_ratio <= self.compact_threshold {
            return Ok(());
        }

        let mut files = self.files.write();
        let data_compact_path = self.data_dir.join("haystack.data.compact");
        let index_compact_path = self.data_dir.join("haystack.index.compact");
        let _ = fs::remove_file(&data_compact_path);
        let _ = fs::remove_file(&index_compact_path);

        let attempt = self.walk_into_compact_files(&files, &data_compact_path, &index_compact_path);

        match attempt {
            Ok((new_data, new_index)) => {
                files.data.close()?;
                files.index.close()?;
                fs::rename(&data_compact_path, self.data_dir.join("haystack.data"))?;
                fs::rename(&index_compact_path, self.data_dir.join("haystack.index"))?;
                files.data = new_data;
                files.index = new_index;
                haystack_core::log_info!(self.logger, "compaction reclaimed space in {}", self.data_dir.display());
                Ok(())
            }
            Err(err) => {
                let _ = fs::remove_file(&data_compact_path);
                let _ = fs::remove_file(&index_compact_path);
                Err(err)
            }
        }
    }

    fn walk_into_compact_files(
        &self,
        files: &StoreFiles,
        data_compact_path: &std::path::Path,
        index_compact_path: &std::path::Path,
    ) -> Result<(DataFile, IndexFile), StoreError> {
        let new_data = DataFile::open(data_compact_path, self.capacity, self.chunk_size)?;
        let new_index = IndexFile::open(index_compact_path, self.capacity)?;
        let now = self.clock.now_nanos();

        let mut failure = None;
        files.index.for_each(|digest, offset| {
            match files.data.read(offset) {
                Ok(stored) if stored.is_active() && !stored.is_expired(now) => {
                    match new_data.append(stored.record(), stored.expiration()) {
                        Ok(new_offset) => {
                            if let Err(err) = new_index.insert(digest, new_offset) {
                                failure = Some(err);
                                return false;
                            }
                        }
                        Err(err) => {
                            failure = Some(err);
                            return false;
                        }
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    failure = Some(err);
                    return false;
                }
            }
            true
        });

        if let Some(err) = failure {
            return Err(err);
        }
        new_data.sync()?;
        new_index.sync()?;
        Ok((new_data, new_index))
    }
}

/// Clears `index` and repopulates it from every active record in `data`,
/// in append order (§4.E startup).
fn rebuild_index(data: &DataFile, index: &IndexFile) -> Result<(), StoreError> {
    index.clear();
    for slot in 0..data.record_count() {
        let offset = HEADER_LEN as u64 + slot * STORED_RECORD_LEN as u64;
        let stored = match data.read(offset) {
            Ok(stored) => stored,
            Err(_) => break,
        };
        if stored.is_active() {
            index.insert(stored.record().digest(), offset)?;
        }
    }
    Ok(())
}

#[async_trait]
impl Store for PersistentStore {
    async fn get(&self, digest: &Digest) -> Result<Record, StoreError> {
        let now = self.clock.now_nanos();
        let files = self.files.read();
        let (offset, found) = files.index.find(digest);
        if !found {
            return Err(StoreError::NotFound);
        }

        let stored = files.data.read(offset)?;
        if !stored.is_active() {
            return Err(StoreError::NotFound);
        }
        if stored.is_expired(now) {
            // The data file's own lock makes this a non-blocking write
            // that doesn't need the store's exclusive lock or a deferred
            // channel; "schedule asynchronous" in spec terms just means
            // the caller doesn't wait on it, which holds here too.
            let _ = files.data.mark_deleted(offset);
            return Err(StoreError::NotFound);
        }

        Ok(*stored.record())
    }

    async fn set(&self, record: Record) -> Result<(), StoreError> {
        let now = self.clock.now_nanos();
        let expiration = now.saturating_add(self.ttl.as_nanos() as u64);
        let digest = *record.digest();

        let files = self.files.write();
        let (offset, found) = files.index.find(&digest);
        if found {
            files.data.update(offset, &record, expiration)?;
        } else {
            let offset = files.data.append(&record, expiration)?;
            files.index.insert(&digest, offset)?;
        }

        if self.sync_writes {
            files.data.sync()?;
            files.index.sync()?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(mut worker) = self.compactor.lock().take() {
            worker.shutdown().await;
        }
        let files = self.files.read();
        files.data.close()?;
        files.index.close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use haystack_core::clock::test_util::FakeClock;
    use haystack_core::NullLogger;
    use tempfile::tempdir;

    fn sample_record(byte: u8) -> Record {
        let payload = vec![byte; haystack_core::PAYLOAD_LEN];
        Record::from_payload(&payload).unwrap()
    }

    fn config_in(dir: &std::path::Path) -> StoreConfig {
        StoreConfig {
            data_dir: dir.to_path_buf(),
            max_items: 16,
            chunk_size: 4096,
            ttl: Duration::from_secs(60),
            ..StoreConfig::default()
        }
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let store = PersistentStore::open(
            &config_in(dir.path()),
            Arc::new(FakeClock::new(0)),
            Arc::new(NullLogger),
        )
        .unwrap();

        let record = sample_record(1);
        store.set(record).await.unwrap();
        let fetched = store.get(record.digest()).await.unwrap();
        assert_eq!(fetched, record);
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_digest_is_not_found() {
        let dir = tempdir().unwrap();
        let store = PersistentStore::open(
            &config_in(dir.path()),
            Arc::new(FakeClock::new(0)),
            Arc::new(NullLogger),
        )
        .unwrap();

        let digest = Digest::from_bytes([0xaa; 32]);
        assert!(matches!(store.get(&digest).await, Err(StoreError::NotFound)));
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn expired_entry_is_not_found_and_gets_tombstoned() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(FakeClock::new(0));
        let mut config = config_in(dir.path());
        config.ttl = Duration::from_millis(100);
        let store = PersistentStore::open(&config, Arc::clone(&clock) as Arc<dyn Clock>, Arc::new(NullLogger)).unwrap();

        let record = sample_record(2);
        store.set(record).await.unwrap();
        clock.advance(Duration::from_millis(200).as_nanos() as u64);

        assert!(matches!(store.get(record.digest()).await, Err(StoreError::NotFound)));
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn repeated_set_updates_in_place_without_growing_index() {
        let dir = tempdir().unwrap();
        let store = PersistentStore::open(
            &config_in(dir.path()),
            Arc::new(FakeClock::new(0)),
            Arc::new(NullLogger),
        )
        .unwrap();

        let record = sample_record(3);
        store.set(record).await.unwrap();
        store.set(record).await.unwrap();
        let fetched = store.get(record.digest()).await.unwrap();
        assert_eq!(fetched, record);
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn restart_rebuilds_index_from_data_file() {
        let dir = tempdir().unwrap();
        let record = sample_record(4);
        {
            let store = PersistentStore::open(
                &config_in(dir.path()),
                Arc::new(FakeClock::new(0)),
                Arc::new(NullLogger),
            )
            .unwrap();
            store.set(record).await.unwrap();
            store.close().await.unwrap();
        }

        let reopened = PersistentStore::open(
            &config_in(dir.path()),
            Arc::new(FakeClock::new(0)),
            Arc::new(NullLogger),
        )
        .unwrap();
        let fetched = reopened.get(record.digest()).await.unwrap();
        assert_eq!(fetched, record);
        reopened.close().await.unwrap();
    }

    #[tokio::test]
    async fn compaction_reclaims_expired_records() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(FakeClock::new(0));
        let mut config = config_in(dir.path());
        config.ttl = Duration::from_millis(50);
        config.compact_threshold = 0.25;
        let store = PersistentStore::open(&config, Arc::clone(&clock) as Arc<dyn Clock>, Arc::new(NullLogger)).unwrap();

        for byte in 0..8u8 {
            store.set(sample_record(byte)).await.unwrap();
        }
        clock.advance(Duration::from_millis(200).as_nanos() as u64);

        store.maybe_compact().unwrap();
        let stats = store.stats();
        assert_eq!(stats.total, 0);
        store.close().await.unwrap();
    }
}
