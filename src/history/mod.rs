//! Capped, ordered log of detected cries plus their audio attachments.
//! Metadata writes are synchronous read-modify-writes under one mutex. Audio
//! blobs are encoded and written on a dedicated `blob-writer` thread, outside
//! that mutex; each `append_with_audio` returns a receipt that reports the blob
//! outcome on its own.

pub mod storage;

use std::sync::Arc;
use std::thread::JoinHandle;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::metrics::{Counter, MetricsRegistry, Stage};
use crate::model::CryInstance;

pub use storage::{MemoryStorage, SqliteStorage, StoragePort};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Log cap; the oldest entries are evicted first.
    pub max_entries: usize,
    /// Storage key of the metadata log.
    pub history_key: String,
    /// Audio blobs live at `<prefix><id>`.
    pub audio_key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            history_key: "cry_history".to_string(),
            audio_key_prefix: "cry_audio_".to_string(),
        }
    }
}

/// Persisted form of an audio attachment.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AudioBlob {
    data: String,
    size: usize,
    mime_type: String,
}

struct LogState {
    entries: Vec<CryInstance>,
    /// Bumped by `clear()`; blob jobs from an older generation are discarded.
    generation: u64,
}

struct Shared {
    storage: Arc<dyn StoragePort>,
    config: StoreConfig,
    state: Mutex<LogState>,
    metrics: Option<Arc<MetricsRegistry>>,
}

struct BlobJob {
    id: String,
    bytes: Vec<u8>,
    mime_type: String,
    generation: u64,
    reply: oneshot::Sender<Result<(), StoreError>>,
}

/// Outcome of one background blob write.
#[derive(Debug)]
pub struct BlobReceipt {
    id: String,
    rx: oneshot::Receiver<Result<(), StoreError>>,
}

impl BlobReceipt {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Block until the blob write finishes. Do not call from an async context.
    pub fn wait(self) -> Result<(), StoreError> {
        self.rx.blocking_recv().unwrap_or(Err(StoreError::WriterClosed))
    }

    pub async fn outcome(self) -> Result<(), StoreError> {
        self.rx.await.unwrap_or(Err(StoreError::WriterClosed))
    }
}

pub struct HistoryStore {
    shared: Arc<Shared>,
    tx: Option<mpsc::UnboundedSender<BlobJob>>,
    writer: Option<JoinHandle<()>>,
}

impl HistoryStore {
    /// Load the log from `storage` and start the blob writer.
    /// A missing or unreadable log starts empty.
    pub fn open(storage: Arc<dyn StoragePort>, config: StoreConfig) -> Result<Self, StoreError> {
        Self::start(storage, config, None)
    }

    /// Like [`HistoryStore::open`], recording blob write timings and failures in `metrics`.
    pub fn with_metrics(
        storage: Arc<dyn StoragePort>,
        config: StoreConfig,
        metrics: Arc<MetricsRegistry>,
    ) -> Result<Self, StoreError> {
        Self::start(storage, config, Some(metrics))
    }

    fn start(
        storage: Arc<dyn StoragePort>,
        config: StoreConfig,
        metrics: Option<Arc<MetricsRegistry>>,
    ) -> Result<Self, StoreError> {
        let entries = load_log(storage.as_ref(), &config.history_key);
        info!(entries = entries.len(), max = config.max_entries, "history store opened");

        let shared = Arc::new(Shared {
            storage,
            config,
            state: Mutex::new(LogState {
                entries,
                generation: 0,
            }),
            metrics,
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let worker_shared = Arc::clone(&shared);
        let writer = std::thread::Builder::new()
            .name("blob-writer".into())
            .spawn(move || blob_writer_loop(rx, worker_shared))
            .map_err(|e| StoreError::Storage(e.into()))?;

        Ok(Self {
            shared,
            tx: Some(tx),
            writer: Some(writer),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    /// Append to the log, evicting the oldest entries past the cap.
    pub fn append(&self, instance: CryInstance) -> Result<(), StoreError> {
        self.append_locked(instance).map(|_| ())
    }

    /// Append, then queue `bytes` as the entry's audio attachment.
    /// The metadata is committed before this returns; the receipt reports the blob.
    pub fn append_with_audio(
        &self,
        mut instance: CryInstance,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<BlobReceipt, StoreError> {
        let id = instance.id.clone();
        instance.audio_reference = Some(id.clone());
        let generation = self.append_locked(instance)?;

        let (reply, rx) = oneshot::channel();
        let job = BlobJob {
            id: id.clone(),
            bytes,
            mime_type: mime_type.to_string(),
            generation,
            reply,
        };
        let queued = match &self.tx {
            Some(tx) => tx.send(job).map_err(|e| e.0),
            None => Err(job),
        };
        if let Err(job) = queued {
            warn!(id = %id, "blob writer closed, audio not stored");
            let _ = job.reply.send(Err(StoreError::WriterClosed));
        }
        Ok(BlobReceipt { id, rx })
    }

    /// Returns the generation the entry was committed under.
    fn append_locked(&self, instance: CryInstance) -> Result<u64, StoreError> {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        let id = instance.id.clone();

        state.entries.push(instance);
        let excess = state.entries.len().saturating_sub(shared.config.max_entries);
        let evicted: Vec<CryInstance> = state.entries.drain(..excess).collect();

        if let Err(e) = shared.persist(&state.entries) {
            state.entries.pop();
            let kept = std::mem::take(&mut state.entries);
            state.entries = evicted.into_iter().chain(kept).collect();
            warn!(id = %id, error = %e, "history append failed");
            return Err(e);
        }

        for entry in &evicted {
            shared.remove_audio(entry);
        }
        debug!(id = %id, entries = state.entries.len(), evicted = evicted.len(), "history_appended");
        Ok(state.generation)
    }

    /// Decoded audio attachment for `id`, or `None` if absent or corrupt.
    pub fn get_audio(&self, id: &str) -> Option<Vec<u8>> {
        let key = self.shared.audio_key(id);
        let raw = match self.shared.storage.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(id, error = %e, "audio read failed");
                return None;
            }
        };
        let blob: AudioBlob = match serde_json::from_slice(&raw) {
            Ok(blob) => blob,
            Err(e) => {
                warn!(id, error = %e, "audio blob corrupt");
                return None;
            }
        };
        match BASE64.decode(blob.data.as_bytes()) {
            Ok(bytes) if bytes.len() == blob.size => Some(bytes),
            Ok(bytes) => {
                warn!(id, expected = blob.size, actual = bytes.len(), "audio blob size mismatch");
                None
            }
            Err(e) => {
                warn!(id, error = %e, "audio blob undecodable");
                None
            }
        }
    }

    /// All entries, oldest first.
    pub fn get_all(&self) -> Vec<CryInstance> {
        self.shared.state.lock().entries.clone()
    }

    pub fn get(&self, id: &str) -> Option<CryInstance> {
        self.shared
            .state
            .lock()
            .entries
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    /// Up to `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<CryInstance> {
        self.shared
            .state
            .lock()
            .entries
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop entries (and their audio) older than `max_age`. Returns how many were removed.
    pub fn prune_older_than(&self, max_age: chrono::Duration) -> Result<usize, StoreError> {
        let shared = &self.shared;
        let cutoff = Utc::now() - max_age;
        let mut state = shared.state.lock();

        let (expired, kept): (Vec<CryInstance>, Vec<CryInstance>) = state
            .entries
            .iter()
            .cloned()
            .partition(|e| e.timestamp < cutoff);
        if expired.is_empty() {
            return Ok(0);
        }

        shared.persist(&kept)?;
        state.entries = kept;
        for entry in &expired {
            shared.remove_audio(entry);
        }
        info!(removed = expired.len(), "history pruned");
        Ok(expired.len())
    }

    /// Remove every entry and every audio blob. Blob writes still queued are discarded.
    pub fn clear(&self) -> Result<(), StoreError> {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        state.generation += 1;
        state.entries.clear();

        let mut first_error = None;
        if let Err(e) = shared.storage.remove(&shared.config.history_key) {
            first_error.get_or_insert(StoreError::from(e));
        }
        match shared.storage.keys() {
            Ok(keys) => {
                for key in keys.iter().filter(|k| k.starts_with(&shared.config.audio_key_prefix)) {
                    if let Err(e) = shared.storage.remove(key) {
                        warn!(key = %key, error = %e, "audio remove failed");
                        first_error.get_or_insert(StoreError::from(e));
                    }
                }
            }
            Err(e) => {
                first_error.get_or_insert(StoreError::from(e));
            }
        }

        info!(generation = state.generation, "history cleared");
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for HistoryStore {
    fn drop(&mut self) {
        // Closing the channel lets the writer drain queued jobs and exit.
        self.tx.take();
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                warn!("blob writer thread panicked");
            }
        }
    }
}

impl Shared {
    fn audio_key(&self, id: &str) -> String {
        format!("{}{}", self.config.audio_key_prefix, id)
    }

    fn persist(&self, entries: &[CryInstance]) -> Result<(), StoreError> {
        let json = serde_json::to_vec(entries)?;
        self.storage.set(&self.config.history_key, &json)?;
        Ok(())
    }

    fn remove_audio(&self, entry: &CryInstance) {
        if let Some(reference) = &entry.audio_reference {
            if let Err(e) = self.storage.remove(&self.audio_key(reference)) {
                warn!(id = %entry.id, error = %e, "evicted audio remove failed");
            }
        }
    }

    /// Whether `job`'s entry is still in the log of the generation it was queued in.
    fn check_live(&self, job: &BlobJob) -> Result<(), StoreError> {
        let state = self.state.lock();
        if state.generation != job.generation {
            return Err(StoreError::Cleared { id: job.id.clone() });
        }
        if !state.entries.iter().any(|e| e.id == job.id) {
            return Err(StoreError::Evicted { id: job.id.clone() });
        }
        Ok(())
    }

    /// Writes without holding the log mutex. A `clear()` or eviction that lands
    /// during the write is caught by the second check and the blob is removed.
    fn write_blob(&self, job: &BlobJob) -> Result<(), StoreError> {
        let blob = AudioBlob {
            data: BASE64.encode(&job.bytes),
            size: job.bytes.len(),
            mime_type: job.mime_type.clone(),
        };
        let payload = serde_json::to_vec(&blob)?;
        let key = self.audio_key(&job.id);

        self.check_live(job)?;
        self.storage.set(&key, &payload)?;
        if let Err(stale) = self.check_live(job) {
            if let Err(e) = self.storage.remove(&key) {
                warn!(id = %job.id, error = %e, "stale audio remove failed");
            }
            return Err(stale);
        }
        Ok(())
    }
}

fn load_log(storage: &dyn StoragePort, key: &str) -> Vec<CryInstance> {
    match storage.get(key) {
        Ok(Some(raw)) => serde_json::from_slice(&raw).unwrap_or_else(|e| {
            warn!(error = %e, "history log corrupt, starting empty");
            Vec::new()
        }),
        Ok(None) => Vec::new(),
        Err(e) => {
            warn!(error = %e, "history log unreadable, starting empty");
            Vec::new()
        }
    }
}

fn blob_writer_loop(mut rx: mpsc::UnboundedReceiver<BlobJob>, shared: Arc<Shared>) {
    info!("blob writer started");
    while let Some(job) = rx.blocking_recv() {
        let start = std::time::Instant::now();
        let outcome = shared.write_blob(&job);
        let elapsed = start.elapsed();

        match &outcome {
            Ok(()) => {
                if let Some(metrics) = &shared.metrics {
                    metrics.record(Stage::BlobPersist, elapsed);
                }
                debug!(
                    id = %job.id,
                    bytes = job.bytes.len(),
                    elapsed_us = elapsed.as_micros() as u64,
                    "audio_blob_stored"
                );
            }
            Err(e) => {
                if let Some(metrics) = &shared.metrics {
                    metrics.incr(Counter::BlobFailures);
                }
                warn!(id = %job.id, error = %e, "audio blob not stored");
            }
        }
        // The caller may have dropped its receipt.
        let _ = job.reply.send(outcome);
    }
    info!("blob writer exiting (channel closed)");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AudioFeatures, DetectionResult, Diagnosis, MedicalAttention};

    fn instance() -> CryInstance {
        let mut features = AudioFeatures::empty(44100);
        features.duration = 1.5;
        features.f0_mean = 450.0;
        let diagnosis = Diagnosis {
            primary: "Normal Cry".into(),
            description: String::new(),
            recommendations: vec![],
            medical_attention: MedicalAttention::None,
            confidence: 0.8,
            tags: vec!["normal".into(), "healthy".into()],
        };
        CryInstance::new(DetectionResult::new(features, vec![]), diagnosis)
    }

    fn memory_store(config: StoreConfig) -> (HistoryStore, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let store = HistoryStore::open(storage.clone(), config).unwrap();
        (store, storage)
    }

    #[test]
    fn test_append_preserves_order() {
        let (store, _) = memory_store(StoreConfig::default());
        let a = instance();
        let b = instance();
        store.append(a.clone()).unwrap();
        store.append(b.clone()).unwrap();

        let all = store.get_all();
        assert_eq!(all, vec![a.clone(), b.clone()]);
        assert_eq!(store.recent(1), vec![b]);
        assert_eq!(store.get(&a.id), Some(a));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_cap_evicts_oldest() {
        let (store, _) = memory_store(StoreConfig::default());
        let first = instance();
        store.append(first.clone()).unwrap();
        for _ in 0..1000 {
            store.append(instance()).unwrap();
        }
        assert_eq!(store.len(), 1000);
        assert!(store.get(&first.id).is_none());
    }

    #[test]
    fn test_log_persists_across_open() {
        let storage: Arc<dyn StoragePort> = Arc::new(MemoryStorage::new());
        let entry = instance();
        {
            let store = HistoryStore::open(Arc::clone(&storage), StoreConfig::default()).unwrap();
            store.append(entry.clone()).unwrap();
        }
        let store = HistoryStore::open(storage, StoreConfig::default()).unwrap();
        assert_eq!(store.get_all(), vec![entry]);
    }

    #[test]
    fn test_corrupt_log_loads_empty() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set("cry_history", b"{not json").unwrap();
        let store = HistoryStore::open(storage, StoreConfig::default()).unwrap();
        assert!(store.is_empty());
        store.append(instance()).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_audio_round_trip() {
        let (store, storage) = memory_store(StoreConfig::default());
        let entry = instance();
        let bytes: Vec<u8> = (0..=255).collect();
        let receipt = store.append_with_audio(entry.clone(), bytes.clone(), "audio/wav").unwrap();
        assert_eq!(receipt.id(), entry.id);
        receipt.wait().unwrap();

        assert_eq!(store.get_audio(&entry.id), Some(bytes));
        assert_eq!(store.get(&entry.id).unwrap().audio_reference, Some(entry.id.clone()));

        let raw = storage.get(&format!("cry_audio_{}", entry.id)).unwrap().unwrap();
        let blob: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(blob["size"], 256);
        assert_eq!(blob["mimeType"], "audio/wav");
    }

    #[test]
    fn test_missing_and_corrupt_audio_is_absent() {
        let (store, storage) = memory_store(StoreConfig::default());
        assert_eq!(store.get_audio("nope"), None);

        storage.set("cry_audio_bad", br#"{"data":"!!!","size":3,"mimeType":"audio/wav"}"#).unwrap();
        assert_eq!(store.get_audio("bad"), None);

        storage.set("cry_audio_short", br#"{"data":"AAE=","size":5,"mimeType":"audio/wav"}"#).unwrap();
        assert_eq!(store.get_audio("short"), None);
    }

    #[test]
    fn test_blob_quota_failure_keeps_metadata() {
        let storage = Arc::new(MemoryStorage::with_quota(16 * 1024));
        let store = HistoryStore::open(storage, StoreConfig::default()).unwrap();
        let entry = instance();

        let receipt = store.append_with_audio(entry.clone(), vec![7u8; 64 * 1024], "audio/wav").unwrap();
        let err = receipt.wait().unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)), "{err}");

        let all = store.get_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, entry.id);
        assert_eq!(store.get_audio(&entry.id), None);
    }

    #[test]
    fn test_metadata_failure_rolls_back() {
        let storage = Arc::new(MemoryStorage::new());
        let store = HistoryStore::open(storage.clone(), StoreConfig::default()).unwrap();
        store.append(instance()).unwrap();

        storage.set_quota(Some(10));
        assert!(store.append(instance()).is_err());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_eviction_removes_audio() {
        let config = StoreConfig {
            max_entries: 2,
            ..StoreConfig::default()
        };
        let (store, storage) = memory_store(config);
        let first = instance();
        store.append_with_audio(first.clone(), vec![1, 2, 3], "audio/wav").unwrap().wait().unwrap();
        store.append(instance()).unwrap();
        store.append(instance()).unwrap();

        assert!(store.get(&first.id).is_none());
        assert_eq!(storage.get(&format!("cry_audio_{}", first.id)).unwrap(), None);
    }

    #[test]
    fn test_clear_removes_everything() {
        let (store, storage) = memory_store(StoreConfig::default());
        for _ in 0..3 {
            store.append_with_audio(instance(), vec![9; 32], "audio/wav").unwrap().wait().unwrap();
        }
        storage.set("unrelated", b"keep").unwrap();

        store.clear().unwrap();
        assert!(store.get_all().is_empty());
        let mut keys = storage.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["unrelated"]);
    }

    #[test]
    fn test_clear_discards_stale_blob_job() {
        let (store, storage) = memory_store(StoreConfig::default());
        let entry = instance();
        store.append(entry.clone()).unwrap();
        let generation = store.shared.state.lock().generation;
        store.clear().unwrap();

        let (reply, _rx) = oneshot::channel();
        let job = BlobJob {
            id: entry.id.clone(),
            bytes: vec![5; 128],
            mime_type: "audio/wav".into(),
            generation,
            reply,
        };
        let err = store.shared.write_blob(&job).unwrap_err();
        assert!(matches!(err, StoreError::Cleared { .. }));
        assert_eq!(storage.get(&format!("cry_audio_{}", entry.id)).unwrap(), None);
    }

    #[test]
    fn test_clear_while_blob_queued() {
        let (store, storage) = memory_store(StoreConfig::default());
        let entry = instance();
        let receipt = store.append_with_audio(entry.clone(), vec![5; 128], "audio/wav").unwrap();
        store.clear().unwrap();
        // Either order of writer and clear leaves no audio behind.
        let _ = receipt.wait();
        assert_eq!(storage.get(&format!("cry_audio_{}", entry.id)).unwrap(), None);
        assert_eq!(store.get_audio(&entry.id), None);
    }

    #[test]
    fn test_prune_older_than() {
        let (store, storage) = memory_store(StoreConfig::default());
        let mut old = instance();
        old.timestamp = Utc::now() - chrono::Duration::days(40);
        let fresh = instance();
        store.append_with_audio(old.clone(), vec![1], "audio/wav").unwrap().wait().unwrap();
        store.append(fresh.clone()).unwrap();

        assert_eq!(store.prune_older_than(chrono::Duration::days(30)).unwrap(), 1);
        assert_eq!(store.get_all(), vec![fresh]);
        assert_eq!(storage.get(&format!("cry_audio_{}", old.id)).unwrap(), None);
        assert_eq!(store.prune_older_than(chrono::Duration::days(30)).unwrap(), 0);
    }

    #[test]
    fn test_sqlite_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");
        let entry = instance();
        {
            let storage = Arc::new(SqliteStorage::open(&path).unwrap());
            let store = HistoryStore::open(storage, StoreConfig::default()).unwrap();
            store.append_with_audio(entry.clone(), vec![4; 64], "audio/wav").unwrap().wait().unwrap();
        }
        let storage = Arc::new(SqliteStorage::open(&path).unwrap());
        let store = HistoryStore::open(storage, StoreConfig::default()).unwrap();
        let mut expected = entry.clone();
        expected.audio_reference = Some(entry.id.clone());
        assert_eq!(store.get_all(), vec![expected]);
        assert_eq!(store.get_audio(&entry.id), Some(vec![4; 64]));
    }

    #[tokio::test]
    async fn test_receipt_outcome_async() {
        let metrics = Arc::new(MetricsRegistry::new());
        let store = HistoryStore::with_metrics(
            Arc::new(MemoryStorage::new()),
            StoreConfig::default(),
            Arc::clone(&metrics),
        )
        .unwrap();
        let entry = instance();
        store
            .append_with_audio(entry.clone(), vec![3; 16], "audio/wav")
            .unwrap()
            .outcome()
            .await
            .unwrap();
        assert_eq!(store.get_audio(&entry.id), Some(vec![3; 16]));
        assert_eq!(metrics.recorded(Stage::BlobPersist), 1);
        assert_eq!(metrics.counter(Counter::BlobFailures), 0);
    }

    #[test]
    fn test_blob_failure_is_counted() {
        let metrics = Arc::new(MetricsRegistry::new());
        let storage = Arc::new(MemoryStorage::with_quota(16 * 1024));
        let store = HistoryStore::with_metrics(storage, StoreConfig::default(), Arc::clone(&metrics)).unwrap();
        let receipt = store.append_with_audio(instance(), vec![7u8; 64 * 1024], "audio/wav").unwrap();
        assert!(receipt.wait().is_err());
        assert_eq!(metrics.counter(Counter::BlobFailures), 1);
        assert_eq!(metrics.recorded(Stage::BlobPersist), 0);
    }

    #[test]
    fn test_concurrent_appends_respect_cap() {
        let config = StoreConfig {
            max_entries: 25,
            ..StoreConfig::default()
        };
        let storage = Arc::new(MemoryStorage::new());
        let store = HistoryStore::open(storage.clone(), config.clone()).unwrap();

        std::thread::scope(|s| {
            for worker in 0..8 {
                let store = &store;
                s.spawn(move || {
                    for _ in 0..20 {
                        if worker % 2 == 0 {
                            store.append(instance()).unwrap();
                        } else {
                            let receipt = store.append_with_audio(instance(), vec![1; 32], "audio/wav").unwrap();
                            // Another thread may evict the entry before its audio lands.
                            match receipt.wait() {
                                Ok(()) | Err(StoreError::Evicted { .. }) => {}
                                Err(e) => panic!("blob write failed: {e}"),
                            }
                        }
                    }
                });
            }
        });

        let all = store.get_all();
        assert_eq!(all.len(), 25);
        let ids: std::collections::HashSet<&str> = all.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids.len(), 25);

        // No audio outlives its entry.
        for key in storage.keys().unwrap() {
            if let Some(id) = key.strip_prefix("cry_audio_") {
                assert!(ids.contains(id), "orphaned audio {id}");
            }
        }

        drop(store);
        let reopened = HistoryStore::open(storage, config).unwrap();
        assert_eq!(reopened.get_all(), all);
    }

    /// Holds every audio write until the test lets it through.
    struct GatedStorage {
        inner: MemoryStorage,
        entered: crossbeam_channel::Sender<()>,
        release: crossbeam_channel::Receiver<()>,
    }

    impl StoragePort for GatedStorage {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>, crate::error::StorageError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &[u8]) -> Result<(), crate::error::StorageError> {
            if key.starts_with("cry_audio_") {
                let _ = self.entered.send(());
                let _ = self.release.recv();
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), crate::error::StorageError> {
            self.inner.remove(key)
        }

        fn keys(&self) -> Result<Vec<String>, crate::error::StorageError> {
            self.inner.keys()
        }
    }

    fn gated_store() -> (
        HistoryStore,
        Arc<GatedStorage>,
        crossbeam_channel::Receiver<()>,
        crossbeam_channel::Sender<()>,
    ) {
        let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
        let (release_tx, release_rx) = crossbeam_channel::unbounded();
        let storage = Arc::new(GatedStorage {
            inner: MemoryStorage::new(),
            entered: entered_tx,
            release: release_rx,
        });
        let store = HistoryStore::open(storage.clone(), StoreConfig::default()).unwrap();
        (store, storage, entered_rx, release_tx)
    }

    #[test]
    fn test_log_usable_during_blob_write() {
        let (store, _storage, entered, release) = gated_store();
        let receipt = store.append_with_audio(instance(), vec![2; 64], "audio/wav").unwrap();
        entered.recv_timeout(std::time::Duration::from_secs(5)).unwrap();

        // The writer is inside storage.set; the log must not be locked by it.
        store.append(instance()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.recent(1).len(), 1);

        release.send(()).unwrap();
        receipt.wait().unwrap();
    }

    #[test]
    fn test_clear_during_blob_write_removes_blob() {
        let (store, storage, entered, release) = gated_store();
        let entry = instance();
        let receipt = store.append_with_audio(entry.clone(), vec![2; 64], "audio/wav").unwrap();
        entered.recv_timeout(std::time::Duration::from_secs(5)).unwrap();

        store.clear().unwrap();
        release.send(()).unwrap();

        let err = receipt.wait().unwrap_err();
        assert!(matches!(err, StoreError::Cleared { .. }), "{err}");
        assert_eq!(storage.get(&format!("cry_audio_{}", entry.id)).unwrap(), None);
        assert!(store.is_empty());
    }
}
