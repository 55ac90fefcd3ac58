// src/storage/pipeline.rs
//! Encrypted batch upload pipeline
//!
//! Owns the remote session lifecycle. Events are queued without blocking,
//! drained by one background uploader per session, sealed one by one with
//! the session key and appended to the store with bounded retry.

use crate::crypto::cipher::SessionCipher;
use crate::crypto::keystore::KeyStore;
use crate::recording::event::KeystrokeEvent;
use crate::recording::privacy::{apply_privacy, PrivacyTier};
use crate::storage::event_queue::{PendingQueue, QueueStats};
use crate::storage::record::{EncryptedEventRecord, FinalStats, SessionMetadata};
use crate::storage::retry::{retry_with_backoff, RetryPolicy};
use crate::storage::store::SessionStore;
use crate::utils::errors::{EngineError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use ulid::Ulid;

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Events per upload batch; reaching it wakes the uploader early
    pub batch_size: usize,

    /// Periodic upload interval (milliseconds)
    pub upload_interval_ms: u64,

    /// Attempts per batch, including the first
    pub max_retries: u32,

    /// Retry delay unit: the n-th retry waits `n × base_delay_ms`
    pub base_delay_ms: u64,

    /// Bound on the final flush and on the completion request at stop
    pub final_flush_timeout_ms: u64,

    /// Pending queue capacity
    pub max_pending_events: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            upload_interval_ms: 5_000,
            max_retries: 3,
            base_delay_ms: 1_000,
            final_flush_timeout_ms: 5_000,
            max_pending_events: 10_000,
        }
    }
}

impl PipelineConfig {
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.base_delay_ms))
    }
}

/// Upload counters for one session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStatus {
    pub session_id: String,
    /// Pending queue occupancy and throughput
    pub queue: QueueStats,
    pub events_queued: u64,
    pub events_uploaded: u64,
    pub events_dropped: u64,
    pub batches_uploaded: u64,
    pub batches_failed: u64,
    pub upload_attempts: u64,
    pub last_error: Option<String>,
}

/// Result of stopping an upload session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReport {
    pub status: UploadStatus,
    /// Whether the final flush finished inside its time bound
    pub flushed: bool,
    /// Whether the store acknowledged the completion request
    pub completed: bool,
}

#[derive(Default)]
struct UploadCounters {
    events_queued: AtomicU64,
    events_uploaded: AtomicU64,
    events_dropped: AtomicU64,
    batches_uploaded: AtomicU64,
    batches_failed: AtomicU64,
    upload_attempts: AtomicU64,
    /// Events of the batch currently being sent
    in_flight: AtomicU64,
    last_error: Mutex<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Free,
    Starting,
    Active(String),
}

/// Entry point for remote sessions; at most one is active at a time
pub struct StoragePipeline {
    store: Arc<dyn SessionStore>,
    keys: Arc<KeyStore>,
    config: PipelineConfig,
    slot: Arc<Mutex<Slot>>,
}

impl StoragePipeline {
    pub fn new(store: Arc<dyn SessionStore>, keys: Arc<KeyStore>, config: PipelineConfig) -> Self {
        Self {
            store,
            keys,
            config,
            slot: Arc::new(Mutex::new(Slot::Free)),
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Id of the session currently uploading, if any
    pub fn active_session(&self) -> Option<String> {
        match &*self.slot.lock() {
            Slot::Active(id) => Some(id.clone()),
            _ => None,
        }
    }

    /// Open a remote session and start its uploader
    pub async fn start_recording(&self, metadata: SessionMetadata) -> Result<ActiveUpload> {
        {
            let mut slot = self.slot.lock();
            match &*slot {
                Slot::Free => *slot = Slot::Starting,
                Slot::Starting => {
                    return Err(EngineError::SessionAlreadyActive("starting".into()));
                }
                Slot::Active(id) => return Err(EngineError::SessionAlreadyActive(id.clone())),
            }
        }

        match self.open_session(&metadata).await {
            Ok((session_id, cipher)) => {
                *self.slot.lock() = Slot::Active(session_id.clone());
                info!("Upload session {} started", session_id);
                metrics::counter!("keytrace_sessions_started_total").increment(1);
                Ok(ActiveUpload::spawn(
                    session_id,
                    cipher,
                    metadata.privacy_tier,
                    Arc::clone(&self.store),
                    Arc::clone(&self.slot),
                    &self.config,
                ))
            }
            Err(e) => {
                *self.slot.lock() = Slot::Free;
                Err(e)
            }
        }
    }

    async fn open_session(&self, metadata: &SessionMetadata) -> Result<(String, SessionCipher)> {
        let session_id = self.store.create_session(metadata).await?;

        let cipher = SessionCipher::new();
        if let Err(e) = self.keys.put(&session_id, cipher.session_key()) {
            // Without a stored key the session could never be replayed
            if let Err(cleanup) = self.store.delete_session(&session_id).await {
                warn!("Failed to remove orphaned session {}: {}", session_id, cleanup);
            }
            return Err(e.into());
        }

        Ok((session_id, cipher))
    }
}

struct UploadShared {
    session_id: String,
    tier: PrivacyTier,
    queue: PendingQueue,
    notify: Notify,
    counters: UploadCounters,
    cipher: SessionCipher,
    store: Arc<dyn SessionStore>,
    policy: RetryPolicy,
    batch_size: usize,
    cancel: CancellationToken,
}

/// Handle to a session that is uploading
pub struct ActiveUpload {
    shared: Arc<UploadShared>,
    worker: Option<JoinHandle<()>>,
    slot: Arc<Mutex<Slot>>,
    final_flush_timeout: Duration,
}

impl ActiveUpload {
    fn spawn(
        session_id: String,
        cipher: SessionCipher,
        tier: PrivacyTier,
        store: Arc<dyn SessionStore>,
        slot: Arc<Mutex<Slot>>,
        config: &PipelineConfig,
    ) -> Self {
        let shared = Arc::new(UploadShared {
            session_id,
            tier,
            queue: PendingQueue::new(config.max_pending_events),
            notify: Notify::new(),
            counters: UploadCounters::default(),
            cipher,
            store,
            policy: config.retry_policy(),
            batch_size: config.batch_size.max(1),
            cancel: CancellationToken::new(),
        });

        let interval = Duration::from_millis(config.upload_interval_ms.max(1));
        let worker = tokio::spawn(run_uploader(Arc::clone(&shared), interval));

        Self {
            shared,
            worker: Some(worker),
            slot,
            final_flush_timeout: Duration::from_millis(config.final_flush_timeout_ms),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    /// Queue an event for upload (non-blocking, never fails)
    pub fn add_event(&self, event: KeystrokeEvent) {
        let shared = &self.shared;
        let event = apply_privacy(event, shared.tier);

        match shared.queue.push(event) {
            Ok(()) => {
                shared.counters.events_queued.fetch_add(1, Ordering::Relaxed);
                if shared.queue.len() >= shared.batch_size {
                    shared.notify.notify_one();
                }
            }
            Err(event) => {
                shared.counters.events_dropped.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("keytrace_events_dropped_total").increment(1);
                warn!(
                    "Pending queue full, dropped event {} of session {}",
                    event.sequence, shared.session_id
                );
            }
        }
    }

    pub fn status(&self) -> UploadStatus {
        self.shared.status()
    }

    /// Cancel the timer, make a bounded final flush and complete the session
    ///
    /// Local state is torn down whatever the store answers.
    pub async fn stop(mut self, final_stats: &FinalStats) -> UploadReport {
        let shared = Arc::clone(&self.shared);
        shared.cancel.cancel();

        let flushed = {
            let worker = &mut self.worker;
            let flush = async {
                if let Some(handle) = worker.as_mut() {
                    if let Err(e) = handle.await {
                        warn!("Uploader task ended abnormally: {}", e);
                    }
                }
                shared.upload_pending().await;
            };
            tokio::time::timeout(self.final_flush_timeout, flush).await.is_ok()
        };

        if !flushed {
            if let Some(handle) = self.worker.take() {
                // A finished handle may already have been awaited by the flush
                if !handle.is_finished() {
                    handle.abort();
                    // Wait until the task is gone so it cannot count the batch itself
                    let _ = handle.await;
                }
            }
            let in_flight = shared.counters.in_flight.swap(0, Ordering::SeqCst);
            let abandoned = shared.queue.drain_batch(usize::MAX).len() as u64 + in_flight;
            shared.counters.events_dropped.fetch_add(abandoned, Ordering::Relaxed);
            metrics::counter!("keytrace_events_dropped_total").increment(abandoned);
            warn!(
                "Final flush of session {} timed out; {} events abandoned",
                shared.session_id, abandoned
            );
        }
        self.worker = None;

        let completed = match tokio::time::timeout(
            self.final_flush_timeout,
            shared.store.complete_session(&shared.session_id, final_stats),
        )
        .await
        {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                shared.record_error(&e);
                warn!("Failed to complete session {}: {}", shared.session_id, e);
                false
            }
            Err(_) => {
                warn!("Completing session {} timed out", shared.session_id);
                false
            }
        };

        let status = shared.status();
        info!(
            "Upload session {} stopped: {} uploaded, {} dropped",
            status.session_id, status.events_uploaded, status.events_dropped
        );

        UploadReport {
            status,
            flushed,
            completed,
        }
    }
}

impl Drop for ActiveUpload {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
        if let Some(handle) = self.worker.take() {
            handle.abort();
        }

        let mut slot = self.slot.lock();
        if *slot == Slot::Active(self.shared.session_id.clone()) {
            *slot = Slot::Free;
        }
    }
}

async fn run_uploader(shared: Arc<UploadShared>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            _ = ticker.tick() => {}
            _ = shared.notify.notified() => {}
        }
        let stats = shared.queue.stats();
        if stats.current_size > 0 {
            debug!(
                "Uploader woke for session {}: {} pending ({:.1}% full)",
                shared.session_id,
                stats.current_size,
                stats.fill_percentage()
            );
        }
        shared.upload_pending().await;
    }

    debug!("Uploader for session {} stopped", shared.session_id);
}

impl UploadShared {
    /// Upload everything currently queued, one batch at a time
    async fn upload_pending(&self) {
        loop {
            let batch = self.queue.drain_batch(self.batch_size);
            if batch.is_empty() {
                break;
            }
            self.upload_batch(batch).await;
        }
    }

    async fn upload_batch(&self, events: Vec<KeystrokeEvent>) {
        let batch_id = Ulid::new();
        let mut records = Vec::with_capacity(events.len());

        for event in &events {
            match EncryptedEventRecord::seal(event, &self.cipher) {
                Ok(record) => records.push(record),
                Err(e) => {
                    self.counters.events_dropped.fetch_add(1, Ordering::Relaxed);
                    self.record_error(&e);
                    warn!("Failed to seal event {}: {}", event.sequence, e);
                }
            }
        }
        if records.is_empty() {
            return;
        }

        let store = &self.store;
        let session_id = self.session_id.as_str();
        let batch = records.as_slice();
        let attempts = &self.counters.upload_attempts;
        let count = records.len() as u64;

        self.counters.in_flight.store(count, Ordering::SeqCst);
        let outcome = retry_with_backoff(&self.policy, &self.cancel, move |_| {
            attempts.fetch_add(1, Ordering::Relaxed);
            store.append_events(session_id, batch)
        })
        .await;
        self.counters.in_flight.store(0, Ordering::SeqCst);

        match outcome.result {
            Ok(()) => {
                self.counters.events_uploaded.fetch_add(count, Ordering::Relaxed);
                self.counters.batches_uploaded.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("keytrace_events_uploaded_total").increment(count);
                metrics::counter!("keytrace_batches_uploaded_total").increment(1);
                debug!(
                    "Batch {} uploaded: {} events in {} attempts",
                    batch_id, count, outcome.attempts
                );
            }
            Err(e) => {
                self.counters.events_dropped.fetch_add(count, Ordering::Relaxed);
                self.counters.batches_failed.fetch_add(1, Ordering::Relaxed);
                self.record_error(&e);
                metrics::counter!("keytrace_events_dropped_total").increment(count);
                metrics::counter!("keytrace_batches_failed_total").increment(1);
                error!(
                    "Batch {} dropped after {} attempts ({} events): {}",
                    batch_id, outcome.attempts, count, e
                );
            }
        }
    }

    fn record_error(&self, e: &EngineError) {
        *self.counters.last_error.lock() = Some(e.to_string());
    }

    fn status(&self) -> UploadStatus {
        let c = &self.counters;
        UploadStatus {
            session_id: self.session_id.clone(),
            queue: self.queue.stats(),
            events_queued: c.events_queued.load(Ordering::Relaxed),
            events_uploaded: c.events_uploaded.load(Ordering::Relaxed),
            events_dropped: c.events_dropped.load(Ordering::Relaxed),
            batches_uploaded: c.batches_uploaded.load(Ordering::Relaxed),
            batches_failed: c.batches_failed.load(Ordering::Relaxed),
            upload_attempts: c.upload_attempts.load(Ordering::Relaxed),
            last_error: c.last_error.lock().clone(),
        }
    }
}
