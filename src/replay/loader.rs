// src/replay/loader.rs
//! Fetch, verify and decrypt a persisted recording

use crate::crypto::keystore::KeyStore;
use crate::replay::timeline::ReplayEvent;
use crate::storage::record::{EncryptedEventRecord, SessionRecord, StoredSession};
use crate::storage::store::SessionStore;
use crate::utils::errors::Result;
use std::sync::Arc;
use tracing::{info, warn};

/// A recording decoded for playback
#[derive(Debug, Clone)]
pub struct LoadedRecording {
    pub session: SessionRecord,
    pub events: Vec<ReplayEvent>,
    /// Records that failed integrity, decryption or decoding
    pub skipped: usize,
    /// Raw records as stored, kept for archive export
    pub records: Vec<EncryptedEventRecord>,
}

pub struct RecordingLoader {
    store: Arc<dyn SessionStore>,
    keys: Arc<KeyStore>,
}

impl RecordingLoader {
    pub fn new(store: Arc<dyn SessionStore>, keys: Arc<KeyStore>) -> Self {
        Self { store, keys }
    }

    pub async fn load(&self, session_id: &str) -> Result<LoadedRecording> {
        let stored = self.store.fetch_session(session_id).await?;
        self.decode(stored)
    }

    /// Decrypt every record; bad records are logged and skipped
    pub fn decode(&self, stored: StoredSession) -> Result<LoadedRecording> {
        let StoredSession { session, events: records } = stored;
        let key = self.keys.get(&session.id)?;

        let mut events = Vec::with_capacity(records.len());
        let mut skipped = 0;

        for record in &records {
            let Some(kind) = record.kind() else {
                warn!("Skipping event {}: unknown type {:?}", record.event_id, record.event_type);
                skipped += 1;
                continue;
            };
            match record.open(&key) {
                Ok(body) => events.push(ReplayEvent {
                    sequence: record.sequence_number,
                    timestamp_ms: record.timestamp_ms,
                    kind,
                    payload: body.payload,
                    modifiers: body.modifiers,
                    target: record.target_element.clone(),
                }),
                Err(e) => {
                    warn!("Skipping event {}: {}", record.event_id, e);
                    skipped += 1;
                }
            }
        }

        info!(
            "Loaded recording {}: {} events, {} skipped",
            session.id,
            events.len(),
            skipped
        );

        Ok(LoadedRecording {
            session,
            events,
            skipped,
            records,
        })
    }
}
