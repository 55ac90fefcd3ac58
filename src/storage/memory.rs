// src/storage/memory.rs
//! In-memory session store
//!
//! Used for tests and local development. Append failures can be injected to
//! exercise the pipeline's retry path.

use crate::storage::record::{
    EncryptedEventRecord, FinalStats, SessionMetadata, SessionRecord, SessionStatus, StoredSession,
};
use crate::storage::store::{prepare_append, LogHead, SessionStore};
use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;
use ulid::Ulid;

struct MemorySession {
    record: SessionRecord,
    events: Vec<EncryptedEventRecord>,
    event_ids: HashSet<String>,
}

/// Session store held in process memory
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, MemorySession>>,
    fail_appends: AtomicBool,
    fail_completes: AtomicBool,
    append_attempts: AtomicU64,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent append fail with a transient error
    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent completion fail
    pub fn set_fail_completes(&self, fail: bool) {
        self.fail_completes.store(fail, Ordering::SeqCst);
    }

    /// Number of `append_events` calls received, successful or not
    pub fn append_attempts(&self) -> u64 {
        self.append_attempts.load(Ordering::SeqCst)
    }

    /// Number of events stored for a session
    pub fn event_count(&self, session_id: &str) -> usize {
        self.sessions
            .lock()
            .get(session_id)
            .map(|s| s.events.len())
            .unwrap_or(0)
    }

    /// Replace a stored event (tests simulate corruption with this)
    pub fn overwrite_event(&self, session_id: &str, record: EncryptedEventRecord) -> bool {
        let mut sessions = self.sessions.lock();
        let Some(session) = sessions.get_mut(session_id) else {
            return false;
        };
        match session
            .events
            .iter_mut()
            .find(|e| e.event_id == record.event_id)
        {
            Some(slot) => {
                *slot = record;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(&self, metadata: &SessionMetadata) -> Result<String> {
        let id = Ulid::new().to_string();
        self.sessions.lock().insert(
            id.clone(),
            MemorySession {
                record: SessionRecord::new(id.clone(), metadata.clone()),
                events: Vec::new(),
                event_ids: HashSet::new(),
            },
        );
        debug!("Created in-memory session {}", id);
        Ok(id)
    }

    async fn append_events(&self, session_id: &str, batch: &[EncryptedEventRecord]) -> Result<()> {
        self.append_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(EngineError::UploadFailed("injected append failure".into()));
        }

        let mut sessions = self.sessions.lock();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| EngineError::RecordingNotFound(session_id.to_string()))?;

        if session.record.status == SessionStatus::Completed {
            return Err(EngineError::LogViolation(format!(
                "session {} is completed",
                session_id
            )));
        }

        let head = session.events.last().map(|e| LogHead {
            sequence: e.sequence_number,
            timestamp_ms: e.timestamp_ms,
        });
        let accepted = prepare_append(head, |id| Ok(session.event_ids.contains(id)), batch)?;
        let accepted: Vec<EncryptedEventRecord> = accepted.into_iter().cloned().collect();

        for record in accepted {
            session.event_ids.insert(record.event_id.clone());
            session.events.push(record);
        }
        session.record.event_count = session.events.len() as u64;
        Ok(())
    }

    async fn complete_session(&self, session_id: &str, stats: &FinalStats) -> Result<()> {
        if self.fail_completes.load(Ordering::SeqCst) {
            return Err(EngineError::UploadFailed("injected completion failure".into()));
        }

        let mut sessions = self.sessions.lock();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| EngineError::RecordingNotFound(session_id.to_string()))?;

        if session.record.status == SessionStatus::Completed {
            return Err(EngineError::LogViolation(format!(
                "session {} already completed",
                session_id
            )));
        }

        session.record.status = SessionStatus::Completed;
        session.record.ended_at = Some(stats.ended_at);
        session.record.metrics = Some(stats.metrics.clone());
        Ok(())
    }

    async fn fetch_session(&self, session_id: &str) -> Result<StoredSession> {
        let sessions = self.sessions.lock();
        let session = sessions
            .get(session_id)
            .ok_or_else(|| EngineError::RecordingNotFound(session_id.to_string()))?;

        Ok(StoredSession {
            session: session.record.clone(),
            events: session.events.clone(),
        })
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.sessions
            .lock()
            .remove(session_id)
            .map(|_| ())
            .ok_or_else(|| EngineError::RecordingNotFound(session_id.to_string()))
    }

    async fn list_sessions(&self, owner_id: Option<&str>) -> Result<Vec<SessionRecord>> {
        let sessions = self.sessions.lock();
        let mut records: Vec<SessionRecord> = sessions
            .values()
            .filter(|s| owner_id.map_or(true, |o| s.record.metadata.owner_id == o))
            .map(|s| s.record.clone())
            .collect();
        records.sort_by(|a, b| a.metadata.started_at.cmp(&b.metadata.started_at));
        Ok(records)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let mut sessions = self.sessions.lock();
        let expired: Vec<String> = sessions
            .values()
            .filter(|s| s.record.is_expired(now))
            .map(|s| s.record.id.clone())
            .collect();
        for id in &expired {
            sessions.remove(id);
        }
        Ok(expired)
    }
}
