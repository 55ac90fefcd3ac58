// src/storage/store.rs
//! Session store interface
//!
//! The remote session API consumed by the storage pipeline and the playback
//! engine. Implementations: SQLite (local), in-memory, HTTP.

use crate::storage::record::{
    EncryptedEventRecord, FinalStats, SessionMetadata, SessionRecord, StoredSession,
};
use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session and return its id
    async fn create_session(&self, metadata: &SessionMetadata) -> Result<String>;

    /// Append a batch of encrypted events
    async fn append_events(&self, session_id: &str, batch: &[EncryptedEventRecord]) -> Result<()>;

    /// Mark a session complete with its final stats
    async fn complete_session(&self, session_id: &str, stats: &FinalStats) -> Result<()>;

    /// Session metadata plus events ordered by sequence number
    async fn fetch_session(&self, session_id: &str) -> Result<StoredSession>;

    async fn delete_session(&self, session_id: &str) -> Result<()>;

    async fn list_sessions(&self, owner_id: Option<&str>) -> Result<Vec<SessionRecord>>;

    /// Delete completed sessions past retention; returns their ids
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<String>>;
}

/// Position of the newest stored event in a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogHead {
    pub sequence: u64,
    pub timestamp_ms: u64,
}

/// Validate a batch against the stored log
///
/// Records whose id is already stored are dropped, which makes retried
/// uploads idempotent. The rest must continue the log: sequence numbers
/// strictly increasing, timestamps non-decreasing.
pub fn prepare_append<'a, F>(
    head: Option<LogHead>,
    mut is_stored: F,
    batch: &'a [EncryptedEventRecord],
) -> Result<Vec<&'a EncryptedEventRecord>>
where
    F: FnMut(&str) -> Result<bool>,
{
    let mut head = head;
    let mut accepted = Vec::with_capacity(batch.len());

    for record in batch {
        if is_stored(&record.event_id)? {
            continue;
        }
        if let Some(h) = head {
            if record.sequence_number <= h.sequence {
                return Err(EngineError::LogViolation(format!(
                    "sequence regression: {} after {}",
                    record.sequence_number, h.sequence
                )));
            }
            if record.timestamp_ms < h.timestamp_ms {
                return Err(EngineError::LogViolation(format!(
                    "timestamp regression at sequence {}",
                    record.sequence_number
                )));
            }
        }
        head = Some(LogHead {
            sequence: record.sequence_number,
            timestamp_ms: record.timestamp_ms,
        });
        accepted.push(record);
    }

    Ok(accepted)
}
