// src/storage/record.rs
//! Persisted shapes exchanged with the session store

use crate::crypto::cipher::{self, hash_string, SessionCipher};
use crate::crypto::keys::SessionKey;
use crate::recording::event::{EventKind, EventPayload, KeystrokeEvent, Modifiers};
use crate::recording::metrics::SessionMetrics;
use crate::recording::privacy::PrivacyTier;
use crate::utils::errors::{EngineError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Encrypted, append-only form of one event
///
/// Only timing, kind and coarse target metadata travel in the clear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedEventRecord {
    pub event_id: String,
    pub sequence_number: u64,
    /// Milliseconds since session start
    pub timestamp_ms: u64,
    pub event_type: String,
    /// `base64(nonce ‖ ciphertext)` of the [`EventBody`] JSON
    pub ciphertext: String,
    /// SHA-256 hex of `ciphertext`
    pub integrity_hash: String,
    pub target_element: Option<String>,
    pub has_modifier_keys: bool,
    pub is_functional_key: bool,
}

/// Encrypted part of an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBody {
    pub payload: EventPayload,
    pub modifiers: Modifiers,
    pub occurred_at: DateTime<Utc>,
}

impl EncryptedEventRecord {
    /// Encrypt one event on its own
    pub fn seal(event: &KeystrokeEvent, cipher: &SessionCipher) -> Result<Self> {
        let body = EventBody {
            payload: event.payload.clone(),
            modifiers: event.modifiers,
            occurred_at: event.occurred_at,
        };
        let plaintext = serde_json::to_vec(&body)?;
        let ciphertext = cipher.encrypt(&plaintext, None)?;
        let integrity_hash = hash_string(&ciphertext);

        Ok(Self {
            event_id: event.id.clone(),
            sequence_number: event.sequence,
            timestamp_ms: event.relative_ms,
            event_type: event.kind.as_str().to_string(),
            ciphertext,
            integrity_hash,
            target_element: event.target.clone(),
            has_modifier_keys: event.modifiers.any(),
            is_functional_key: event.functional_key,
        })
    }

    /// Check the stored hash against the ciphertext without decrypting
    pub fn verify_integrity(&self) -> bool {
        hash_string(&self.ciphertext) == self.integrity_hash
    }

    pub fn kind(&self) -> Option<EventKind> {
        EventKind::parse(&self.event_type)
    }

    /// Verify and decrypt the body
    pub fn open(&self, key: &SessionKey) -> Result<EventBody> {
        if !self.verify_integrity() {
            return Err(EngineError::IntegrityMismatch(self.event_id.clone()));
        }
        let plaintext = cipher::decrypt(&self.ciphertext, key)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }
}

/// Session metadata sent when a remote session is created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub owner_id: String,
    pub document_id: String,
    pub title: String,
    pub privacy_tier: PrivacyTier,
    pub retention_days: u32,
    pub started_at: DateTime<Utc>,
    pub encrypted: bool,
}

/// Final aggregated stats sent when a session completes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalStats {
    pub ended_at: DateTime<Utc>,
    pub metrics: SessionMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(SessionStatus::Active),
            "completed" => Some(SessionStatus::Completed),
            _ => None,
        }
    }
}

/// Stored view of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    #[serde(flatten)]
    pub metadata: SessionMetadata,
    pub status: SessionStatus,
    pub ended_at: Option<DateTime<Utc>>,
    pub metrics: Option<SessionMetrics>,
    pub event_count: u64,
}

impl SessionRecord {
    pub fn new(id: String, metadata: SessionMetadata) -> Self {
        Self {
            id,
            metadata,
            status: SessionStatus::Active,
            ended_at: None,
            metrics: None,
            event_count: 0,
        }
    }

    /// Completed sessions past their retention period
    ///
    /// A retention too long to represent never expires.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match (self.status, self.ended_at) {
            (SessionStatus::Completed, Some(ended_at)) => {
                Duration::try_days(i64::from(self.metadata.retention_days))
                    .and_then(|retention| ended_at.checked_add_signed(retention))
                    .is_some_and(|expires_at| expires_at < now)
            }
            _ => false,
        }
    }
}

/// Session metadata plus its ordered event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
    pub session: SessionRecord,
    pub events: Vec<EncryptedEventRecord>,
}
