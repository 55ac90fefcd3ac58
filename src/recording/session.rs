// src/recording/session.rs
//! Recording session snapshot

use crate::recording::metrics::SessionMetrics;
use crate::recording::privacy::PrivacyTier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A recording session as seen by the recorder
///
/// Mutated while recording; once `ended_at` is set the recorder only hands
/// out clones of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSession {
    pub id: String,
    pub owner_id: String,
    pub document_id: String,
    pub title: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub privacy_tier: PrivacyTier,
    pub retention_days: u32,
    pub metrics: SessionMetrics,
    pub encrypted: bool,
}

impl RecordingSession {
    pub fn is_finalized(&self) -> bool {
        self.ended_at.is_some()
    }
}
