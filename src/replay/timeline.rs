// src/replay/timeline.rs
//! Ordered, validated event timeline with content checkpoints

use crate::recording::event::{EventKind, EventPayload, Modifiers};
use crate::replay::document::{ContentModel, Document};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Decrypted event ready for playback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayEvent {
    pub sequence: u64,
    pub timestamp_ms: u64,
    pub kind: EventKind,
    pub payload: EventPayload,
    pub modifiers: Modifiers,
    pub target: Option<String>,
}

/// Events sorted by sequence number, plus periodic content snapshots
#[derive(Debug, Clone)]
pub struct Timeline {
    events: Vec<ReplayEvent>,
    model: ContentModel,
    /// `(applied, document)`: content after the first `applied` events
    checkpoints: Vec<(usize, Document)>,
    skipped: usize,
}

impl Timeline {
    /// Build a timeline; `checkpoint_interval == 0` disables checkpoints
    ///
    /// Events are re-sorted by sequence number. Duplicate sequence numbers
    /// and timestamps running backwards are logged and skipped.
    pub fn new(mut events: Vec<ReplayEvent>, model: ContentModel, checkpoint_interval: usize) -> Self {
        events.sort_by_key(|e| e.sequence);

        let mut accepted: Vec<ReplayEvent> = Vec::with_capacity(events.len());
        let mut skipped = 0;
        for event in events {
            if let Some(prev) = accepted.last() {
                if event.sequence == prev.sequence {
                    warn!("Skipping duplicate event sequence {}", event.sequence);
                    skipped += 1;
                    continue;
                }
                if event.timestamp_ms < prev.timestamp_ms {
                    warn!(
                        "Skipping event {}: timestamp {} precedes {}",
                        event.sequence, event.timestamp_ms, prev.timestamp_ms
                    );
                    skipped += 1;
                    continue;
                }
            }
            accepted.push(event);
        }

        let checkpoints = build_checkpoints(&accepted, model, checkpoint_interval);
        debug!(
            "Timeline built: {} events, {} checkpoints, {} skipped",
            accepted.len(),
            checkpoints.len(),
            skipped
        );

        Self {
            events: accepted,
            model,
            checkpoints,
            skipped,
        }
    }

    pub fn events(&self) -> &[ReplayEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Relative timestamp of the last event
    pub fn duration_ms(&self) -> u64 {
        self.events.last().map_or(0, |e| e.timestamp_ms)
    }

    pub fn model(&self) -> ContentModel {
        self.model
    }

    /// Events dropped while building
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints.len()
    }

    /// Number of events with `timestamp_ms <= time_ms`
    pub fn index_at(&self, time_ms: u64) -> usize {
        self.events.partition_point(|e| e.timestamp_ms <= time_ms)
    }

    /// Content after applying the first `count` events
    pub fn rebuild(&self, count: usize) -> Document {
        let count = count.min(self.events.len());
        let slot = self.checkpoints.partition_point(|(applied, _)| *applied <= count);

        let (start, mut document) = match slot.checked_sub(1).map(|i| &self.checkpoints[i]) {
            Some((applied, document)) => (*applied, document.clone()),
            None => (0, Document::new(self.model)),
        };

        for event in &self.events[start..count] {
            document.apply(event);
        }
        document
    }
}

fn build_checkpoints(events: &[ReplayEvent], model: ContentModel, interval: usize) -> Vec<(usize, Document)> {
    if interval == 0 {
        return Vec::new();
    }

    let mut checkpoints = Vec::with_capacity(events.len() / interval);
    let mut document = Document::new(model);
    for (i, event) in events.iter().enumerate() {
        document.apply(event);
        let applied = i + 1;
        if applied % interval == 0 {
            checkpoints.push((applied, document.clone()));
        }
    }
    checkpoints
}
