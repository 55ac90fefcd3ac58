// src/recording/metrics.rs
//! Running composition metrics

use crate::recording::event::{DeleteDirection, EventKind, KeystrokeEvent};
use serde::{Deserialize, Serialize};

/// Aggregated session metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetrics {
    /// Key-down events
    pub keystroke_count: u64,

    /// Typed characters (inserts, not pastes)
    pub character_count: u64,

    pub words_per_minute: f64,

    /// Gaps between consecutive events longer than the pause threshold
    pub pause_count: u64,

    /// Explicit `pause()` calls
    pub explicit_pause_count: u64,

    pub backspace_count: u64,
    pub delete_count: u64,
    pub paste_count: u64,
    pub event_count: u64,
}

/// Incrementally maintains [`SessionMetrics`]
#[derive(Debug, Clone)]
pub struct MetricsTracker {
    metrics: SessionMetrics,
    last_event_ms: Option<u64>,
    pause_threshold_ms: u64,
    wpm_cap: f64,
}

impl MetricsTracker {
    pub fn new(pause_threshold_ms: u64, wpm_cap: f64) -> Self {
        Self {
            metrics: SessionMetrics::default(),
            last_event_ms: None,
            pause_threshold_ms,
            wpm_cap,
        }
    }

    /// Account for one event (before privacy filtering)
    pub fn observe(&mut self, event: &KeystrokeEvent) {
        let m = &mut self.metrics;
        m.event_count += 1;

        if let Some(last) = self.last_event_ms {
            if event.relative_ms.saturating_sub(last) > self.pause_threshold_ms {
                m.pause_count += 1;
            }
        }
        self.last_event_ms = Some(event.relative_ms);

        match event.kind {
            EventKind::KeyDown => m.keystroke_count += 1,
            EventKind::Insert => {
                m.character_count += event
                    .payload
                    .text
                    .as_deref()
                    .map(|t| t.chars().count() as u64)
                    .unwrap_or(0);
            }
            EventKind::Delete => match event.payload.direction {
                Some(DeleteDirection::Forward) => m.delete_count += 1,
                _ => m.backspace_count += 1,
            },
            EventKind::Paste => m.paste_count += 1,
            EventKind::KeyUp | EventKind::Cut | EventKind::SelectionChange => {}
        }
    }

    /// Explicit pause; the resume gap is not an inactivity pause
    pub fn record_explicit_pause(&mut self) {
        self.metrics.explicit_pause_count += 1;
        self.last_event_ms = None;
    }

    /// Recompute WPM from active (unpaused) recording time
    pub fn update_wpm(&mut self, active_ms: u64) {
        self.metrics.words_per_minute =
            words_per_minute(self.metrics.character_count, active_ms, self.wpm_cap);
    }

    pub fn snapshot(&self) -> SessionMetrics {
        self.metrics.clone()
    }
}

/// `(characters / 5) / minutes`, capped and rounded to two decimals
pub fn words_per_minute(characters: u64, elapsed_ms: u64, cap: f64) -> f64 {
    if elapsed_ms == 0 {
        return 0.0;
    }
    let minutes = elapsed_ms as f64 / 60_000.0;
    let wpm = (characters as f64 / 5.0) / minutes;
    (wpm.min(cap) * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::event::{EventPayload, Modifiers};
    use chrono::Utc;

    fn event(kind: EventKind, relative_ms: u64, payload: EventPayload) -> KeystrokeEvent {
        KeystrokeEvent {
            id: format!("evt-{}", relative_ms),
            session_id: "s".into(),
            sequence: 1,
            relative_ms,
            occurred_at: Utc::now(),
            kind,
            payload,
            modifiers: Modifiers::default(),
            functional_key: false,
            target: None,
        }
    }

    fn text(t: &str) -> EventPayload {
        EventPayload { text: Some(t.into()), ..Default::default() }
    }

    #[test]
    fn test_wpm_formula() {
        // 300 characters in one minute = 60 WPM
        assert_eq!(words_per_minute(300, 60_000, 999.0), 60.0);
        assert_eq!(words_per_minute(10, 0, 999.0), 0.0);
        // 1000 chars in 1 second would be 12000 WPM
        assert_eq!(words_per_minute(1_000, 1_000, 999.0), 999.0);
    }

    #[test]
    fn test_inactivity_pauses() {
        let mut tracker = MetricsTracker::new(2_000, 999.0);
        tracker.observe(&event(EventKind::Insert, 0, text("a")));
        tracker.observe(&event(EventKind::Insert, 1_500, text("b")));
        tracker.observe(&event(EventKind::Insert, 3_501, text("c")));
        tracker.observe(&event(EventKind::Insert, 5_501, text("d")));

        let m = tracker.snapshot();
        assert_eq!(m.pause_count, 1);
        assert_eq!(m.character_count, 4);
        assert_eq!(m.event_count, 4);
    }

    #[test]
    fn test_explicit_pause_resets_gap() {
        let mut tracker = MetricsTracker::new(2_000, 999.0);
        tracker.observe(&event(EventKind::Insert, 0, text("a")));
        tracker.record_explicit_pause();
        tracker.observe(&event(EventKind::Insert, 60_000, text("b")));

        let m = tracker.snapshot();
        assert_eq!(m.pause_count, 0);
        assert_eq!(m.explicit_pause_count, 1);
    }

    #[test]
    fn test_delete_and_key_counts() {
        let mut tracker = MetricsTracker::new(2_000, 999.0);
        tracker.observe(&event(EventKind::KeyDown, 0, EventPayload::default()));
        tracker.observe(&event(
            EventKind::Delete,
            10,
            EventPayload { direction: Some(DeleteDirection::Backward), ..Default::default() },
        ));
        tracker.observe(&event(
            EventKind::Delete,
            20,
            EventPayload { direction: Some(DeleteDirection::Forward), ..Default::default() },
        ));
        tracker.observe(&event(EventKind::Paste, 30, text("pasted")));

        let m = tracker.snapshot();
        assert_eq!(m.keystroke_count, 1);
        assert_eq!(m.backspace_count, 1);
        assert_eq!(m.delete_count, 1);
        assert_eq!(m.paste_count, 1);
        assert_eq!(m.character_count, 0);
    }
}
