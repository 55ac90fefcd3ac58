// src/replay/player.rs
//! Deterministic playback engine
//!
//! Virtual time advances by `wall_delta × speed` on each tick; every event
//! whose timestamp has been reached is applied to the document. Seeking
//! rebuilds content from the nearest checkpoint.

use crate::replay::document::{ContentModel, Document};
use crate::replay::loader::{LoadedRecording, RecordingLoader};
use crate::replay::timeline::Timeline;
use crate::storage::record::SessionRecord;
use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Playback configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub min_speed: f64,
    pub max_speed: f64,
    pub default_speed: f64,

    /// Driver tick interval (milliseconds)
    pub tick_interval_ms: u64,

    /// Events between content checkpoints (0 disables them)
    pub checkpoint_interval: usize,

    pub content_model: ContentModel,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            min_speed: 0.25,
            max_speed: 4.0,
            default_speed: 1.0,
            tick_interval_ms: 50,
            checkpoint_interval: 500,
            content_model: ContentModel::AppendOnly,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStatus {
    Idle,
    Playing,
    Paused,
    Seeking,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub status: PlaybackStatus,
    pub current_time_ms: u64,
    pub duration_ms: u64,
    pub speed: f64,
    /// Number of events applied so far
    pub event_index: usize,
    pub total_events: usize,
    /// `current_time / duration` in `[0, 1]`
    pub progress: f64,
}

pub struct Player {
    config: PlaybackConfig,
    timeline: Option<Timeline>,
    session: Option<SessionRecord>,
    document: Document,
    status: PlaybackStatus,
    elapsed_ms: f64,
    applied: usize,
    speed: f64,
}

impl Player {
    pub fn new(config: PlaybackConfig) -> Self {
        let speed = config.default_speed.clamp(config.min_speed, config.max_speed);
        let document = Document::new(config.content_model);
        Self {
            config,
            timeline: None,
            session: None,
            document,
            status: PlaybackStatus::Idle,
            elapsed_ms: 0.0,
            applied: 0,
            speed,
        }
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// Fetch, decrypt and load a recording
    pub async fn load_recording(&mut self, loader: &RecordingLoader, session_id: &str) -> Result<()> {
        let recording = loader.load(session_id).await?;
        self.load(recording);
        Ok(())
    }

    pub fn load(&mut self, recording: LoadedRecording) {
        let timeline = Timeline::new(
            recording.events,
            self.config.content_model,
            self.config.checkpoint_interval,
        );
        info!(
            "Recording {} loaded: {} events over {} ms",
            recording.session.id,
            timeline.len(),
            timeline.duration_ms()
        );
        self.session = Some(recording.session);
        self.load_timeline(timeline);
    }

    /// Load a prepared timeline, resetting playback to the start
    pub fn load_timeline(&mut self, timeline: Timeline) {
        self.document = Document::new(timeline.model());
        self.timeline = Some(timeline);
        self.status = PlaybackStatus::Idle;
        self.elapsed_ms = 0.0;
        self.applied = 0;
    }

    pub fn play(&mut self) -> Result<()> {
        let timeline = self.timeline.as_ref().ok_or(EngineError::NoRecordingLoaded)?;
        match self.status {
            PlaybackStatus::Playing => return Ok(()),
            PlaybackStatus::Complete => {
                self.document = timeline.rebuild(0);
                self.elapsed_ms = 0.0;
                self.applied = 0;
            }
            _ => {}
        }
        self.status = PlaybackStatus::Playing;
        debug!("Playback started at {} ms", self.elapsed_ms as u64);
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        if self.timeline.is_none() {
            return Err(EngineError::NoRecordingLoaded);
        }
        if self.status == PlaybackStatus::Playing {
            self.status = PlaybackStatus::Paused;
            debug!("Playback paused at {} ms", self.elapsed_ms as u64);
        }
        Ok(())
    }

    /// Jump to `time_ms`, clamped to the recording
    pub fn seek(&mut self, time_ms: f64) -> Result<()> {
        let timeline = self.timeline.as_ref().ok_or(EngineError::NoRecordingLoaded)?;
        let prior = self.status;
        self.status = PlaybackStatus::Seeking;

        let duration = timeline.duration_ms() as f64;
        let target = if time_ms.is_nan() { 0.0 } else { time_ms.clamp(0.0, duration) };

        self.applied = timeline.index_at(target as u64);
        self.document = timeline.rebuild(self.applied);
        self.elapsed_ms = target;

        self.status = match prior {
            PlaybackStatus::Complete if target < duration => PlaybackStatus::Paused,
            PlaybackStatus::Seeking => PlaybackStatus::Paused,
            other => other,
        };
        debug!("Seeked to {} ms ({} events applied)", target as u64, self.applied);
        Ok(())
    }

    /// Clamp and apply a speed multiplier; returns the speed in effect
    pub fn set_speed(&mut self, multiplier: f64) -> Result<f64> {
        if !multiplier.is_finite() {
            return Err(EngineError::InvalidSpeed(multiplier));
        }
        self.speed = multiplier.clamp(self.config.min_speed, self.config.max_speed);
        Ok(self.speed)
    }

    /// Advance playback by `wall_delta`; returns whether another tick is wanted
    pub fn tick(&mut self, wall_delta: Duration) -> bool {
        if self.status != PlaybackStatus::Playing {
            return false;
        }
        let Some(timeline) = self.timeline.as_ref() else {
            return false;
        };

        self.elapsed_ms += wall_delta.as_nanos() as f64 / 1_000_000.0 * self.speed;

        let events = timeline.events();
        while self.applied < events.len() && (events[self.applied].timestamp_ms as f64) <= self.elapsed_ms {
            self.document.apply(&events[self.applied]);
            self.applied += 1;
        }

        let duration = timeline.duration_ms() as f64;
        if self.elapsed_ms >= duration && self.applied == events.len() {
            self.elapsed_ms = duration;
            self.status = PlaybackStatus::Complete;
            info!("Playback complete");
            return false;
        }
        true
    }

    pub fn state(&self) -> PlaybackState {
        let duration_ms = self.timeline.as_ref().map_or(0, |t| t.duration_ms());
        let total_events = self.timeline.as_ref().map_or(0, |t| t.len());
        let current_time_ms = self.elapsed_ms as u64;

        let progress = if duration_ms == 0 {
            if self.status == PlaybackStatus::Complete {
                1.0
            } else {
                0.0
            }
        } else {
            (self.elapsed_ms / duration_ms as f64).clamp(0.0, 1.0)
        };

        PlaybackState {
            status: self.status,
            current_time_ms,
            duration_ms,
            speed: self.speed,
            event_index: self.applied,
            total_events,
            progress,
        }
    }

    pub fn content(&self) -> String {
        self.document.content()
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn timeline(&self) -> Option<&Timeline> {
        self.timeline.as_ref()
    }

    pub fn session(&self) -> Option<&SessionRecord> {
        self.session.as_ref()
    }

    /// Drop the loaded recording and reset state
    pub fn teardown(&mut self) {
        self.timeline = None;
        self.session = None;
        self.document = Document::new(self.config.content_model);
        self.status = PlaybackStatus::Idle;
        self.elapsed_ms = 0.0;
        self.applied = 0;
        self.speed = self
            .config
            .default_speed
            .clamp(self.config.min_speed, self.config.max_speed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::event::{EventKind, EventPayload, Modifiers};
    use crate::replay::timeline::ReplayEvent;
    use proptest::prelude::*;

    fn event(sequence: u64, timestamp_ms: u64, kind: EventKind, text: Option<&str>) -> ReplayEvent {
        ReplayEvent {
            sequence,
            timestamp_ms,
            kind,
            payload: EventPayload {
                text: text.map(str::to_string),
                ..Default::default()
            },
            modifiers: Modifiers::default(),
            target: None,
        }
    }

    /// insert "a"@0, insert "b"@100, backspace@200, insert "c"@300
    fn sample_timeline(checkpoint_interval: usize) -> Timeline {
        Timeline::new(
            vec![
                event(1, 0, EventKind::Insert, Some("a")),
                event(2, 100, EventKind::Insert, Some("b")),
                event(3, 200, EventKind::Delete, None),
                event(4, 300, EventKind::Insert, Some("c")),
            ],
            ContentModel::AppendOnly,
            checkpoint_interval,
        )
    }

    fn loaded_player() -> Player {
        let mut player = Player::new(PlaybackConfig::default());
        player.load_timeline(sample_timeline(0));
        player
    }

    #[test]
    fn test_seek_reconstructs_content() {
        let mut player = loaded_player();

        player.seek(150.0).unwrap();
        assert_eq!(player.content(), "ab");
        player.seek(250.0).unwrap();
        assert_eq!(player.content(), "a");
        player.seek(1000.0).unwrap();
        assert_eq!(player.content(), "ac");
        assert_eq!(player.state().current_time_ms, 300);
    }

    #[test]
    fn test_seek_through_checkpoints_matches() {
        let mut plain = loaded_player();
        let mut checkpointed = Player::new(PlaybackConfig::default());
        checkpointed.load_timeline(sample_timeline(1));

        for t in [0.0, 50.0, 100.0, 199.0, 200.0, 300.0, -5.0, f64::NAN] {
            plain.seek(t).unwrap();
            checkpointed.seek(t).unwrap();
            assert_eq!(plain.content(), checkpointed.content());
        }
    }

    #[test]
    fn test_speed_clamping() {
        let mut player = loaded_player();
        assert_eq!(player.set_speed(10.0).unwrap(), 4.0);
        assert_eq!(player.set_speed(0.01).unwrap(), 0.25);
        assert_eq!(player.set_speed(2.0).unwrap(), 2.0);
        assert!(matches!(
            player.set_speed(f64::NAN),
            Err(EngineError::InvalidSpeed(_))
        ));
        assert!(player.set_speed(f64::INFINITY).is_err());
        assert_eq!(player.state().speed, 2.0);
    }

    #[test]
    fn test_play_requires_recording() {
        let mut player = Player::new(PlaybackConfig::default());
        assert!(matches!(player.play(), Err(EngineError::NoRecordingLoaded)));
        assert!(matches!(player.seek(10.0), Err(EngineError::NoRecordingLoaded)));
    }

    #[test]
    fn test_tick_plays_to_completion() {
        let mut player = loaded_player();
        assert!(!player.tick(Duration::from_millis(100)));

        player.play().unwrap();
        assert!(player.tick(Duration::from_millis(0)));
        assert_eq!(player.content(), "a");

        assert!(player.tick(Duration::from_millis(150)));
        assert_eq!(player.content(), "ab");

        assert!(!player.tick(Duration::from_millis(500)));
        let state = player.state();
        assert_eq!(state.status, PlaybackStatus::Complete);
        assert_eq!(state.current_time_ms, 300);
        assert_eq!(state.progress, 1.0);
        assert_eq!(player.content(), "ac");
    }

    #[test]
    fn test_pause_preserves_offset() {
        let mut player = loaded_player();
        player.set_speed(2.0).unwrap();
        player.play().unwrap();
        player.tick(Duration::from_millis(60));
        player.pause().unwrap();

        assert!(!player.tick(Duration::from_millis(1000)));
        assert_eq!(player.state().current_time_ms, 120);
        assert_eq!(player.content(), "ab");

        player.play().unwrap();
        player.tick(Duration::from_millis(50));
        assert_eq!(player.state().current_time_ms, 220);
        assert_eq!(player.content(), "a");
    }

    #[test]
    fn test_seek_restores_prior_state() {
        let mut player = loaded_player();
        player.play().unwrap();
        player.seek(100.0).unwrap();
        assert_eq!(player.state().status, PlaybackStatus::Playing);

        player.tick(Duration::from_millis(1000));
        assert_eq!(player.state().status, PlaybackStatus::Complete);

        player.seek(100.0).unwrap();
        assert_eq!(player.state().status, PlaybackStatus::Paused);
        assert_eq!(player.content(), "ab");
    }

    #[test]
    fn test_play_after_complete_restarts() {
        let mut player = loaded_player();
        player.play().unwrap();
        player.tick(Duration::from_secs(1));
        assert_eq!(player.state().status, PlaybackStatus::Complete);

        player.play().unwrap();
        let state = player.state();
        assert_eq!(state.status, PlaybackStatus::Playing);
        assert_eq!(state.current_time_ms, 0);
        assert_eq!(player.content(), "");
    }

    #[test]
    fn test_teardown_resets() {
        let mut player = loaded_player();
        player.play().unwrap();
        player.tick(Duration::from_millis(150));
        player.teardown();

        assert_eq!(player.state().status, PlaybackStatus::Idle);
        assert_eq!(player.content(), "");
        assert!(player.play().is_err());
    }

    proptest! {
        #[test]
        fn prop_ticking_matches_seek(
            texts in prop::collection::vec(prop::option::of("[a-z]{1,2}"), 1..40),
            steps in prop::collection::vec(0u64..120, 1..80),
        ) {
            let events: Vec<ReplayEvent> = texts
                .iter()
                .enumerate()
                .map(|(i, text)| match text {
                    Some(t) => event(i as u64 + 1, i as u64 * 37, EventKind::Insert, Some(t)),
                    None => event(i as u64 + 1, i as u64 * 37, EventKind::Delete, None),
                })
                .collect();
            let timeline = Timeline::new(events, ContentModel::AppendOnly, 5);

            let mut ticking = Player::new(PlaybackConfig::default());
            ticking.load_timeline(timeline.clone());
            let mut seeking = Player::new(PlaybackConfig::default());
            seeking.load_timeline(timeline);

            ticking.play().unwrap();
            for step in steps {
                ticking.tick(Duration::from_millis(step));
                seeking.seek(ticking.state().current_time_ms as f64).unwrap();
                prop_assert_eq!(ticking.content(), seeking.content());
            }
        }
    }
}
