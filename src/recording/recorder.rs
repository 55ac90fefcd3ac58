// src/recording/recorder.rs
//! Keystroke recorder
//!
//! Turns raw editor input into sequenced, privacy-filtered events, keeps
//! running metrics and hands buffered events to the storage pipeline.
//! Input handlers are synchronous and never touch I/O.

use crate::recording::event::{KeystrokeEvent, RawInputEvent};
use crate::recording::metrics::MetricsTracker;
use crate::recording::privacy::{apply_privacy, PrivacyTier};
use crate::recording::session::RecordingSession;
use crate::storage::pipeline::{ActiveUpload, StoragePipeline, UploadReport, UploadStatus};
use crate::storage::record::{FinalStats, SessionMetadata};
use crate::utils::clock::Clock;
use crate::utils::errors::{EngineError, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use ulid::Ulid;

/// Recorder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Events buffered before they are handed to the pipeline
    pub buffer_size: usize,

    /// Gap between consecutive events counted as an inactivity pause (milliseconds)
    pub pause_threshold_ms: u64,

    /// Upper bound reported for words per minute
    pub wpm_cap: f64,

    pub privacy_tier: PrivacyTier,

    /// Retention period stamped on new sessions
    pub retention_days: u32,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            buffer_size: 50,
            pause_threshold_ms: 2_000,
            wpm_cap: 999.0,
            privacy_tier: PrivacyTier::Full,
            retention_days: 365,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecorderState {
    Idle,
    Recording,
    Paused,
    Stopped,
}

/// Recorder state plus upload counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderStatus {
    pub state: RecorderState,
    pub session_id: Option<String>,
    /// Events held locally, not yet handed to the pipeline
    pub buffered: usize,
    /// Live counters while recording, the final report's after stop
    pub upload: Option<UploadStatus>,
}

struct ActiveRecording {
    session: RecordingSession,
    upload: ActiveUpload,
    buffer: Vec<KeystrokeEvent>,
    metrics: MetricsTracker,
    sequence: u64,
    last_relative_ms: u64,
    paused_at: Option<DateTime<Utc>>,
    paused_total_ms: u64,
}

impl ActiveRecording {
    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        debug!(
            "Flushing {} buffered events of session {}",
            self.buffer.len(),
            self.session.id
        );
        for event in self.buffer.drain(..) {
            self.upload.add_event(event);
        }
    }

    fn elapsed_ms(&self, now: DateTime<Utc>) -> u64 {
        (now - self.session.started_at).num_milliseconds().max(0) as u64
    }

    fn active_ms(&self, now: DateTime<Utc>) -> u64 {
        self.elapsed_ms(now).saturating_sub(self.paused_total_ms)
    }
}

struct RecorderInner {
    state: RecorderState,
    active: Option<ActiveRecording>,
    last_session: Option<RecordingSession>,
    last_report: Option<UploadReport>,
}

/// Captures one recording session at a time
pub struct Recorder {
    config: RecorderConfig,
    pipeline: Arc<StoragePipeline>,
    clock: Arc<dyn Clock>,
    inner: Mutex<RecorderInner>,
}

impl Recorder {
    pub fn new(config: RecorderConfig, pipeline: Arc<StoragePipeline>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            pipeline,
            clock,
            inner: Mutex::new(RecorderInner {
                state: RecorderState::Idle,
                active: None,
                last_session: None,
                last_report: None,
            }),
        }
    }

    /// Start a session and open it remotely
    pub async fn start(&self, owner_id: &str, document_id: &str, title: &str) -> Result<String> {
        let active_id = self.inner.lock().active.as_ref().map(|a| a.session.id.clone());
        if let Some(id) = active_id {
            return Err(EngineError::SessionAlreadyActive(id));
        }

        let started_at = self.clock.now();
        let metadata = SessionMetadata {
            owner_id: owner_id.to_string(),
            document_id: document_id.to_string(),
            title: title.to_string(),
            privacy_tier: self.config.privacy_tier,
            retention_days: self.config.retention_days,
            started_at,
            encrypted: true,
        };
        let upload = self.pipeline.start_recording(metadata).await?;
        let session_id = upload.session_id().to_string();

        let session = RecordingSession {
            id: session_id.clone(),
            owner_id: owner_id.to_string(),
            document_id: document_id.to_string(),
            title: title.to_string(),
            started_at,
            ended_at: None,
            privacy_tier: self.config.privacy_tier,
            retention_days: self.config.retention_days,
            metrics: Default::default(),
            encrypted: true,
        };

        let mut inner = self.inner.lock();
        inner.active = Some(ActiveRecording {
            session,
            upload,
            buffer: Vec::with_capacity(self.config.buffer_size),
            metrics: MetricsTracker::new(self.config.pause_threshold_ms, self.config.wpm_cap),
            sequence: 0,
            last_relative_ms: 0,
            paused_at: None,
            paused_total_ms: 0,
        });
        inner.state = RecorderState::Recording;
        inner.last_report = None;

        info!("Recording session {} started", session_id);
        Ok(session_id)
    }

    /// Record one raw input event; returns its sequence number
    ///
    /// Ignored (`None`) unless recording, and for input types that are not tracked.
    pub fn handle_input(&self, raw: RawInputEvent) -> Option<u64> {
        let mut inner = self.inner.lock();
        if inner.state != RecorderState::Recording {
            return None;
        }
        let active = inner.active.as_mut()?;
        let normalized = raw.normalize()?;

        let now = self.clock.now();
        let relative_ms = active.elapsed_ms(now).max(active.last_relative_ms);
        active.last_relative_ms = relative_ms;
        active.sequence += 1;

        let event = KeystrokeEvent {
            id: Ulid::new().to_string(),
            session_id: active.session.id.clone(),
            sequence: active.sequence,
            relative_ms,
            occurred_at: now,
            kind: normalized.kind,
            payload: normalized.payload,
            modifiers: normalized.modifiers,
            functional_key: normalized.functional_key,
            target: normalized.target,
        };

        // Metrics see the unfiltered event
        active.metrics.observe(&event);
        active.metrics.update_wpm(active.active_ms(now));
        active.session.metrics = active.metrics.snapshot();

        active.buffer.push(apply_privacy(event, active.session.privacy_tier));
        if active.buffer.len() >= self.config.buffer_size {
            active.flush();
        }

        Some(active.sequence)
    }

    /// Stop listening without ending the session
    pub fn pause(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            RecorderState::Recording => {}
            RecorderState::Paused => return Ok(()),
            _ => return Err(EngineError::NoActiveSession),
        }

        let now = self.clock.now();
        let active = inner.active.as_mut().ok_or(EngineError::NoActiveSession)?;
        active.flush();
        active.metrics.record_explicit_pause();
        active.metrics.update_wpm(active.active_ms(now));
        active.session.metrics = active.metrics.snapshot();
        active.paused_at = Some(now);
        inner.state = RecorderState::Paused;

        debug!("Recording paused");
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            RecorderState::Paused => {}
            RecorderState::Recording => return Ok(()),
            _ => return Err(EngineError::NoActiveSession),
        }

        let now = self.clock.now();
        let active = inner.active.as_mut().ok_or(EngineError::NoActiveSession)?;
        if let Some(paused_at) = active.paused_at.take() {
            active.paused_total_ms += (now - paused_at).num_milliseconds().max(0) as u64;
        }
        inner.state = RecorderState::Recording;

        debug!("Recording resumed");
        Ok(())
    }

    /// End the session; `None` when nothing is being recorded
    pub async fn stop(&self) -> Option<RecordingSession> {
        let (session, upload, stats) = {
            let mut inner = self.inner.lock();
            let mut active = inner.active.take()?;
            inner.state = RecorderState::Stopped;

            let now = self.clock.now();
            if let Some(paused_at) = active.paused_at.take() {
                active.paused_total_ms += (now - paused_at).num_milliseconds().max(0) as u64;
            }
            active.flush();
            active.metrics.update_wpm(active.active_ms(now));

            let mut session = active.session;
            session.metrics = active.metrics.snapshot();
            session.ended_at = Some(now);

            let stats = FinalStats {
                ended_at: now,
                metrics: session.metrics.clone(),
            };
            inner.last_session = Some(session.clone());
            (session, active.upload, stats)
        };

        let report = upload.stop(&stats).await;
        info!(
            "Recording session {} stopped after {} events",
            session.id, session.metrics.event_count
        );
        self.inner.lock().last_report = Some(report);

        Some(session)
    }

    /// Current session snapshot (the finalized one after stop)
    pub fn session(&self) -> Option<RecordingSession> {
        let inner = self.inner.lock();
        match &inner.active {
            Some(active) => Some(active.session.clone()),
            None => inner.last_session.clone(),
        }
    }

    pub fn state(&self) -> RecorderState {
        self.inner.lock().state
    }

    pub fn status(&self) -> RecorderStatus {
        let inner = self.inner.lock();
        match &inner.active {
            Some(active) => RecorderStatus {
                state: inner.state,
                session_id: Some(active.session.id.clone()),
                buffered: active.buffer.len(),
                upload: Some(active.upload.status()),
            },
            None => RecorderStatus {
                state: inner.state,
                session_id: inner.last_session.as_ref().map(|s| s.id.clone()),
                buffered: 0,
                upload: inner.last_report.as_ref().map(|r| r.status.clone()),
            },
        }
    }

    /// Report of the last stopped session's upload
    pub fn last_report(&self) -> Option<UploadReport> {
        self.inner.lock().last_report.clone()
    }
}
