// src/replay/exporter.rs
//! Export loaded recordings
//!
//! Supports:
//! - JSON (decoded timeline, for analysis)
//! - Timeline (plain text, one line per event)
//! - Archive (zstd-compressed raw encrypted records, re-importable)

use crate::recording::event::EventKind;
use crate::replay::compressor::{CompressionLevel, Compressor};
use crate::replay::document::{ContentModel, Document};
use crate::replay::loader::LoadedRecording;
use crate::replay::timeline::ReplayEvent;
use crate::storage::record::{SessionRecord, StoredSession};
use crate::utils::errors::{EngineError, Result};
use serde::Serialize;
use std::fmt::Write as _;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Timeline,
    Archive,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Timeline => "txt",
            ExportFormat::Archive => "ktz",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "timeline" | "text" | "txt" => Ok(ExportFormat::Timeline),
            "archive" | "zst" => Ok(ExportFormat::Archive),
            other => Err(EngineError::ExportFailed(format!("unknown export format: {}", other))),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonExport<'a> {
    session: &'a SessionRecord,
    events: &'a [ReplayEvent],
    skipped: usize,
    final_content: String,
}

pub struct Exporter {
    format: ExportFormat,
    model: ContentModel,
}

impl Exporter {
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            model: ContentModel::default(),
        }
    }

    /// Content model used to compute the final text
    pub fn with_model(mut self, model: ContentModel) -> Self {
        self.model = model;
        self
    }

    pub fn export(&self, recording: &LoadedRecording) -> Result<Vec<u8>> {
        debug!(
            "Exporting recording {} ({} events) as {:?}",
            recording.session.id,
            recording.events.len(),
            self.format
        );

        match self.format {
            ExportFormat::Json => self.export_json(recording),
            ExportFormat::Timeline => Ok(self.export_timeline(recording).into_bytes()),
            ExportFormat::Archive => export_archive(recording),
        }
    }

    fn export_json(&self, recording: &LoadedRecording) -> Result<Vec<u8>> {
        let export = JsonExport {
            session: &recording.session,
            events: &recording.events,
            skipped: recording.skipped,
            final_content: self.final_content(&recording.events),
        };
        serde_json::to_vec_pretty(&export)
            .map_err(|e| EngineError::ExportFailed(format!("JSON serialization error: {}", e)))
    }

    fn export_timeline(&self, recording: &LoadedRecording) -> String {
        let session = &recording.session;
        let mut out = String::new();

        let _ = writeln!(out, "# {} ({})", session.metadata.title, session.id);
        let _ = writeln!(
            out,
            "# owner={} document={} privacy={} events={}",
            session.metadata.owner_id,
            session.metadata.document_id,
            session.metadata.privacy_tier,
            recording.events.len()
        );

        for event in &recording.events {
            let _ = writeln!(
                out,
                "[{}] #{:<5} {:<16} {}",
                format_offset(event.timestamp_ms),
                event.sequence,
                event.kind.as_str(),
                describe(event)
            );
        }

        let _ = writeln!(out, "---");
        out.push_str(&self.final_content(&recording.events));
        out.push('\n');
        out
    }

    fn final_content(&self, events: &[ReplayEvent]) -> String {
        let mut document = Document::new(self.model);
        for event in events {
            document.apply(event);
        }
        document.content()
    }
}

fn export_archive(recording: &LoadedRecording) -> Result<Vec<u8>> {
    let archive = StoredSession {
        session: recording.session.clone(),
        events: recording.records.clone(),
    };
    let json = serde_json::to_vec(&archive)
        .map_err(|e| EngineError::ExportFailed(format!("Archive serialization error: {}", e)))?;
    Compressor::new(CompressionLevel::Best).compress(&json)
}

/// Read an archive back into its stored form
pub fn import_archive(data: &[u8]) -> Result<StoredSession> {
    let json = Compressor::default().decompress(data)?;
    serde_json::from_slice(&json)
        .map_err(|e| EngineError::ExportFailed(format!("Malformed archive: {}", e)))
}

/// `mm:ss.mmm`
fn format_offset(ms: u64) -> String {
    format!("{:02}:{:02}.{:03}", ms / 60_000, (ms / 1_000) % 60, ms % 1_000)
}

fn describe(event: &ReplayEvent) -> String {
    let payload = &event.payload;
    match event.kind {
        EventKind::KeyDown | EventKind::KeyUp => payload.key.clone().unwrap_or_default(),
        EventKind::SelectionChange => payload
            .selection
            .map(|s| format!("{}..{}", s.start, s.end))
            .unwrap_or_default(),
        _ => payload
            .text
            .as_deref()
            .map(|t| format!("{:?}", t))
            .unwrap_or_default(),
    }
}
