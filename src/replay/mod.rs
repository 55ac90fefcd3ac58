// src/replay/mod.rs
//! Deterministic replay of recorded sessions
//!
//! - **Loader**: fetches a session, verifies and decrypts each record
//! - **Timeline**: validated event order, binary-searchable by time, checkpoints
//! - **Document**: pure content reconstruction (append-only or cursor model)
//! - **Player**: play/pause/seek/speed state machine driven by ticks
//! - **Driver**: task owning the player, fed by a command queue
//! - **Exporter**: JSON, plain-text timeline and compressed archive output
//!
//! # Architecture
//!
//! ```text
//! SessionStore → Loader (verify, decrypt) → Timeline → Player ← commands
//!                                                        ↓
//!                                               watch::Sender<PlaybackSnapshot>
//! ```

pub mod compressor;
pub mod document;
pub mod driver;
pub mod exporter;
pub mod loader;
pub mod player;
pub mod timeline;

// Re-export commonly used types
pub use compressor::{CompressionLevel, Compressor};
pub use document::{ContentModel, Document};
pub use driver::{PlaybackHandle, PlaybackSnapshot};
pub use exporter::{import_archive, ExportFormat, Exporter};
pub use loader::{LoadedRecording, RecordingLoader};
pub use player::{PlaybackConfig, PlaybackState, PlaybackStatus, Player};
pub use timeline::{ReplayEvent, Timeline};
