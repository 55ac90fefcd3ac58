// src/lib.rs
//! Keytrace Engine Library
//!
//! Captures keystrokes from a text-editing surface, uploads them as
//! encrypted batches and replays them deterministically.
//!
//! # Architecture
//!
//! The engine is structured into several key modules:
//!
//! - **recording**: Input normalization, privacy filtering, metrics, recorder state machine
//! - **storage**: Pending queue, background uploader with retry, session stores
//! - **crypto**: Session keys, XChaCha20-Poly1305 sealing, integrity hashes, key store
//! - **replay**: Loading, timeline, content reconstruction, playback driver, export
//! - **context**: Wiring of stores, pipeline, recorder and player from configuration
//! - **observability**: Tracing subscriber and metric descriptions
//! - **utils**: Configuration, errors, clocks

// Public module exports
pub mod context;
pub mod crypto;
pub mod observability;
pub mod recording;
pub mod replay;
pub mod storage;
pub mod utils;

// Re-export commonly used types
pub use context::EngineContext;
pub use recording::recorder::{Recorder, RecorderConfig};
pub use replay::player::{PlaybackConfig, Player};
pub use storage::pipeline::{PipelineConfig, StoragePipeline};
pub use storage::store::SessionStore;
pub use utils::config::EngineConfig;
pub use utils::errors::{EngineError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
