// src/recording/mod.rs
//! Keystroke capture
//!
//! - **Events**: raw editor input normalized into sequenced keystroke events
//! - **Privacy**: tiered redaction applied before anything is buffered
//! - **Metrics**: running keystroke, character, pause and WPM counts
//! - **Recorder**: session state machine feeding the storage pipeline
//!
//! # Architecture
//!
//! ```text
//! Editor → handle_input() → normalize → metrics → privacy filter → buffer
//!                                                                    ↓
//!                                                  StoragePipeline::add_event
//! ```

pub mod event;
pub mod metrics;
pub mod privacy;
pub mod recorder;
pub mod session;

// Re-export commonly used types
pub use event::{
    DeleteDirection, EventKind, EventPayload, KeystrokeEvent, Modifiers, RawInputEvent, Selection,
};
pub use metrics::{MetricsTracker, SessionMetrics};
pub use privacy::{apply_privacy, mask_text, PrivacyTier};
pub use recorder::{Recorder, RecorderConfig, RecorderState, RecorderStatus};
pub use session::RecordingSession;
