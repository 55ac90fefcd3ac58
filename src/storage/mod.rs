// src/storage/mod.rs
//! Encrypted batch upload and session persistence
//!
//! - **Pipeline**: bounded pending queue, background uploader, linear-backoff retry
//! - **Records**: per-event encrypted wire shape plus session metadata
//! - **Stores**: `SessionStore` over SQLite, process memory or HTTP
//!
//! # Architecture
//!
//! ```text
//! Recorder → add_event() → Pending Queue → Uploader (interval | batch full)
//!                                               ↓
//!                                   seal each event (XChaCha20-Poly1305)
//!                                               ↓
//!                                   append_events() with retry
//!                                               ↓
//!                                         SessionStore
//! ```

pub mod event_queue;
pub mod http;
pub mod memory;
pub mod pipeline;
pub mod record;
pub mod retry;
pub mod sqlite;
pub mod store;

// Re-export commonly used types
pub use event_queue::{PendingQueue, QueueStats};
pub use http::HttpSessionStore;
pub use memory::MemorySessionStore;
pub use pipeline::{ActiveUpload, PipelineConfig, StoragePipeline, UploadReport, UploadStatus};
pub use record::{
    EncryptedEventRecord, EventBody, FinalStats, SessionMetadata, SessionRecord, SessionStatus,
    StoredSession,
};
pub use retry::RetryPolicy;
pub use sqlite::SqliteSessionStore;
pub use store::SessionStore;
