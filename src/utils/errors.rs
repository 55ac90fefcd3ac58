// src/utils/errors.rs
//! Engine error types

use thiserror::Error;

/// Result alias used throughout the engine
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised by the crypto layer
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Authentication tag did not verify (tampered or corrupted data)
    #[error("decryption failed: authentication tag mismatch")]
    Decryption,

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Malformed base64 or truncated ciphertext
    #[error("malformed ciphertext: {0}")]
    Encoding(String),

    #[error("key store error: {0}")]
    KeyStore(String),

    #[error("no key stored for session {0}")]
    KeyNotFound(String),
}

/// Top-level engine error
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("a recording session is already active: {0}")]
    SessionAlreadyActive(String),

    #[error("no active recording session")]
    NoActiveSession,

    #[error("no recording loaded")]
    NoRecordingLoaded,

    #[error("recording not found: {0}")]
    RecordingNotFound(String),

    #[error("invalid playback speed: {0}")]
    InvalidSpeed(f64),

    #[error("storage failed: {0}")]
    StorageFailed(String),

    /// The store refused a write that can never succeed as sent
    #[error("event log rejected write: {0}")]
    LogViolation(String),

    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("remote store returned {status}: {message}")]
    RemoteStatus { status: u16, message: String },

    #[error("integrity check failed for event {0}")]
    IntegrityMismatch(String),

    #[error("compression failed: {0}")]
    CompressionFailed(String),

    #[error("export failed: {0}")]
    ExportFailed(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("playback driver stopped")]
    DriverStopped,

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether retrying the same request could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::UploadFailed(_) | EngineError::StorageFailed(_) => true,
            EngineError::RemoteStatus { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(EngineError::UploadFailed("timeout".into()).is_transient());
        assert!(EngineError::RemoteStatus { status: 503, message: String::new() }.is_transient());
        assert!(!EngineError::RemoteStatus { status: 400, message: String::new() }.is_transient());
        assert!(!EngineError::NoRecordingLoaded.is_transient());
        assert!(!EngineError::LogViolation("sequence regression".into()).is_transient());
        assert!(EngineError::StorageFailed("database is locked".into()).is_transient());
    }

    #[test]
    fn test_crypto_error_converts() {
        let err: EngineError = CryptoError::Decryption.into();
        assert!(err.to_string().contains("authentication tag"));
    }
}
