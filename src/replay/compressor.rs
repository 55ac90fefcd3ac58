// src/replay/compressor.rs
//! zstd compression for recording archives

use crate::utils::errors::{EngineError, Result};
use tracing::debug;

/// Compression levels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompressionLevel {
    /// Level 1
    Fast,

    /// Level 3
    #[default]
    Balanced,

    /// Level 19
    Best,
}

impl CompressionLevel {
    pub fn as_i32(&self) -> i32 {
        match self {
            CompressionLevel::Fast => 1,
            CompressionLevel::Balanced => 3,
            CompressionLevel::Best => 19,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Compressor {
    level: CompressionLevel,
}

impl Compressor {
    pub fn new(level: CompressionLevel) -> Self {
        Self { level }
    }

    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let compressed = zstd::encode_all(data, self.level.as_i32())
            .map_err(|e| EngineError::CompressionFailed(format!("Compression error: {}", e)))?;

        debug!(
            "Compressed {} bytes -> {} bytes (ratio: {:.2}x)",
            data.len(),
            compressed.len(),
            data.len() as f64 / compressed.len().max(1) as f64
        );
        Ok(compressed)
    }

    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        zstd::decode_all(data)
            .map_err(|e| EngineError::CompressionFailed(format!("Decompression error: {}", e)))
    }
}
