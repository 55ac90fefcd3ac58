// src/utils/config.rs
//! Engine configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! `keytrace.{toml,yaml,json}` file (or an explicit path), then environment
//! variables such as `KEYTRACE__PIPELINE__BATCH_SIZE=100`.

use crate::recording::recorder::RecorderConfig;
use crate::replay::player::PlaybackConfig;
use crate::storage::pipeline::PipelineConfig;
use crate::utils::errors::{EngineError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which `SessionStore` implementation backs the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Sqlite,
    Memory,
    Http,
}

/// Remote/local session store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// SQLite database file (sqlite backend)
    pub sqlite_path: PathBuf,

    /// Base URL of the session API (http backend)
    pub http_base_url: String,

    /// Per-request timeout (http backend)
    pub http_timeout_ms: u64,

    /// Bearer token sent to the session API, if any
    pub http_token: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            sqlite_path: PathBuf::from("keytrace-data/sessions.db"),
            http_base_url: "http://localhost:8080/api".to_string(),
            http_timeout_ms: 10_000,
            http_token: None,
        }
    }
}

/// Key material locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// File holding the base64 master key (created on first use)
    pub master_key_path: PathBuf,

    /// SQLite file holding wrapped session keys
    pub keystore_path: PathBuf,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            master_key_path: PathBuf::from("keytrace-data/master.key"),
            keystore_path: PathBuf::from("keytrace-data/keys.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub recorder: RecorderConfig,
    pub pipeline: PipelineConfig,
    pub playback: PlaybackConfig,
    pub store: StoreConfig,
    pub crypto: CryptoConfig,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from `keytrace.*` in the working directory and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration, optionally from an explicit file
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name("keytrace").required(false)),
        };

        let config: EngineConfig = builder
            .add_source(Environment::with_prefix("KEYTRACE").separator("__"))
            .build()
            .map_err(|e| EngineError::Config(format!("Failed to read configuration: {}", e)))?
            .try_deserialize()
            .map_err(|e| EngineError::Config(format!("Invalid configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.recorder.buffer_size == 0 {
            return Err(EngineError::Config("recorder.buffer_size must be > 0".into()));
        }
        if self.pipeline.batch_size == 0 {
            return Err(EngineError::Config("pipeline.batch_size must be > 0".into()));
        }
        if self.pipeline.max_retries == 0 {
            return Err(EngineError::Config("pipeline.max_retries must be > 0".into()));
        }
        if self.pipeline.max_pending_events < self.pipeline.batch_size {
            return Err(EngineError::Config(
                "pipeline.max_pending_events must be >= pipeline.batch_size".into(),
            ));
        }
        if self.pipeline.upload_interval_ms == 0 || self.playback.tick_interval_ms == 0 {
            return Err(EngineError::Config("intervals must be > 0".into()));
        }

        let playback = &self.playback;
        if !(playback.min_speed.is_finite() && playback.max_speed.is_finite())
            || playback.min_speed <= 0.0
            || playback.min_speed > playback.max_speed
        {
            return Err(EngineError::Config(format!(
                "playback speed range [{}, {}] is invalid",
                playback.min_speed, playback.max_speed
            )));
        }

        Ok(())
    }
}
