// src/context.rs
//! Engine wiring
//!
//! Builds the session store, key store and storage pipeline described by an
//! [`EngineConfig`] and hands out recorders, loaders and players over them.

use crate::crypto::keys::MasterKey;
use crate::crypto::keystore::KeyStore;
use crate::recording::recorder::Recorder;
use crate::replay::loader::RecordingLoader;
use crate::replay::player::Player;
use crate::storage::http::HttpSessionStore;
use crate::storage::memory::MemorySessionStore;
use crate::storage::pipeline::StoragePipeline;
use crate::storage::sqlite::SqliteSessionStore;
use crate::storage::store::SessionStore;
use crate::utils::clock::{Clock, SystemClock};
use crate::utils::config::{EngineConfig, StoreBackend};
use crate::utils::errors::{EngineError, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

pub struct EngineContext {
    config: EngineConfig,
    store: Arc<dyn SessionStore>,
    keys: Arc<KeyStore>,
    pipeline: Arc<StoragePipeline>,
}

impl EngineContext {
    /// Open the stores named by `config`
    pub async fn open(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let store: Arc<dyn SessionStore> = match config.store.backend {
            StoreBackend::Sqlite => Arc::new(SqliteSessionStore::open(&config.store.sqlite_path).await?),
            StoreBackend::Memory => Arc::new(MemorySessionStore::new()),
            StoreBackend::Http => Arc::new(HttpSessionStore::from_config(&config.store)?),
        };

        let keys = match config.store.backend {
            // Keys would outlive the events they protect
            StoreBackend::Memory => KeyStore::in_memory(&MasterKey::generate())?,
            _ => {
                let master = MasterKey::load_or_create(&config.crypto.master_key_path)?;
                KeyStore::open(&config.crypto.keystore_path, &master)?
            }
        };

        info!("Engine context opened with {:?} store", config.store.backend);
        Ok(Self::with_parts(config, store, Arc::new(keys)))
    }

    /// Assemble a context from already-open stores
    pub fn with_parts(config: EngineConfig, store: Arc<dyn SessionStore>, keys: Arc<KeyStore>) -> Self {
        let pipeline = Arc::new(StoragePipeline::new(
            Arc::clone(&store),
            Arc::clone(&keys),
            config.pipeline.clone(),
        ));

        Self {
            config,
            store,
            keys,
            pipeline,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn keys(&self) -> &Arc<KeyStore> {
        &self.keys
    }

    pub fn pipeline(&self) -> &Arc<StoragePipeline> {
        &self.pipeline
    }

    /// Recorder on the wall clock
    pub fn recorder(&self) -> Recorder {
        self.recorder_with_clock(Arc::new(SystemClock::new()))
    }

    pub fn recorder_with_clock(&self, clock: Arc<dyn Clock>) -> Recorder {
        Recorder::new(self.config.recorder.clone(), Arc::clone(&self.pipeline), clock)
    }

    pub fn loader(&self) -> RecordingLoader {
        RecordingLoader::new(Arc::clone(&self.store), Arc::clone(&self.keys))
    }

    pub fn player(&self) -> Player {
        Player::new(self.config.playback.clone())
    }

    /// Delete a recording together with its session key
    pub async fn delete_recording(&self, session_id: &str) -> Result<()> {
        if self.pipeline.active_session().as_deref() == Some(session_id) {
            return Err(EngineError::SessionAlreadyActive(session_id.to_string()));
        }

        self.store.delete_session(session_id).await?;
        if !self.keys.remove(session_id)? {
            warn!("No session key stored for deleted recording {}", session_id);
        }
        info!("Deleted recording {}", session_id);
        Ok(())
    }

    /// Purge recordings past retention and drop their keys
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let purged = self.store.purge_expired(now).await?;
        for session_id in &purged {
            if let Err(e) = self.keys.remove(session_id) {
                warn!("Failed to remove key of purged recording {}: {}", session_id, e);
            }
        }
        info!("Purged {} expired recordings", purged.len());
        Ok(purged)
    }
}
