// src/storage/http.rs
//! Remote session store over HTTP/JSON
//!
//! Routes:
//! - `POST   /sessions`                 create, returns `{ "sessionId": ... }`
//! - `POST   /sessions/{id}/events`     append `{ "events": [...] }`
//! - `POST   /sessions/{id}/complete`   final stats
//! - `GET    /sessions/{id}`            session plus ordered events
//! - `DELETE /sessions/{id}`
//! - `GET    /sessions?ownerId=`        list
//! - `POST   /sessions/purge`           `{ "now": ... }`, returns purged ids

use crate::storage::record::{
    EncryptedEventRecord, FinalStats, SessionMetadata, SessionRecord, StoredSession,
};
use crate::storage::store::SessionStore;
use crate::utils::config::StoreConfig;
use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedSession {
    session_id: String,
}

#[derive(Debug, Serialize)]
struct AppendRequest<'a> {
    events: &'a [EncryptedEventRecord],
}

#[derive(Debug, Serialize)]
struct PurgeRequest {
    now: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct PurgeResponse {
    purged: Vec<String>,
}

/// Session store backed by a remote HTTP API
pub struct HttpSessionStore {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpSessionStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        if config.http_base_url.is_empty() {
            return Err(EngineError::Config("store.http_base_url is not set".into()));
        }
        Self::new(
            config.http_base_url.clone(),
            Duration::from_millis(config.http_timeout_ms),
            config.http_token.clone(),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, session_id: Option<&str>) -> Result<Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| EngineError::UploadFailed(format!("Request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            if let Some(id) = session_id {
                return Err(EngineError::RecordingNotFound(id.to_string()));
            }
        }

        let message = response.text().await.unwrap_or_default();
        Err(EngineError::RemoteStatus {
            status: status.as_u16(),
            message,
        })
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| EngineError::UploadFailed(format!("Malformed response: {}", e)))
    }
}

#[async_trait]
impl SessionStore for HttpSessionStore {
    async fn create_session(&self, metadata: &SessionMetadata) -> Result<String> {
        let request = self.client.post(self.url("/sessions")).json(metadata);
        let created: CreatedSession = Self::decode(self.send(request, None).await?).await?;
        debug!("Remote session {} created", created.session_id);
        Ok(created.session_id)
    }

    async fn append_events(&self, session_id: &str, batch: &[EncryptedEventRecord]) -> Result<()> {
        let request = self
            .client
            .post(self.url(&format!("/sessions/{}/events", session_id)))
            .json(&AppendRequest { events: batch });
        self.send(request, Some(session_id)).await?;
        Ok(())
    }

    async fn complete_session(&self, session_id: &str, stats: &FinalStats) -> Result<()> {
        let request = self
            .client
            .post(self.url(&format!("/sessions/{}/complete", session_id)))
            .json(stats);
        self.send(request, Some(session_id)).await?;
        Ok(())
    }

    async fn fetch_session(&self, session_id: &str) -> Result<StoredSession> {
        let request = self.client.get(self.url(&format!("/sessions/{}", session_id)));
        Self::decode(self.send(request, Some(session_id)).await?).await
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let request = self.client.delete(self.url(&format!("/sessions/{}", session_id)));
        self.send(request, Some(session_id)).await?;
        Ok(())
    }

    async fn list_sessions(&self, owner_id: Option<&str>) -> Result<Vec<SessionRecord>> {
        let mut request = self.client.get(self.url("/sessions"));
        if let Some(owner) = owner_id {
            request = request.query(&[("ownerId", owner)]);
        }
        Self::decode(self.send(request, None).await?).await
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let request = self
            .client
            .post(self.url("/sessions/purge"))
            .json(&PurgeRequest { now });
        let response: PurgeResponse = Self::decode(self.send(request, None).await?).await?;
        Ok(response.purged)
    }
}
