// src/storage/sqlite.rs
//! Session storage using SQLite
//!
//! Stores session metadata and the append-only encrypted event log in a
//! single database file.

use crate::recording::metrics::SessionMetrics;
use crate::recording::privacy::PrivacyTier;
use crate::storage::record::{
    EncryptedEventRecord, FinalStats, SessionMetadata, SessionRecord, SessionStatus, StoredSession,
};
use crate::storage::store::{prepare_append, LogHead, SessionStore};
use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};
use ulid::Ulid;

/// SQLite-backed session store
pub struct SqliteSessionStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteSessionStore {
    /// Open (or create) the database at `path`
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    EngineError::StorageFailed(format!("Failed to create directory: {}", e))
                })?;
            }
        }

        let conn = Connection::open(path).map_err(|e| {
            EngineError::StorageFailed(format!("Failed to open database: {}", e))
        })?;

        let store = Self::with_connection(conn)?;
        info!("Session storage initialized at {:?}", path);
        Ok(store)
    }

    /// Database that lives only as long as the store
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            EngineError::StorageFailed(format!("Failed to open database: {}", e))
        })?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }
}

fn init_schema(db: &Connection) -> Result<()> {
    db.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS recording_sessions (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            document_id TEXT NOT NULL,
            title TEXT NOT NULL,
            privacy_tier TEXT NOT NULL,
            retention_days INTEGER NOT NULL,
            started_at INTEGER NOT NULL,
            ended_at INTEGER,
            status TEXT NOT NULL,
            metrics TEXT,
            encrypted INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS keystroke_events (
            session_id TEXT NOT NULL REFERENCES recording_sessions(id) ON DELETE CASCADE,
            event_id TEXT NOT NULL UNIQUE,
            sequence_number INTEGER NOT NULL,
            timestamp_ms INTEGER NOT NULL,
            event_type TEXT NOT NULL,
            ciphertext TEXT NOT NULL,
            integrity_hash TEXT NOT NULL,
            target_element TEXT,
            has_modifier_keys INTEGER NOT NULL,
            is_functional_key INTEGER NOT NULL,
            PRIMARY KEY (session_id, sequence_number)
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_owner ON recording_sessions(owner_id);
        "#,
    )
    .map_err(|e| EngineError::StorageFailed(format!("Schema creation failed: {}", e)))
}

fn sql_err(context: &str) -> impl Fn(rusqlite::Error) -> EngineError + '_ {
    move |e| EngineError::StorageFailed(format!("{}: {}", context, e))
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

const SESSION_COLUMNS: &str = "id, owner_id, document_id, title, privacy_tier, retention_days, \
     started_at, ended_at, status, metrics, encrypted, \
     (SELECT COUNT(*) FROM keystroke_events e WHERE e.session_id = recording_sessions.id)";

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    let tier: String = row.get(4)?;
    let status: String = row.get(8)?;
    let metrics: Option<String> = row.get(9)?;
    let ended_at: Option<i64> = row.get(7)?;

    Ok(SessionRecord {
        id: row.get(0)?,
        metadata: SessionMetadata {
            owner_id: row.get(1)?,
            document_id: row.get(2)?,
            title: row.get(3)?,
            privacy_tier: PrivacyTier::parse(&tier).unwrap_or(PrivacyTier::MetadataOnly),
            retention_days: row.get(5)?,
            started_at: millis_to_datetime(row.get(6)?),
            encrypted: row.get(10)?,
        },
        status: SessionStatus::parse(&status).unwrap_or(SessionStatus::Active),
        ended_at: ended_at.map(millis_to_datetime),
        metrics: metrics.and_then(|m| serde_json::from_str::<SessionMetrics>(&m).ok()),
        event_count: row.get::<_, i64>(11)? as u64,
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<EncryptedEventRecord> {
    Ok(EncryptedEventRecord {
        event_id: row.get(0)?,
        sequence_number: row.get::<_, i64>(1)? as u64,
        timestamp_ms: row.get::<_, i64>(2)? as u64,
        event_type: row.get(3)?,
        ciphertext: row.get(4)?,
        integrity_hash: row.get(5)?,
        target_element: row.get(6)?,
        has_modifier_keys: row.get(7)?,
        is_functional_key: row.get(8)?,
    })
}

fn load_session(db: &Connection, session_id: &str) -> Result<SessionRecord> {
    db.query_row(
        &format!("SELECT {} FROM recording_sessions WHERE id = ?1", SESSION_COLUMNS),
        params![session_id],
        session_from_row,
    )
    .optional()
    .map_err(sql_err("Session lookup failed"))?
    .ok_or_else(|| EngineError::RecordingNotFound(session_id.to_string()))
}

fn append_sync(db: &mut Connection, session_id: &str, batch: &[EncryptedEventRecord]) -> Result<usize> {
    let session = load_session(db, session_id)?;
    if session.status == SessionStatus::Completed {
        return Err(EngineError::LogViolation(format!(
            "session {} is completed",
            session_id
        )));
    }

    let tx = db.transaction().map_err(sql_err("Transaction failed"))?;

    let head = tx
        .query_row(
            "SELECT sequence_number, timestamp_ms FROM keystroke_events \
             WHERE session_id = ?1 ORDER BY sequence_number DESC LIMIT 1",
            params![session_id],
            |row| {
                Ok(LogHead {
                    sequence: row.get::<_, i64>(0)? as u64,
                    timestamp_ms: row.get::<_, i64>(1)? as u64,
                })
            },
        )
        .optional()
        .map_err(sql_err("Log head lookup failed"))?;

    let accepted = {
        let mut exists = tx
            .prepare("SELECT 1 FROM keystroke_events WHERE event_id = ?1")
            .map_err(sql_err("Query preparation failed"))?;
        prepare_append(
            head,
            |id| exists.exists(params![id]).map_err(sql_err("Event lookup failed")),
            batch,
        )?
    };

    {
        let mut insert = tx
            .prepare(
                r#"
                INSERT INTO keystroke_events (
                    session_id, event_id, sequence_number, timestamp_ms, event_type,
                    ciphertext, integrity_hash, target_element, has_modifier_keys, is_functional_key
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
            )
            .map_err(sql_err("Query preparation failed"))?;

        for record in &accepted {
            insert
                .execute(params![
                    session_id,
                    record.event_id,
                    record.sequence_number as i64,
                    record.timestamp_ms as i64,
                    record.event_type,
                    record.ciphertext,
                    record.integrity_hash,
                    record.target_element,
                    record.has_modifier_keys,
                    record.is_functional_key,
                ])
                .map_err(sql_err("Failed to insert event"))?;
        }
    }

    tx.commit().map_err(sql_err("Commit failed"))?;
    Ok(accepted.len())
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn create_session(&self, metadata: &SessionMetadata) -> Result<String> {
        let id = Ulid::new().to_string();
        let db = self.db.lock().await;

        db.execute(
            r#"
            INSERT INTO recording_sessions (
                id, owner_id, document_id, title, privacy_tier, retention_days,
                started_at, ended_at, status, metrics, encrypted
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8, NULL, ?9)
            "#,
            params![
                id,
                metadata.owner_id,
                metadata.document_id,
                metadata.title,
                metadata.privacy_tier.as_str(),
                metadata.retention_days,
                metadata.started_at.timestamp_millis(),
                SessionStatus::Active.as_str(),
                metadata.encrypted,
            ],
        )
        .map_err(sql_err("Failed to create session"))?;

        debug!("Created session {}", id);
        Ok(id)
    }

    async fn append_events(&self, session_id: &str, batch: &[EncryptedEventRecord]) -> Result<()> {
        let mut db = self.db.lock().await;
        let written = append_sync(&mut db, session_id, batch)?;
        debug!("Appended {} events to session {}", written, session_id);
        Ok(())
    }

    async fn complete_session(&self, session_id: &str, stats: &FinalStats) -> Result<()> {
        let metrics = serde_json::to_string(&stats.metrics)?;
        let db = self.db.lock().await;

        let updated = db
            .execute(
                "UPDATE recording_sessions SET status = ?1, ended_at = ?2, metrics = ?3 \
                 WHERE id = ?4 AND status = ?5",
                params![
                    SessionStatus::Completed.as_str(),
                    stats.ended_at.timestamp_millis(),
                    metrics,
                    session_id,
                    SessionStatus::Active.as_str(),
                ],
            )
            .map_err(sql_err("Failed to complete session"))?;

        if updated == 0 {
            // Distinguish unknown from already completed
            load_session(&db, session_id)?;
            return Err(EngineError::LogViolation(format!(
                "session {} already completed",
                session_id
            )));
        }
        Ok(())
    }

    async fn fetch_session(&self, session_id: &str) -> Result<StoredSession> {
        let db = self.db.lock().await;
        let session = load_session(&db, session_id)?;

        let mut stmt = db
            .prepare(
                "SELECT event_id, sequence_number, timestamp_ms, event_type, ciphertext, \
                 integrity_hash, target_element, has_modifier_keys, is_functional_key \
                 FROM keystroke_events WHERE session_id = ?1 ORDER BY sequence_number",
            )
            .map_err(sql_err("Query preparation failed"))?;

        let events = stmt
            .query_map(params![session_id], event_from_row)
            .map_err(sql_err("Query execution failed"))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(sql_err("Result collection failed"))?;

        Ok(StoredSession { session, events })
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let db = self.db.lock().await;
        let deleted = db
            .execute("DELETE FROM recording_sessions WHERE id = ?1", params![session_id])
            .map_err(sql_err("Failed to delete session"))?;

        if deleted == 0 {
            return Err(EngineError::RecordingNotFound(session_id.to_string()));
        }
        Ok(())
    }

    async fn list_sessions(&self, owner_id: Option<&str>) -> Result<Vec<SessionRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db
            .prepare(&format!(
                "SELECT {} FROM recording_sessions WHERE (?1 IS NULL OR owner_id = ?1) ORDER BY started_at",
                SESSION_COLUMNS
            ))
            .map_err(sql_err("Query preparation failed"))?;

        let sessions = stmt
            .query_map(params![owner_id], session_from_row)
            .map_err(sql_err("Query execution failed"))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(sql_err("Result collection failed"))?;

        Ok(sessions)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let db = self.db.lock().await;
        let mut stmt = db
            .prepare(&format!(
                "SELECT {} FROM recording_sessions WHERE status = ?1",
                SESSION_COLUMNS
            ))
            .map_err(sql_err("Query preparation failed"))?;

        let expired: Vec<String> = stmt
            .query_map(params![SessionStatus::Completed.as_str()], session_from_row)
            .map_err(sql_err("Query execution failed"))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(sql_err("Result collection failed"))?
            .into_iter()
            .filter(|s| s.is_expired(now))
            .map(|s| s.id)
            .collect();

        for id in &expired {
            db.execute("DELETE FROM recording_sessions WHERE id = ?1", params![id])
                .map_err(sql_err("Failed to purge session"))?;
        }

        if !expired.is_empty() {
            info!("Purged {} expired sessions", expired.len());
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn metadata(owner: &str, retention_days: u32) -> SessionMetadata {
        SessionMetadata {
            owner_id: owner.into(),
            document_id: "doc-1".into(),
            title: "Essay".into(),
            privacy_tier: PrivacyTier::Anonymized,
            retention_days,
            started_at: Utc::now(),
            encrypted: true,
        }
    }

    fn record(id: &str, seq: u64, ts: u64) -> EncryptedEventRecord {
        EncryptedEventRecord {
            event_id: id.into(),
            sequence_number: seq,
            timestamp_ms: ts,
            event_type: "insert".into(),
            ciphertext: format!("ct-{}", id),
            integrity_hash: format!("h-{}", id),
            target_element: Some("textarea".into()),
            has_modifier_keys: seq % 2 == 0,
            is_functional_key: false,
        }
    }

    #[tokio::test]
    async fn test_storage_creation() {
        let dir = tempdir().unwrap();
        let store = SqliteSessionStore::open(&dir.path().join("nested/sessions.db")).await;
        assert!(store.is_ok());
    }

    #[tokio::test]
    async fn test_append_fetch_round_trip() {
        let store = SqliteSessionStore::in_memory().unwrap();
        let id = store.create_session(&metadata("alice", 30)).await.unwrap();

        store
            .append_events(&id, &[record("a", 1, 0), record("b", 2, 100)])
            .await
            .unwrap();
        store.append_events(&id, &[record("c", 3, 100)]).await.unwrap();

        let stored = store.fetch_session(&id).await.unwrap();
        assert_eq!(stored.session.metadata.owner_id, "alice");
        assert_eq!(stored.session.metadata.privacy_tier, PrivacyTier::Anonymized);
        assert_eq!(stored.session.event_count, 3);
        assert_eq!(stored.events.len(), 3);
        assert_eq!(stored.events[1], record("b", 2, 100));
    }

    #[tokio::test]
    async fn test_retried_batch_is_idempotent() {
        let store = SqliteSessionStore::in_memory().unwrap();
        let id = store.create_session(&metadata("alice", 30)).await.unwrap();
        let batch = vec![record("a", 1, 0), record("b", 2, 10)];

        store.append_events(&id, &batch).await.unwrap();
        store.append_events(&id, &batch).await.unwrap();

        assert_eq!(store.fetch_session(&id).await.unwrap().events.len(), 2);
    }

    #[tokio::test]
    async fn test_rejects_out_of_order_batch() {
        let store = SqliteSessionStore::in_memory().unwrap();
        let id = store.create_session(&metadata("alice", 30)).await.unwrap();
        store.append_events(&id, &[record("a", 5, 50)]).await.unwrap();

        let err = store.append_events(&id, &[record("b", 4, 60)]).await;
        assert!(err.is_err());
        // Nothing from the rejected batch was written
        assert_eq!(store.fetch_session(&id).await.unwrap().events.len(), 1);
    }

    #[tokio::test]
    async fn test_complete_and_immutability() {
        let store = SqliteSessionStore::in_memory().unwrap();
        let id = store.create_session(&metadata("alice", 30)).await.unwrap();
        let stats = FinalStats {
            ended_at: Utc::now(),
            metrics: SessionMetrics { keystroke_count: 12, ..Default::default() },
        };

        store.complete_session(&id, &stats).await.unwrap();
        let stored = store.fetch_session(&id).await.unwrap();
        assert_eq!(stored.session.status, SessionStatus::Completed);
        assert_eq!(stored.session.metrics.unwrap().keystroke_count, 12);

        assert!(matches!(
            store.complete_session(&id, &stats).await,
            Err(EngineError::LogViolation(_))
        ));
        assert!(matches!(
            store.append_events(&id, &[record("z", 1, 0)]).await,
            Err(EngineError::LogViolation(_))
        ));
        assert!(matches!(
            store.complete_session("missing", &stats).await,
            Err(EngineError::RecordingNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let store = SqliteSessionStore::in_memory().unwrap();
        let id = store.create_session(&metadata("alice", 30)).await.unwrap();
        store.append_events(&id, &[record("a", 1, 0)]).await.unwrap();

        store.delete_session(&id).await.unwrap();
        assert!(matches!(
            store.fetch_session(&id).await,
            Err(EngineError::RecordingNotFound(_))
        ));
        assert!(store.delete_session(&id).await.is_err());

        // Event ids are free again after the cascade
        let id2 = store.create_session(&metadata("alice", 30)).await.unwrap();
        store.append_events(&id2, &[record("a", 1, 0)]).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_and_purge() {
        let store = SqliteSessionStore::in_memory().unwrap();
        let old = store.create_session(&metadata("alice", 7)).await.unwrap();
        let _fresh = store.create_session(&metadata("bob", 7)).await.unwrap();

        assert_eq!(store.list_sessions(None).await.unwrap().len(), 2);
        assert_eq!(store.list_sessions(Some("bob")).await.unwrap().len(), 1);

        store
            .complete_session(
                &old,
                &FinalStats {
                    ended_at: Utc::now() - Duration::days(8),
                    metrics: SessionMetrics::default(),
                },
            )
            .await
            .unwrap();

        let purged = store.purge_expired(Utc::now()).await.unwrap();
        assert_eq!(purged, vec![old]);
        assert_eq!(store.list_sessions(None).await.unwrap().len(), 1);
    }
}
