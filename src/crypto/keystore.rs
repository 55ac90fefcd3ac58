// src/crypto/keystore.rs
//! Local store for wrapped session keys
//!
//! Session keys never travel with the event log. Each one is sealed under a
//! wrapping key derived from the master key (HKDF-SHA256) and kept in a local
//! SQLite table keyed by session id.

use crate::crypto::cipher::NONCE_LEN;
use crate::crypto::keys::{MasterKey, SessionKey, KEY_LEN};
use crate::utils::errors::CryptoError;
use chacha20poly1305::aead::{Aead, Payload};
use chacha20poly1305::{Key, KeyInit, XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::Sha256;
use std::path::Path;
use tracing::debug;
use zeroize::Zeroize;

const WRAP_INFO: &[u8] = b"keytrace-session-key-wrap-v1";

/// SQLite-backed session key store
pub struct KeyStore {
    conn: Mutex<Connection>,
    wrapping: XChaCha20Poly1305,
}

impl KeyStore {
    /// Open (or create) a key store file
    pub fn open(path: &Path, master: &MasterKey) -> Result<Self, CryptoError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CryptoError::KeyStore(format!("Failed to create key store directory: {}", e))
            })?;
        }
        let conn = Connection::open(path)
            .map_err(|e| CryptoError::KeyStore(format!("Failed to open key store: {}", e)))?;
        Self::with_connection(conn, master)
    }

    /// Key store living only in memory
    pub fn in_memory(master: &MasterKey) -> Result<Self, CryptoError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| CryptoError::KeyStore(format!("Failed to open key store: {}", e)))?;
        Self::with_connection(conn, master)
    }

    fn with_connection(conn: Connection, master: &MasterKey) -> Result<Self, CryptoError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS session_keys (
                session_id TEXT PRIMARY KEY,
                wrapped_key BLOB NOT NULL,
                wrap_nonce BLOB NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
            [],
        )
        .map_err(|e| CryptoError::KeyStore(format!("Schema creation failed: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(conn),
            wrapping: derive_wrapping_cipher(master)?,
        })
    }

    /// Store the key for `session_id`, replacing any previous one
    pub fn put(&self, session_id: &str, key: &SessionKey) -> Result<(), CryptoError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let wrapped = self
            .wrapping
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: key.as_bytes(),
                    aad: session_id.as_bytes(),
                },
            )
            .map_err(|e| CryptoError::Encryption(format!("{:?}", e)))?;

        self.conn
            .lock()
            .execute(
                "INSERT OR REPLACE INTO session_keys (session_id, wrapped_key, wrap_nonce, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![session_id, wrapped, &nonce[..], chrono::Utc::now().timestamp_millis()],
            )
            .map_err(|e| CryptoError::KeyStore(format!("Failed to store key: {}", e)))?;

        debug!("Stored wrapped key for session {}", session_id);
        Ok(())
    }

    /// Unwrap the key for `session_id`
    pub fn get(&self, session_id: &str) -> Result<SessionKey, CryptoError> {
        let row: Option<(Vec<u8>, Vec<u8>)> = self
            .conn
            .lock()
            .query_row(
                "SELECT wrapped_key, wrap_nonce FROM session_keys WHERE session_id = ?1",
                params![session_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()
            .map_err(|e| CryptoError::KeyStore(format!("Failed to read key: {}", e)))?;

        let (wrapped, nonce) = row.ok_or_else(|| CryptoError::KeyNotFound(session_id.to_string()))?;
        if nonce.len() != NONCE_LEN {
            return Err(CryptoError::Encoding("stored nonce has wrong length".into()));
        }

        let mut plain = self
            .wrapping
            .decrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: &wrapped,
                    aad: session_id.as_bytes(),
                },
            )
            .map_err(|_| CryptoError::Decryption)?;

        if plain.len() != KEY_LEN {
            plain.zeroize();
            return Err(CryptoError::InvalidKey("unwrapped key has wrong length".into()));
        }

        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&plain);
        plain.zeroize();
        Ok(SessionKey::from_bytes(bytes))
    }

    /// Forget the key for `session_id`; the session's ciphertexts become unreadable
    pub fn remove(&self, session_id: &str) -> Result<bool, CryptoError> {
        let removed = self
            .conn
            .lock()
            .execute("DELETE FROM session_keys WHERE session_id = ?1", params![session_id])
            .map_err(|e| CryptoError::KeyStore(format!("Failed to delete key: {}", e)))?;
        Ok(removed > 0)
    }
}

fn derive_wrapping_cipher(master: &MasterKey) -> Result<XChaCha20Poly1305, CryptoError> {
    let hk = Hkdf::<Sha256>::new(None, master.as_bytes());
    let mut okm = [0u8; KEY_LEN];
    hk.expand(WRAP_INFO, &mut okm)
        .map_err(|e| CryptoError::KeyStore(format!("hkdf expand failed: {:?}", e)))?;
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&okm));
    okm.zeroize();
    Ok(cipher)
}
