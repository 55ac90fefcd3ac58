// src/crypto/keys.rs
//! Symmetric key lifecycle
//!
//! Session keys are 256-bit, generated from the OS RNG and zeroized on drop.
//! Exported form is base64 and is only ever written to the local key store.

use crate::utils::errors::CryptoError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::info;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Key length in bytes
pub const KEY_LEN: usize = 32;

/// Ephemeral, session-scoped symmetric key
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; KEY_LEN]);

impl SessionKey {
    /// Generate a fresh random key
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Export as base64 for local persistence
    pub fn export(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Import a key previously produced by [`SessionKey::export`]
    pub fn import(encoded: &str) -> Result<Self, CryptoError> {
        let mut decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("bad base64: {}", e)))?;

        if decoded.len() != KEY_LEN {
            let len = decoded.len();
            decoded.zeroize();
            return Err(CryptoError::InvalidKey(format!(
                "expected {} bytes, got {}",
                KEY_LEN, len
            )));
        }

        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self(bytes))
    }
}

// Never print key material
impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Free-function form of the key lifecycle
pub fn generate_key() -> SessionKey {
    SessionKey::generate()
}

pub fn export_key(key: &SessionKey) -> String {
    key.export()
}

pub fn import_key(encoded: &str) -> Result<SessionKey, CryptoError> {
    SessionKey::import(encoded)
}

/// Master key that wraps session keys in the key store
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; KEY_LEN]);

impl MasterKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Read the master key from `path`, creating it on first use
    pub fn load_or_create(path: &Path) -> Result<Self, CryptoError> {
        if path.exists() {
            let encoded = fs::read_to_string(path)
                .map_err(|e| CryptoError::KeyStore(format!("Failed to read master key: {}", e)))?;
            let key = SessionKey::import(&encoded)?;
            return Ok(Self(*key.as_bytes()));
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CryptoError::KeyStore(format!("Failed to create key directory: {}", e))
            })?;
        }

        let key = Self::generate();
        fs::write(path, STANDARD.encode(key.0))
            .map_err(|e| CryptoError::KeyStore(format!("Failed to write master key: {}", e)))?;
        restrict_permissions(path)?;

        info!("Generated new master key at {:?}", path);
        Ok(key)
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), CryptoError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .map_err(|e| CryptoError::KeyStore(format!("Failed to restrict master key: {}", e)))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), CryptoError> {
    Ok(())
}
