// src/crypto/cipher.rs
//! Authenticated encryption and content hashing
//!
//! Ciphertexts are `base64(nonce ‖ ciphertext ‖ tag)` using XChaCha20-Poly1305
//! with a fresh 24-byte nonce per call. The 192-bit nonce makes random
//! generation safe for the lifetime of a key.

use crate::crypto::keys::SessionKey;
use crate::utils::errors::CryptoError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{Key, KeyInit, XChaCha20Poly1305, XNonce};
use once_cell::sync::OnceCell;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Nonce length for XChaCha20-Poly1305
pub const NONCE_LEN: usize = 24;

/// Poly1305 tag length
const TAG_LEN: usize = 16;

/// Cipher bound to a lazily created, session-scoped default key
#[derive(Default)]
pub struct SessionCipher {
    default_key: OnceCell<SessionKey>,
}

impl SessionCipher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cipher whose default key is already known (e.g. loaded from the key store)
    pub fn with_key(key: SessionKey) -> Self {
        let default_key = OnceCell::new();
        let _ = default_key.set(key);
        Self { default_key }
    }

    /// The session key, created on first use
    pub fn session_key(&self) -> &SessionKey {
        self.default_key.get_or_init(|| {
            debug!("Creating session-scoped encryption key");
            SessionKey::generate()
        })
    }

    /// Encrypt `plaintext` with `key`, or the session key when `None`
    pub fn encrypt(&self, plaintext: &[u8], key: Option<&SessionKey>) -> Result<String, CryptoError> {
        let key = key.unwrap_or_else(|| self.session_key());
        encrypt(plaintext, key)
    }

    /// Decrypt a value produced by [`SessionCipher::encrypt`]
    pub fn decrypt(&self, ciphertext: &str, key: Option<&SessionKey>) -> Result<Vec<u8>, CryptoError> {
        let key = key.unwrap_or_else(|| self.session_key());
        decrypt(ciphertext, key)
    }

    pub fn encrypt_str(&self, plaintext: &str, key: Option<&SessionKey>) -> Result<String, CryptoError> {
        self.encrypt(plaintext.as_bytes(), key)
    }

    pub fn decrypt_str(&self, ciphertext: &str, key: Option<&SessionKey>) -> Result<String, CryptoError> {
        let bytes = self.decrypt(ciphertext, key)?;
        String::from_utf8(bytes).map_err(|e| CryptoError::Encoding(format!("invalid utf-8: {}", e)))
    }
}

fn aead(key: &SessionKey) -> XChaCha20Poly1305 {
    XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()))
}

/// Encrypt with an explicit key
pub fn encrypt(plaintext: &[u8], key: &SessionKey) -> Result<String, CryptoError> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let sealed = aead(key)
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::Encryption(format!("{:?}", e)))?;

    let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(STANDARD.encode(out))
}

/// Decrypt with an explicit key
pub fn decrypt(ciphertext: &str, key: &SessionKey) -> Result<Vec<u8>, CryptoError> {
    let raw = STANDARD
        .decode(ciphertext)
        .map_err(|e| CryptoError::Encoding(format!("bad base64: {}", e)))?;

    if raw.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::Encoding(format!(
            "ciphertext too short ({} bytes)",
            raw.len()
        )));
    }

    let (nonce, sealed) = raw.split_at(NONCE_LEN);
    aead(key)
        .decrypt(XNonce::from_slice(nonce), sealed)
        .map_err(|_| CryptoError::Decryption)
}

/// SHA-256 of `input` as lowercase hex
pub fn hash_string(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}
