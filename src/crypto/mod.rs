// src/crypto/mod.rs
//! Key lifecycle, authenticated encryption and integrity hashing
//!
//! - **Keys**: 256-bit session keys, zeroized on drop, base64 export for local use only
//! - **Cipher**: XChaCha20-Poly1305, `base64(nonce ‖ ciphertext)`, random nonce per call
//! - **Hashing**: SHA-256 over ciphertext, checkable without the key
//! - **Key Store**: session keys wrapped under a master key in SQLite

pub mod cipher;
pub mod keys;
pub mod keystore;

// Re-export commonly used types
pub use cipher::{decrypt, encrypt, hash_string, SessionCipher};
pub use keys::{export_key, generate_key, import_key, MasterKey, SessionKey};
pub use keystore::KeyStore;
