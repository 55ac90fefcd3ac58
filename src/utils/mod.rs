// src/utils/mod.rs
//! Common utilities shared across the engine

pub mod clock;
pub mod config;
pub mod errors;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use errors::{CryptoError, EngineError, Result};
