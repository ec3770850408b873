//! Durable storage for generation state.
//!
//! A [`CacheStore`] maps a session key to its serialized
//! [`GenerationState`]. The file-backed store keeps every session in one JSON
//! object (`{ "<session key>": <state> }`) and replaces the file atomically on
//! each save, so a crash mid-write never leaves a truncated cache behind.

use async_trait::async_trait;
use thiserror::Error;

use super::state::GenerationState;

#[mockall::automock]
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Loads the state stored under `key`.
    ///
    /// Returns `Ok(None)` when nothing has been stored yet.
    async fn load(&self, key: &str) -> Result<Option<GenerationState>, CacheStoreError>;

    /// Overwrites the state stored under `key`, leaving other keys untouched.
    async fn save(&self, key: &str, state: &GenerationState) -> Result<(), CacheStoreError>;
}

#[derive(Debug, Error, Clone)]
pub enum CacheStoreError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}
