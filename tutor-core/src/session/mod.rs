//! # Generation session
//!
//! One [`GenerationSession`] owns the single [`state::GenerationState`] of the
//! service. The state sits behind a `tokio` mutex: [`GenerationSession::lock`]
//! hands out a [`SessionGuard`] that is held from generation until the state
//! has been persisted, so only one generation runs at a time and durable
//! writes never interleave.
//!
//! ## Reset policy
//!
//! Two optional limits keep the state from growing without bound:
//!
//! - `ttl`: a state idle for longer than this is replaced by a fresh one when
//!   the next invocation locks the session
//! - `max_exchanges`: after a commit only the newest exchanges are retained

pub mod in_memory;
pub mod local_fs;
pub mod state;
pub mod store;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use state::GenerationState;
use store::{CacheStore, CacheStoreError};

pub struct GenerationSession {
    key: String,
    state: Mutex<GenerationState>,
    store: Arc<dyn CacheStore>,
    ttl: Option<Duration>,
    max_exchanges: Option<usize>,
}

impl GenerationSession {
    pub fn new(key: impl Into<String>, state: GenerationState, store: Arc<dyn CacheStore>) -> Self {
        Self {
            key: key.into(),
            state: Mutex::new(state),
            store,
            ttl: None,
            max_exchanges: None,
        }
    }

    /// Loads the stored state for `key`, or starts fresh when none exists.
    pub async fn restore(
        key: impl Into<String>,
        store: Arc<dyn CacheStore>,
    ) -> Result<Self, CacheStoreError> {
        let key = key.into();
        let state = match store.load(&key).await? {
            Some(state) => {
                info!("restored generation state '{}' ({} exchanges)", key, state.len());
                state
            }
            None => {
                info!("no stored generation state for '{}', starting fresh", key);
                GenerationState::new()
            }
        };
        Ok(Self::new(key, state, store))
    }

    pub fn with_reset_policy(mut self, ttl: Option<Duration>, max_exchanges: Option<usize>) -> Self {
        self.ttl = ttl;
        self.max_exchanges = max_exchanges;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Waits for exclusive access to the state.
    pub async fn lock(&self) -> SessionGuard<'_> {
        let mut state = self.state.lock().await;
        if let Some(ttl) = self.ttl {
            if state.is_expired(ttl, Utc::now()) {
                info!("generation state '{}' idle past ttl, resetting", self.key);
                *state = GenerationState::new();
            }
        }
        SessionGuard {
            session: self,
            state,
        }
    }

    pub async fn snapshot(&self) -> GenerationState {
        self.state.lock().await.clone()
    }

    pub async fn exchange_count(&self) -> usize {
        self.state.lock().await.len()
    }
}

/// Exclusive handle on the session state.
pub struct SessionGuard<'a> {
    session: &'a GenerationSession,
    state: MutexGuard<'a, GenerationState>,
}

impl SessionGuard<'_> {
    pub fn state(&self) -> &GenerationState {
        &self.state
    }

    /// Records a completed generation, then applies the exchange cap.
    pub fn commit(&mut self, prompt: impl Into<String>, completion: impl Into<String>) {
        self.state.commit(prompt, completion);
        if let Some(max) = self.session.max_exchanges {
            let dropped = self.state.retain_latest(max);
            if dropped > 0 {
                debug!("dropped {} cached exchanges", dropped);
            }
        }
    }

    /// Writes the current state to the session's store.
    pub async fn persist(&self) -> Result<(), CacheStoreError> {
        self.session.store.save(&self.session.key, &self.state).await
    }
}
