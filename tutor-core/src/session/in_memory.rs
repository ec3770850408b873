use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use super::state::GenerationState;
use super::store::{CacheStore, CacheStoreError};

/// Process-local cache store, used when no cache file is configured.
///
/// Clones share the same map.
#[derive(Clone, Default)]
pub struct InMemoryCacheStore {
    states: Arc<DashMap<String, GenerationState>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn load(&self, key: &str) -> Result<Option<GenerationState>, CacheStoreError> {
        Ok(self.states.get(key).map(|state| state.clone()))
    }

    async fn save(&self, key: &str, state: &GenerationState) -> Result<(), CacheStoreError> {
        self.states.insert(key.to_string(), state.clone());
        Ok(())
    }
}
