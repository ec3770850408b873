use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One prompt and the completion generated for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedExchange {
    pub prompt: String,
    pub completion: String,
}

impl CachedExchange {
    /// Full decoded sequence: the prompt followed by its completion.
    pub fn sequence(&self) -> String {
        format!("{}{}", self.prompt, self.completion)
    }
}

/// Incremental decoding cache carried across pipeline invocations.
///
/// The state only ever grows through [`GenerationState::commit`]; the
/// reset policy (TTL, exchange cap) is applied by the session that owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationState {
    #[serde(default)]
    exchanges: Vec<CachedExchange>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Default for GenerationState {
    fn default() -> Self {
        Self::new()
    }
}

impl GenerationState {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            exchanges: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn exchanges(&self) -> &[CachedExchange] {
        &self.exchanges
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Records a finished generation.
    pub fn commit(&mut self, prompt: impl Into<String>, completion: impl Into<String>) {
        self.exchanges.push(CachedExchange {
            prompt: prompt.into(),
            completion: completion.into(),
        });
        self.updated_at = Utc::now();
    }

    /// The sequence most recently held by the decoding cache.
    pub fn last_sequence(&self) -> Option<String> {
        self.exchanges.last().map(CachedExchange::sequence)
    }

    /// Everything the decoding cache holds, oldest exchange first.
    pub fn transcript(&self) -> String {
        self.exchanges.iter().map(CachedExchange::sequence).collect()
    }

    /// Full input for continuing the cache with `prompt`.
    pub fn continuation(&self, prompt: &str) -> String {
        let mut input = self.transcript();
        input.push_str(prompt);
        input
    }

    /// True when the state has been idle for longer than `ttl`.
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now - self.updated_at > ttl,
            Err(_) => false,
        }
    }

    /// Drops the oldest exchanges so that at most `max` remain.
    pub fn retain_latest(&mut self, max: usize) -> usize {
        let excess = self.exchanges.len().saturating_sub(max);
        if excess > 0 {
            self.exchanges.drain(..excess);
        }
        excess
    }
}
