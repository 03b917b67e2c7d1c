use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::shared::clock::Clock;

#[derive(Debug, Clone)]
struct CacheEntry {
    response: String,
    created_at: DateTime<Utc>,
    /// Original query text, kept for diagnostics
    query: String,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate_percent: f64,
    pub ttl: Duration,
}

/// TTL-bounded cache of final answers keyed by normalized query.
///
/// Expiry is checked lazily on read. All operations take the same lock, so
/// counters and entries stay consistent under concurrent requests.
pub struct ResponseCache {
    state: Mutex<CacheState>,
    ttl: Duration,
    namespace: String,
    clock: Arc<dyn Clock>,
}

impl ResponseCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            ttl,
            namespace: String::new(),
            clock,
        }
    }

    /// Salt every key, e.g. with the toolset version, so answers computed
    /// against a different toolset are never served
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn normalize(query: &str) -> String {
        query.trim().to_lowercase()
    }

    pub fn key_for(&self, query: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.namespace.as_bytes());
        hasher.update(b"\n");
        hasher.update(Self::normalize(query).as_bytes());
        hex::encode(hasher.finalize())
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // Cache state is plain data; a panic elsewhere cannot leave it half-written
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        let age = (now - entry.created_at).to_std().unwrap_or(Duration::ZERO);
        age < self.ttl
    }

    pub fn get(&self, query: &str) -> Option<String> {
        let key = self.key_for(query);
        let now = self.clock.now();
        let mut state = self.lock();

        let fresh = match state.entries.get(&key) {
            Some(entry) if self.is_fresh(entry, now) => Some(entry.response.clone()),
            Some(entry) => {
                tracing::debug!(query = %entry.query, "Cache entry expired");
                state.entries.remove(&key);
                None
            }
            None => None,
        };

        match fresh {
            Some(response) => {
                state.hits += 1;
                tracing::debug!("Cache hit for key {}", &key[..12]);
                Some(response)
            }
            None => {
                state.misses += 1;
                tracing::debug!("Cache miss for key {}", &key[..12]);
                None
            }
        }
    }

    pub fn put(&self, query: &str, response: impl Into<String>) {
        let entry = CacheEntry {
            response: response.into(),
            created_at: self.clock.now(),
            query: query.to_string(),
        };
        let key = self.key_for(query);
        self.lock().entries.insert(key, entry);
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let lookups = state.hits + state.misses;
        let hit_rate_percent = if lookups == 0 {
            0.0
        } else {
            100.0 * state.hits as f64 / lookups as f64
        };

        CacheStats {
            size: state.entries.len(),
            hits: state.hits,
            misses: state.misses,
            hit_rate_percent,
            ttl: self.ttl,
        }
    }

    /// Drop every entry and reset the counters
    pub fn clear(&self) {
        let mut state = self.lock();
        let dropped = state.entries.len();
        *state = CacheState::default();
        tracing::info!("Response cache cleared ({} entries)", dropped);
    }
}
