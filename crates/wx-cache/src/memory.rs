//! In-memory cache provider.
//!
//! Backs single-instance deployments that run without Redis, and the test
//! suites of the crates above this one. Entries expire lazily on access.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::CacheResult;
use crate::provider::CacheProvider;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// Process-local cache with per-key TTL.
#[derive(Debug, Default)]
pub struct MemoryCacheProvider {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCacheProvider {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheProvider for MemoryCacheProvider {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) => {
                let remaining = entry.expires_at.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    entries.remove(key);
                    Ok(None)
                } else {
                    Ok(Some(remaining))
                }
            }
            None => Ok(None),
        }
    }

    async fn close(&self) -> CacheResult<()> {
        Ok(())
    }
}
