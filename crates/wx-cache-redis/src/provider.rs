//! Redis cache provider implementation.

use std::time::Duration;

use async_trait::async_trait;
use fred::prelude::*;
use wx_cache::{CacheError, CacheProvider, CacheResult};

use crate::config::RedisConfig;
use crate::error::from_redis_error;

/// Redis-backed cache provider.
pub struct RedisCacheProvider {
    client: Client,
}

impl RedisCacheProvider {
    /// Connects to Redis and verifies the connection.
    ///
    /// ## Errors
    ///
    /// Returns an error if the connection cannot be established; a backend
    /// unavailable at startup is supposed to fail readiness, not limp along.
    pub async fn new(config: &RedisConfig) -> CacheResult<Self> {
        let redis_config = Config::from_url(&config.connection_url())
            .map_err(|e| CacheError::Configuration(e.to_string()))?;

        let client = Client::new(
            redis_config,
            None,
            None,
            Some(ReconnectPolicy::new_exponential(0, 1000, 30_000, 2)),
        );

        let _connection = client.init().await.map_err(from_redis_error)?;

        Ok(Self { client })
    }

    /// Returns the underlying Redis client.
    #[must_use]
    pub const fn client(&self) -> &Client {
        &self.client
    }
}

/// Safely convert seconds to i64 for Redis expiration.
#[allow(clippy::cast_possible_wrap)]
const fn seconds_to_i64(seconds: u64) -> i64 {
    seconds as i64
}

/// Safely convert i64 TTL to u64 for Duration.
#[allow(clippy::cast_sign_loss)]
const fn ttl_to_u64(ttl: i64) -> u64 {
    ttl as u64
}

#[async_trait]
impl CacheProvider for RedisCacheProvider {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let value: Option<String> = self.client.get(key).await.map_err(from_redis_error)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let seconds = seconds_to_i64(ttl.as_secs().max(1));
        self.client
            .set::<(), _, _>(key, value, Some(Expiration::EX(seconds)), None, false)
            .await
            .map_err(from_redis_error)
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.client
            .del::<(), _>(key)
            .await
            .map_err(from_redis_error)
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        let ttl: i64 = self.client.ttl(key).await.map_err(from_redis_error)?;

        // Redis reports -2 for a missing key and -1 for a key with no expiry.
        if ttl < 0 {
            Ok(None)
        } else {
            Ok(Some(Duration::from_secs(ttl_to_u64(ttl))))
        }
    }

    async fn close(&self) -> CacheResult<()> {
        self.client.quit().await.map_err(from_redis_error)
    }
}
