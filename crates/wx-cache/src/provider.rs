//! Cache provider trait.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheResult;

/// Key/value store with per-key time-to-live.
///
/// Implementations must be safe for concurrent use; the connection is shared
/// process-wide. Values are raw strings: the token slots interoperate with
/// other implementations reading the same deployment, so no serialization
/// envelope is applied.
#[async_trait]
pub trait CacheProvider: Send + Sync {
    /// Gets a value. Returns `None` when the key is missing or expired;
    /// absence is not an error.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Sets a value with the given time-to-live.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Deletes a key. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Returns the remaining lifetime of a key, or `None` when the key is
    /// missing or carries no expiry.
    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>>;

    /// Releases the underlying connection.
    async fn close(&self) -> CacheResult<()>;
}
