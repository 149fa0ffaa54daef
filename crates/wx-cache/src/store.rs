//! Credential store: key schema and TTL policy over a cache provider.

use std::sync::Arc;
use std::time::Duration;

use crate::error::CacheResult;
use crate::keys::{platform_token_key, tenant_token_key};
use crate::provider::CacheProvider;

/// Stores credentials under the shared key schema with the safety-margin
/// TTL rule applied on write.
///
/// The store owns no values itself; every lookup goes to the provider so a
/// concurrent invalidation is observed immediately.
#[derive(Clone)]
pub struct TokenStore {
    provider: Arc<dyn CacheProvider>,
    safety_margin: Duration,
}

impl TokenStore {
    /// Creates a store over `provider` with the given safety margin.
    pub fn new(provider: Arc<dyn CacheProvider>, safety_margin: Duration) -> Self {
        Self {
            provider,
            safety_margin,
        }
    }

    /// Returns the cached platform credential, if any.
    pub async fn platform_token(&self, platform_appid: &str) -> CacheResult<Option<String>> {
        let token = self.provider.get(&platform_token_key(platform_appid)).await?;
        Ok(token.filter(|t| !t.is_empty()))
    }

    /// Caches a platform credential reported to live `expires_in` seconds.
    pub async fn put_platform_token(
        &self,
        platform_appid: &str,
        token: &str,
        expires_in: u64,
    ) -> CacheResult<()> {
        let ttl = cache_ttl(expires_in, self.safety_margin);
        self.provider
            .set(&platform_token_key(platform_appid), token, ttl)
            .await
    }

    /// Returns the cached tenant credential, if any.
    pub async fn tenant_token(&self, tenant_appid: &str) -> CacheResult<Option<String>> {
        let token = self.provider.get(&tenant_token_key(tenant_appid)).await?;
        Ok(token.filter(|t| !t.is_empty()))
    }

    /// Caches a tenant credential reported to live `expires_in` seconds.
    pub async fn put_tenant_token(
        &self,
        tenant_appid: &str,
        token: &str,
        expires_in: u64,
    ) -> CacheResult<()> {
        let ttl = cache_ttl(expires_in, self.safety_margin);
        self.provider
            .set(&tenant_token_key(tenant_appid), token, ttl)
            .await
    }

    /// Returns the remaining lifetime of a cache key. `None` means the key
    /// is missing or already expired; callers use this only as a hint.
    pub async fn token_ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        self.provider.ttl(key).await
    }

    /// Deletes a cached credential. Idempotent.
    pub async fn delete_token(&self, key: &str) -> CacheResult<()> {
        self.provider.delete(key).await
    }

    /// Releases the underlying connection.
    pub async fn close(&self) -> CacheResult<()> {
        self.provider.close().await
    }
}

/// Computes the cache TTL for an upstream-reported lifetime.
///
/// The safety margin keeps a cached token from outliving its real validity:
/// `expires_in - margin` when that is positive, half the lifetime otherwise.
/// The result is strictly positive for any positive lifetime, and always
/// shorter than the reported one.
#[must_use]
pub fn cache_ttl(expires_in: u64, safety_margin: Duration) -> Duration {
    let lifetime = Duration::from_secs(expires_in);
    if lifetime > safety_margin {
        lifetime - safety_margin
    } else {
        lifetime / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCacheProvider;

    const MARGIN: Duration = Duration::from_secs(300);

    #[test]
    fn ttl_subtracts_safety_margin() {
        assert_eq!(cache_ttl(7200, MARGIN), Duration::from_secs(6900));
        assert_eq!(cache_ttl(301, MARGIN), Duration::from_secs(1));
    }

    #[test]
    fn ttl_falls_back_to_half_lifetime() {
        assert_eq!(cache_ttl(300, MARGIN), Duration::from_secs(150));
        assert_eq!(cache_ttl(200, MARGIN), Duration::from_secs(100));
        assert_eq!(cache_ttl(1, MARGIN), Duration::from_millis(500));
    }

    #[test]
    fn ttl_is_positive_and_shorter_than_lifetime() {
        for expires_in in [1u64, 60, 299, 300, 301, 3600, 7200, 86400] {
            let ttl = cache_ttl(expires_in, MARGIN);
            assert!(ttl > Duration::ZERO, "ttl({expires_in}) must be positive");
            assert!(
                ttl < Duration::from_secs(expires_in),
                "ttl({expires_in}) must be shorter than the reported lifetime"
            );
        }
    }

    #[tokio::test]
    async fn store_writes_under_the_shared_key_schema() {
        let provider = Arc::new(MemoryCacheProvider::new());
        let store = TokenStore::new(provider.clone(), MARGIN);

        store
            .put_tenant_token("wx_tenant", "token-1", 7200)
            .await
            .unwrap();
        assert_eq!(
            provider
                .get("wechat:token:authorizer:wx_tenant")
                .await
                .unwrap(),
            Some("token-1".to_string())
        );
        assert_eq!(
            store.tenant_token("wx_tenant").await.unwrap(),
            Some("token-1".to_string())
        );

        let remaining = store
            .token_ttl("wechat:token:authorizer:wx_tenant")
            .await
            .unwrap()
            .unwrap();
        assert!(remaining <= Duration::from_secs(6900));
        assert!(remaining > Duration::from_secs(6890));
    }

    #[tokio::test]
    async fn empty_values_read_as_missing() {
        let provider = Arc::new(MemoryCacheProvider::new());
        provider
            .set(
                "wechat:token:authorizer:wx_tenant",
                "",
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        let store = TokenStore::new(provider, MARGIN);
        assert_eq!(store.tenant_token("wx_tenant").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_removes_the_entry() {
        let provider = Arc::new(MemoryCacheProvider::new());
        let store = TokenStore::new(provider, MARGIN);

        store
            .put_platform_token("wx_platform", "token-1", 7200)
            .await
            .unwrap();
        store
            .delete_token("wechat:token:component:wx_platform")
            .await
            .unwrap();
        assert_eq!(store.platform_token("wx_platform").await.unwrap(), None);
    }
}
