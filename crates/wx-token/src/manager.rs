//! Token manager.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use wx_cache::keys::{platform_token_key, tenant_token_key};
use wx_cache::TokenStore;
use wx_core::config::WechatConfig;
use wx_upstream::models::{PlatformTokenRequest, TenantTokenRequest};
use wx_upstream::WechatApi;

use crate::error::{TokenError, TokenResult};
use crate::flight::FlightGroup;

/// Coalescing key prefix for platform refreshes.
const PLATFORM_FLIGHT_PREFIX: &str = "component_token:";
/// Coalescing key prefix for tenant refreshes.
const TENANT_FLIGHT_PREFIX: &str = "authorizer_token:";
/// Coalescing key prefix for invalidate-and-refresh rounds. Distinct from
/// the plain-read prefix so an invalidation can never be satisfied by a
/// refresh that started before the stale token was proven bad.
const INVALIDATE_FLIGHT_PREFIX: &str = "invalidate:";

/// Tuning for the token manager.
#[derive(Debug, Clone)]
pub struct TokenManagerConfig {
    /// Remaining lifetime below which a cache hit schedules a background
    /// refresh.
    pub proactive_refresh_threshold: Duration,
}

impl Default for TokenManagerConfig {
    fn default() -> Self {
        Self {
            proactive_refresh_threshold: Duration::from_secs(600),
        }
    }
}

enum RefreshTarget {
    Platform,
    Tenant(String),
}

/// Single source of truth for valid upstream credentials.
///
/// Cheap to clone; clones share the cache connection, the upstream client,
/// and the in-flight coalescing table.
#[derive(Clone)]
pub struct TokenManager {
    wechat: Arc<WechatConfig>,
    store: TokenStore,
    client: Arc<dyn WechatApi>,
    flights: FlightGroup,
    refresh_threshold: Duration,
    shutdown: CancellationToken,
}

impl TokenManager {
    /// Creates a manager over the given configuration, store, and client.
    pub fn new(
        wechat: Arc<WechatConfig>,
        store: TokenStore,
        client: Arc<dyn WechatApi>,
        config: TokenManagerConfig,
    ) -> Self {
        Self {
            wechat,
            store,
            client,
            flights: FlightGroup::new(),
            refresh_threshold: config.proactive_refresh_threshold,
            shutdown: CancellationToken::new(),
        }
    }

    /// Returns a valid platform credential, from the cache when possible.
    pub async fn platform_token(&self, cancel: &CancellationToken) -> TokenResult<String> {
        if cancel.is_cancelled() {
            return Err(TokenError::Cancelled);
        }

        let appid = self.wechat.platform.app_id.clone();
        match self.store.platform_token(&appid).await {
            Ok(Some(token)) => {
                self.maybe_spawn_refresh(&platform_token_key(&appid), RefreshTarget::Platform)
                    .await;
                Ok(token)
            }
            Ok(None) => self.coalesced_platform_refresh(cancel).await,
            Err(err) => {
                warn!(
                    platform_appid = %appid,
                    error = %err,
                    "platform token cache read failed, fetching from upstream"
                );
                self.coalesced_platform_refresh(cancel).await
            }
        }
    }

    /// Returns a valid tenant credential, from the cache when possible.
    pub async fn tenant_token(
        &self,
        tenant_appid: &str,
        cancel: &CancellationToken,
    ) -> TokenResult<String> {
        if cancel.is_cancelled() {
            return Err(TokenError::Cancelled);
        }

        match self.store.tenant_token(tenant_appid).await {
            Ok(Some(token)) => {
                self.maybe_spawn_refresh(
                    &tenant_token_key(tenant_appid),
                    RefreshTarget::Tenant(tenant_appid.to_string()),
                )
                .await;
                Ok(token)
            }
            Ok(None) => self.coalesced_tenant_refresh(tenant_appid, cancel).await,
            Err(err) => {
                warn!(
                    tenant_appid,
                    error = %err,
                    "tenant token cache read failed, fetching from upstream"
                );
                self.coalesced_tenant_refresh(tenant_appid, cancel).await
            }
        }
    }

    /// Deletes the cached tenant credential and fetches a fresh one.
    ///
    /// Called by the article pipeline after the upstream rejected the cached
    /// token as expired. Coalesces under its own key, never with plain
    /// reads: a concurrent read-triggered refresh may already be serving the
    /// value that was just proven bad.
    pub async fn invalidate_and_refresh(
        &self,
        tenant_appid: &str,
        cancel: &CancellationToken,
    ) -> TokenResult<String> {
        if let Err(err) = self.store.delete_token(&tenant_token_key(tenant_appid)).await {
            warn!(tenant_appid, error = %err, "failed to delete cached tenant token");
        }
        info!(tenant_appid, "tenant token invalidated, fetching a fresh one");

        let flight_key = format!("{INVALIDATE_FLIGHT_PREFIX}{tenant_appid}");
        let manager = self.clone();
        let id = tenant_appid.to_string();
        let work_cancel = self.shutdown.child_token();
        self.flights
            .run(&flight_key, cancel, async move {
                manager.fetch_and_cache_tenant(&id, &work_cancel).await
            })
            .await
    }

    /// Cancels detached refresh work and waits for it to drain.
    pub async fn drain(&self, deadline: Duration) {
        self.shutdown.cancel();
        self.flights.tracker().close();
        if tokio::time::timeout(deadline, self.flights.tracker().wait())
            .await
            .is_err()
        {
            warn!("token refresh tasks did not drain before the shutdown deadline");
        }
    }

    async fn maybe_spawn_refresh(&self, cache_key: &str, target: RefreshTarget) {
        match self.store.token_ttl(cache_key).await {
            Ok(Some(remaining))
                if remaining > Duration::ZERO && remaining < self.refresh_threshold =>
            {
                debug!(
                    key = cache_key,
                    remaining_secs = remaining.as_secs(),
                    "remaining lifetime below threshold, scheduling proactive refresh"
                );
                self.spawn_proactive(target);
            }
            _ => {}
        }
    }

    /// Launches a best-effort refresh on a detached task.
    ///
    /// The task runs under the manager's shutdown scope, not the foreground
    /// request's, and reuses the flight key so it never duplicates work a
    /// foreground refresh already started. Its result is observed by nobody;
    /// failures are logged.
    fn spawn_proactive(&self, target: RefreshTarget) {
        let manager = self.clone();
        let detached = self.shutdown.child_token();
        let _task = self.flights.tracker().spawn(async move {
            match target {
                RefreshTarget::Platform => {
                    if let Err(err) = manager.coalesced_platform_refresh(&detached).await {
                        error!(error = %err, "ALERT: proactive platform token refresh failed");
                    }
                }
                RefreshTarget::Tenant(tenant_appid) => {
                    if let Err(err) = manager
                        .coalesced_tenant_refresh(&tenant_appid, &detached)
                        .await
                    {
                        error!(
                            tenant_appid = %tenant_appid,
                            error = %err,
                            "ALERT: proactive tenant token refresh failed"
                        );
                    }
                }
            }
        });
    }

    async fn coalesced_platform_refresh(&self, cancel: &CancellationToken) -> TokenResult<String> {
        let flight_key = format!("{PLATFORM_FLIGHT_PREFIX}{}", self.wechat.platform.app_id);
        let manager = self.clone();
        let work_cancel = self.shutdown.child_token();
        self.flights
            .run(&flight_key, cancel, async move {
                manager.fetch_and_cache_platform(&work_cancel).await
            })
            .await
    }

    async fn coalesced_tenant_refresh(
        &self,
        tenant_appid: &str,
        cancel: &CancellationToken,
    ) -> TokenResult<String> {
        let flight_key = format!("{TENANT_FLIGHT_PREFIX}{tenant_appid}");
        let manager = self.clone();
        let id = tenant_appid.to_string();
        let work_cancel = self.shutdown.child_token();
        self.flights
            .run(&flight_key, cancel, async move {
                manager.fetch_and_cache_tenant(&id, &work_cancel).await
            })
            .await
    }

    async fn fetch_and_cache_platform(&self, cancel: &CancellationToken) -> TokenResult<String> {
        let req = PlatformTokenRequest {
            appid: self.wechat.platform.app_id.clone(),
            secret: self.wechat.platform.app_secret.clone(),
            verify_ticket: self.wechat.platform.verify_ticket.clone(),
        };

        let resp = self.client.platform_token(&req, cancel).await.map_err(|err| {
            error!(
                platform_appid = %req.appid,
                error = %err,
                "ALERT: failed to fetch platform token from upstream"
            );
            TokenError::from(err)
        })?;

        if let Err(err) = self
            .store
            .put_platform_token(&req.appid, &resp.access_token, resp.expires_in)
            .await
        {
            // The token is still valid; the next call will refetch.
            warn!(error = %err, "failed to cache platform token");
        }

        info!(
            platform_appid = %req.appid,
            expires_in = resp.expires_in,
            "platform token refreshed"
        );
        Ok(resp.access_token)
    }

    async fn fetch_and_cache_tenant(
        &self,
        tenant_appid: &str,
        cancel: &CancellationToken,
    ) -> TokenResult<String> {
        if self.wechat.is_simple_mode() {
            self.fetch_and_cache_simple(tenant_appid, cancel).await
        } else {
            self.fetch_and_cache_authorized(tenant_appid, cancel).await
        }
    }

    async fn fetch_and_cache_simple(
        &self,
        tenant_appid: &str,
        cancel: &CancellationToken,
    ) -> TokenResult<String> {
        let account = self
            .wechat
            .simple_account(tenant_appid)
            .ok_or_else(|| TokenError::UnknownTenant(tenant_appid.to_string()))?;

        let resp = self
            .client
            .simple_token(&account.app_id, &account.app_secret, cancel)
            .await
            .map_err(|err| {
                error!(
                    tenant_appid,
                    error = %err,
                    "ALERT: failed to fetch access token from upstream (simple mode)"
                );
                TokenError::from(err)
            })?;

        if let Err(err) = self
            .store
            .put_tenant_token(tenant_appid, &resp.access_token, resp.expires_in)
            .await
        {
            warn!(tenant_appid, error = %err, "failed to cache access token");
        }

        info!(
            tenant_appid,
            expires_in = resp.expires_in,
            "access token refreshed (simple mode)"
        );
        Ok(resp.access_token)
    }

    async fn fetch_and_cache_authorized(
        &self,
        tenant_appid: &str,
        cancel: &CancellationToken,
    ) -> TokenResult<String> {
        let authorizer = self
            .wechat
            .authorizer(tenant_appid)
            .ok_or_else(|| TokenError::UnknownTenant(tenant_appid.to_string()))?;
        let configured_refresh_token = authorizer.refresh_token.clone();

        // A tenant refresh is authenticated by a live platform credential;
        // this re-enters the coalescing step under the platform key.
        let platform_token = self.platform_token(cancel).await?;

        let req = TenantTokenRequest {
            platform_appid: self.wechat.platform.app_id.clone(),
            tenant_appid: tenant_appid.to_string(),
            refresh_token: configured_refresh_token.clone(),
        };

        let resp = self
            .client
            .tenant_token(&platform_token, &req, cancel)
            .await
            .map_err(|err| {
                error!(
                    tenant_appid,
                    error = %err,
                    "ALERT: failed to refresh tenant token from upstream"
                );
                TokenError::from(err)
            })?;

        if !resp.refresh_token.is_empty() && resp.refresh_token != configured_refresh_token {
            warn!(
                tenant_appid,
                rotated_refresh_token = %redact(&resp.refresh_token),
                "upstream rotated the authorizer refresh token; update configuration out of band"
            );
        }

        if let Err(err) = self
            .store
            .put_tenant_token(tenant_appid, &resp.access_token, resp.expires_in)
            .await
        {
            warn!(tenant_appid, error = %err, "failed to cache tenant token");
        }

        info!(
            tenant_appid,
            expires_in = resp.expires_in,
            "tenant token refreshed"
        );
        Ok(resp.access_token)
    }
}

/// Keeps the first and last four characters of a secret for correlation.
fn redact(secret: &str) -> String {
    if secret.len() <= 8 {
        "***".to_string()
    } else {
        format!("{}...{}", &secret[..4], &secret[secret.len() - 4..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redaction_keeps_only_the_edges() {
        assert_eq!(redact("short"), "***");
        assert_eq!(redact("refreshtoken-12345678"), "refr...5678");
    }
}
