//! Token manager behavior against an in-memory cache and a stubbed upstream.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use wx_cache::{MemoryCacheProvider, TokenStore};
use wx_core::config::{
    AuthorizerConfig, PlatformConfig, SimpleAccount, SimpleModeConfig, WechatConfig,
};
use wx_token::{TokenError, TokenManager, TokenManagerConfig};
use wx_upstream::models::{
    ArticleBatchRequest, ArticleBatchResponse, ArticleDetailRequest, ArticleDetailResponse,
    PlatformTokenRequest, PlatformTokenResponse, SimpleTokenResponse, TenantTokenRequest,
    TenantTokenResponse,
};
use wx_upstream::{UpstreamError, UpstreamResult, WechatApi};

const SAFETY_MARGIN: Duration = Duration::from_secs(300);

#[derive(Default)]
struct StubApi {
    delay_ms: u64,
    fail_transport: bool,
    simple_calls: AtomicU32,
    platform_calls: AtomicU32,
    tenant_calls: AtomicU32,
}

impl StubApi {
    async fn pause(&self) {
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
    }
}

#[async_trait]
impl WechatApi for StubApi {
    async fn simple_token(
        &self,
        appid: &str,
        _secret: &str,
        _cancel: &CancellationToken,
    ) -> UpstreamResult<SimpleTokenResponse> {
        self.simple_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.fail_transport {
            return Err(UpstreamError::Transport("connection refused".to_string()));
        }
        Ok(SimpleTokenResponse {
            access_token: format!("tok-{appid}"),
            expires_in: 7200,
            ..SimpleTokenResponse::default()
        })
    }

    async fn platform_token(
        &self,
        _req: &PlatformTokenRequest,
        _cancel: &CancellationToken,
    ) -> UpstreamResult<PlatformTokenResponse> {
        self.platform_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.fail_transport {
            return Err(UpstreamError::Transport("connection refused".to_string()));
        }
        Ok(PlatformTokenResponse {
            access_token: "platform-tok".to_string(),
            expires_in: 7200,
            ..PlatformTokenResponse::default()
        })
    }

    async fn tenant_token(
        &self,
        platform_token: &str,
        req: &TenantTokenRequest,
        _cancel: &CancellationToken,
    ) -> UpstreamResult<TenantTokenResponse> {
        self.tenant_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if platform_token != "platform-tok" {
            return Err(UpstreamError::from_errcode(40001, "invalid credential"));
        }
        Ok(TenantTokenResponse {
            access_token: format!("tenant-tok-{}", req.tenant_appid),
            expires_in: 7200,
            refresh_token: req.refresh_token.clone(),
            ..TenantTokenResponse::default()
        })
    }

    async fn batch_articles(
        &self,
        _access_token: &str,
        _req: &ArticleBatchRequest,
        _cancel: &CancellationToken,
    ) -> UpstreamResult<ArticleBatchResponse> {
        unreachable!("article endpoints are not exercised by token manager tests")
    }

    async fn article(
        &self,
        _access_token: &str,
        _req: &ArticleDetailRequest,
        _cancel: &CancellationToken,
    ) -> UpstreamResult<ArticleDetailResponse> {
        unreachable!("article endpoints are not exercised by token manager tests")
    }
}

fn simple_config() -> WechatConfig {
    WechatConfig {
        simple_mode: SimpleModeConfig {
            enabled: true,
            accounts: vec![SimpleAccount {
                app_id: "T1".to_string(),
                app_secret: "S".to_string(),
            }],
        },
        platform: PlatformConfig::default(),
        authorizers: Vec::new(),
    }
}

fn two_level_config() -> WechatConfig {
    WechatConfig {
        simple_mode: SimpleModeConfig::default(),
        platform: PlatformConfig {
            app_id: "P1".to_string(),
            app_secret: "ps".to_string(),
            verify_ticket: "ticket".to_string(),
        },
        authorizers: vec![AuthorizerConfig {
            app_id: "T1".to_string(),
            refresh_token: "refresh-1".to_string(),
        }],
    }
}

struct Fixture {
    manager: TokenManager,
    api: Arc<StubApi>,
    store: TokenStore,
}

fn fixture(config: WechatConfig, api: StubApi) -> Fixture {
    let provider = Arc::new(MemoryCacheProvider::new());
    let store = TokenStore::new(provider, SAFETY_MARGIN);
    let api = Arc::new(api);
    let client: Arc<dyn WechatApi> = api.clone();
    let manager = TokenManager::new(
        Arc::new(config),
        store.clone(),
        client,
        TokenManagerConfig::default(),
    );
    Fixture {
        manager,
        api,
        store,
    }
}

#[tokio::test]
async fn warm_hit_returns_cached_value_without_upstream_calls() {
    let f = fixture(simple_config(), StubApi::default());
    // Remaining lifetime will be ~30 minutes, above the refresh threshold.
    f.store
        .put_tenant_token("T1", "cached-T1", 2100)
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let token = f.manager.tenant_token("T1", &cancel).await.unwrap();
    assert_eq!(token, "cached-T1");

    // No background refresh either: the entry is comfortably fresh.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(f.api.simple_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cold_miss_fetches_and_writes_through_with_the_safety_margin() {
    let f = fixture(simple_config(), StubApi::default());
    let cancel = CancellationToken::new();

    let token = f.manager.tenant_token("T1", &cancel).await.unwrap();
    assert_eq!(token, "tok-T1");
    assert_eq!(f.api.simple_calls.load(Ordering::SeqCst), 1);

    assert_eq!(
        f.store.tenant_token("T1").await.unwrap(),
        Some("tok-T1".to_string())
    );
    let remaining = f
        .store
        .token_ttl("wechat:token:authorizer:T1")
        .await
        .unwrap()
        .unwrap();
    assert!(remaining <= Duration::from_secs(6900));
    assert!(remaining > Duration::from_secs(6890));
}

#[tokio::test]
async fn concurrent_misses_coalesce_into_one_upstream_call() {
    let f = fixture(
        simple_config(),
        StubApi {
            delay_ms: 50,
            ..StubApi::default()
        },
    );

    let mut handles = Vec::new();
    for _ in 0..10 {
        let manager = f.manager.clone();
        handles.push(tokio::spawn(async move {
            let cancel = CancellationToken::new();
            manager.tenant_token("T1", &cancel).await
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "tok-T1");
    }
    assert_eq!(f.api.simple_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn a_refresh_fault_fans_out_to_every_coalesced_caller() {
    let f = fixture(
        simple_config(),
        StubApi {
            delay_ms: 30,
            fail_transport: true,
            ..StubApi::default()
        },
    );

    let mut handles = Vec::new();
    for _ in 0..4 {
        let manager = f.manager.clone();
        handles.push(tokio::spawn(async move {
            let cancel = CancellationToken::new();
            manager.tenant_token("T1", &cancel).await
        }));
    }

    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            TokenError::Upstream(UpstreamError::Transport(_))
        ));
    }
    assert_eq!(f.api.simple_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_tenants_fail_without_touching_the_upstream() {
    let f = fixture(simple_config(), StubApi::default());
    let cancel = CancellationToken::new();

    let err = f.manager.tenant_token("T9", &cancel).await.unwrap_err();
    assert!(matches!(err, TokenError::UnknownTenant(_)));
    assert_eq!(f.api.simple_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn two_level_refresh_acquires_the_platform_credential_first() {
    let f = fixture(two_level_config(), StubApi::default());
    let cancel = CancellationToken::new();

    let token = f.manager.tenant_token("T1", &cancel).await.unwrap();
    assert_eq!(token, "tenant-tok-T1");
    assert_eq!(f.api.platform_calls.load(Ordering::SeqCst), 1);
    assert_eq!(f.api.tenant_calls.load(Ordering::SeqCst), 1);

    // Both credentials were written through.
    assert_eq!(
        f.store.platform_token("P1").await.unwrap(),
        Some("platform-tok".to_string())
    );
    assert_eq!(
        f.store.tenant_token("T1").await.unwrap(),
        Some("tenant-tok-T1".to_string())
    );
}

#[tokio::test]
async fn a_cached_platform_credential_is_reused_by_tenant_refreshes() {
    let f = fixture(two_level_config(), StubApi::default());
    f.store
        .put_platform_token("P1", "platform-tok", 7200)
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let token = f.manager.tenant_token("T1", &cancel).await.unwrap();
    assert_eq!(token, "tenant-tok-T1");
    assert_eq!(f.api.platform_calls.load(Ordering::SeqCst), 0);
    assert_eq!(f.api.tenant_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invalidate_and_refresh_replaces_the_cached_entry() {
    let f = fixture(simple_config(), StubApi::default());
    f.store.put_tenant_token("T1", "stale", 7200).await.unwrap();

    let cancel = CancellationToken::new();
    let token = f
        .manager
        .invalidate_and_refresh("T1", &cancel)
        .await
        .unwrap();
    assert_eq!(token, "tok-T1");
    assert_eq!(f.api.simple_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        f.store.tenant_token("T1").await.unwrap(),
        Some("tok-T1".to_string())
    );
}

#[tokio::test]
async fn a_near_expiry_hit_schedules_a_background_refresh() {
    let f = fixture(simple_config(), StubApi::default());
    // expires_in 600 caches with a 300 s TTL, below the 600 s threshold.
    f.store
        .put_tenant_token("T1", "aging-T1", 600)
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let token = f.manager.tenant_token("T1", &cancel).await.unwrap();
    // The foreground returns the cached value immediately.
    assert_eq!(token, "aging-T1");

    // The detached refresh lands shortly after.
    for _ in 0..100 {
        if f.store.tenant_token("T1").await.unwrap() == Some("tok-T1".to_string()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(
        f.store.tenant_token("T1").await.unwrap(),
        Some("tok-T1".to_string())
    );
    assert_eq!(f.api.simple_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn a_cancelled_caller_detaches_without_aborting_the_refresh() {
    let f = fixture(
        simple_config(),
        StubApi {
            delay_ms: 50,
            ..StubApi::default()
        },
    );

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    let manager = f.manager.clone();
    let caller = tokio::spawn(async move { manager.tenant_token("T1", &cancel).await });

    // Cancel while the elected flight is still talking to the upstream.
    tokio::time::sleep(Duration::from_millis(10)).await;
    canceller.cancel();
    let err = caller.await.unwrap().unwrap_err();
    assert!(matches!(err, TokenError::Cancelled));

    // The flight keeps running and still writes through.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(
        f.store.tenant_token("T1").await.unwrap(),
        Some("tok-T1".to_string())
    );
    assert_eq!(f.api.simple_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn drain_completes_when_no_refreshes_are_in_flight() {
    let f = fixture(simple_config(), StubApi::default());
    f.manager.drain(Duration::from_secs(1)).await;
}
