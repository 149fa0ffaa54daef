//! # wx-server
//!
//! HTTP shell for the WeChat publish facade: wires the Redis cache, the
//! upstream client with its retry and breaker layers, the token manager,
//! and the article pipeline behind an Axum router.

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod handlers;
pub mod router;
pub mod state;

pub use router::create_router;
pub use state::AppState;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use wx_article::ArticleService;
use wx_cache::TokenStore;
use wx_cache_redis::{RedisCacheProvider, RedisConfig};
use wx_core::Config;
use wx_token::{TokenManager, TokenManagerConfig};
use wx_upstream::{
    BreakerClient, BreakerConfig, CircuitBreaker, HttpClient, HttpClientConfig, RetryPolicy,
    WechatApi,
};

/// How long shutdown waits for detached refresh tasks to drain.
const DRAIN_DEADLINE: Duration = Duration::from_secs(3);

/// The facade HTTP server.
pub struct Server {
    config: Config,
    state: AppState,
    manager: TokenManager,
    store: TokenStore,
}

impl Server {
    /// Wires the cache, upstream client, token manager, and article
    /// pipeline from configuration.
    ///
    /// Fails when the cache backend is unreachable: a facade that cannot
    /// cache credentials must not pass readiness.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let mut redis_config = RedisConfig::new()
            .host(config.redis.host.clone())
            .port(config.redis.port)
            .database(config.redis.db);
        redis_config.username = config.redis.username.clone();
        redis_config.password = config.redis.password.clone();

        let provider = RedisCacheProvider::new(&redis_config).await?;
        let store = TokenStore::new(Arc::new(provider), config.tokens.cache_safety_margin());
        info!("cache backend connected");

        let retry = RetryPolicy {
            max_retries: config.upstream.max_retries,
            retry_rate_limited: config.upstream.retry_rate_limited,
            ..RetryPolicy::default()
        };
        let http = HttpClient::new(HttpClientConfig {
            base_url: config.upstream.base_url.clone(),
            request_timeout: config.upstream.request_timeout(),
            retry,
        })?;
        let breaker = Arc::new(CircuitBreaker::new(BreakerConfig {
            failure_threshold: config.breaker.consecutive_failures_to_trip,
            open_timeout: config.breaker.open_timeout(),
            half_open_max_concurrent: config.breaker.half_open_max_concurrent,
            ..BreakerConfig::default()
        }));
        let client: Arc<dyn WechatApi> = Arc::new(BreakerClient::new(http, breaker));

        if config.wechat.is_simple_mode() {
            warn!(
                "simple mode is enabled; tenant tokens share the authorizer cache slots - wipe \
                 the cache when switching modes"
            );
        }

        let manager = TokenManager::new(
            Arc::new(config.wechat.clone()),
            store.clone(),
            Arc::clone(&client),
            TokenManagerConfig {
                proactive_refresh_threshold: config.tokens.proactive_refresh_threshold(),
            },
        );
        let articles = Arc::new(ArticleService::new(manager.clone(), client));
        let state = AppState::new(articles, store.clone());

        Ok(Self {
            config,
            state,
            manager,
            store,
        })
    }

    /// Runs the server until SIGINT/SIGTERM, then drains background work.
    pub async fn run(self) -> anyhow::Result<()> {
        let app = create_router(self.state.clone());
        let addr: SocketAddr = format!("0.0.0.0:{}", self.config.server.http_port).parse()?;
        let listener = TcpListener::bind(addr).await?;
        info!("server listening on http://{addr}");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        self.manager.drain(DRAIN_DEADLINE).await;
        if let Err(err) = self.store.close().await {
            warn!(error = %err, "failed to close the cache connection");
        }
        info!("server shutdown complete");
        Ok(())
    }

    /// Returns the router without binding a listener, for tests.
    #[must_use]
    pub fn test_router(&self) -> Router {
        create_router(self.state.clone())
    }
}

/// Waits for a shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received");
}
