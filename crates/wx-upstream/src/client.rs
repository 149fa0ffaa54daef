//! WeChat HTTP API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::error::{UpstreamError, UpstreamResult};
use crate::models::{
    ArticleBatchRequest, ArticleBatchResponse, ArticleDetailRequest, ArticleDetailResponse,
    ErrorEnvelope, PlatformTokenRequest, PlatformTokenResponse, SimpleTokenResponse,
    TenantTokenRequest, TenantTokenResponse,
};
use crate::retry::{retry_transport, RetryPolicy};

/// Default WeChat API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.weixin.qq.com";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Typed interface over the WeChat endpoints the facade uses.
///
/// Every operation observes the caller's cancellation token and returns a
/// classified fault on failure.
#[async_trait]
pub trait WechatApi: Send + Sync {
    /// Obtains an access token directly from appid/secret (simple mode).
    async fn simple_token(
        &self,
        appid: &str,
        secret: &str,
        cancel: &CancellationToken,
    ) -> UpstreamResult<SimpleTokenResponse>;

    /// Obtains the platform access token.
    async fn platform_token(
        &self,
        req: &PlatformTokenRequest,
        cancel: &CancellationToken,
    ) -> UpstreamResult<PlatformTokenResponse>;

    /// Refreshes a tenant access token, authenticated by the platform token.
    async fn tenant_token(
        &self,
        platform_token: &str,
        req: &TenantTokenRequest,
        cancel: &CancellationToken,
    ) -> UpstreamResult<TenantTokenResponse>;

    /// Lists published articles.
    async fn batch_articles(
        &self,
        access_token: &str,
        req: &ArticleBatchRequest,
        cancel: &CancellationToken,
    ) -> UpstreamResult<ArticleBatchResponse>;

    /// Fetches one published article.
    async fn article(
        &self,
        access_token: &str,
        req: &ArticleDetailRequest,
        cancel: &CancellationToken,
    ) -> UpstreamResult<ArticleDetailResponse>;
}

/// Configuration for [`HttpClient`].
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL of the WeChat API.
    pub base_url: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Retry policy applied to every call.
    pub retry: RetryPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

/// JSON-over-HTTP client with integrated transport-fault retry.
pub struct HttpClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl HttpClient {
    /// Creates a client from the given configuration.
    pub fn new(config: HttpClientConfig) -> UpstreamResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry: config.retry,
        })
    }

    /// Performs one request with retry, cancellation, and errcode checking.
    async fn request_json<B, T>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
        cancel: &CancellationToken,
    ) -> UpstreamResult<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned + ErrorEnvelope,
    {
        retry_transport(&self.retry, cancel, || {
            let method = method.clone();
            async move {
                tokio::select! {
                    () = cancel.cancelled() => Err(UpstreamError::Cancelled),
                    result = self.send_once::<B, T>(method, url, body) => result,
                }
            }
        })
        .await
    }

    /// One HTTP attempt: send, check status, decode, classify the errcode.
    async fn send_once<B, T>(&self, method: Method, url: &str, body: Option<&B>) -> UpstreamResult<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned + ErrorEnvelope,
    {
        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Transport(format!(
                "unexpected status code: {status}"
            )));
        }

        let parsed: T = response
            .json()
            .await
            .map_err(|e| UpstreamError::Transport(format!("failed to decode response body: {e}")))?;

        if parsed.errcode() == 0 {
            Ok(parsed)
        } else {
            let err = UpstreamError::from_errcode(parsed.errcode(), parsed.errmsg());
            error!(error = %err, "wechat api returned an error body");
            Err(err)
        }
    }
}

#[async_trait]
impl WechatApi for HttpClient {
    async fn simple_token(
        &self,
        appid: &str,
        secret: &str,
        cancel: &CancellationToken,
    ) -> UpstreamResult<SimpleTokenResponse> {
        let url = format!(
            "{}/cgi-bin/token?grant_type=client_credential&appid={appid}&secret={secret}",
            self.base_url
        );
        self.request_json::<(), SimpleTokenResponse>(Method::GET, &url, None, cancel)
            .await
    }

    async fn platform_token(
        &self,
        req: &PlatformTokenRequest,
        cancel: &CancellationToken,
    ) -> UpstreamResult<PlatformTokenResponse> {
        let url = format!("{}/cgi-bin/component/api_component_token", self.base_url);
        self.request_json(Method::POST, &url, Some(req), cancel)
            .await
    }

    async fn tenant_token(
        &self,
        platform_token: &str,
        req: &TenantTokenRequest,
        cancel: &CancellationToken,
    ) -> UpstreamResult<TenantTokenResponse> {
        let url = format!(
            "{}/cgi-bin/component/api_authorizer_token?component_access_token={platform_token}",
            self.base_url
        );
        self.request_json(Method::POST, &url, Some(req), cancel)
            .await
    }

    async fn batch_articles(
        &self,
        access_token: &str,
        req: &ArticleBatchRequest,
        cancel: &CancellationToken,
    ) -> UpstreamResult<ArticleBatchResponse> {
        let url = format!(
            "{}/cgi-bin/freepublish/batchget?access_token={access_token}",
            self.base_url
        );
        self.request_json(Method::POST, &url, Some(req), cancel)
            .await
    }

    async fn article(
        &self,
        access_token: &str,
        req: &ArticleDetailRequest,
        cancel: &CancellationToken,
    ) -> UpstreamResult<ArticleDetailResponse> {
        let url = format!(
            "{}/cgi-bin/freepublish/getarticle?access_token={access_token}",
            self.base_url
        );
        self.request_json(Method::POST, &url, Some(req), cancel)
            .await
    }
}
