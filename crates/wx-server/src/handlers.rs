//! HTTP handlers and the standard response envelope.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use wx_article::{ArticleError, ArticleRequest, BatchArticlesRequest};
use wx_core::request_id::new_request_id;
use wx_token::TokenError;
use wx_upstream::UpstreamError;

use crate::state::AppState;

/// Success code.
pub const CODE_SUCCESS: i32 = 0;
/// Invalid argument.
pub const CODE_INVALID_PARAM: i32 = 400_001;
/// Unknown tenant or article.
pub const CODE_NOT_FOUND: i32 = 404_001;
/// Upstream failure.
pub const CODE_UPSTREAM_ERROR: i32 = 500_001;
/// Internal failure.
pub const CODE_INTERNAL_ERROR: i32 = 500_003;

/// Key the readiness probe queries to exercise the cache connection.
const READINESS_PROBE_KEY: &str = "wechat:readiness:probe";

/// Standard response envelope carried by every API response.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    /// Stable numeric result code.
    pub code: i32,
    /// Human-readable message.
    pub message: String,
    /// Unique identifier of this request.
    pub request_id: String,
    /// Payload, present on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// Query parameters of the article list endpoint.
#[derive(Debug, Deserialize)]
pub struct BatchQuery {
    #[serde(default)]
    offset: i64,
    #[serde(default = "default_count")]
    count: i64,
    #[serde(default)]
    no_content: i64,
}

const fn default_count() -> i64 {
    10
}

/// Health payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the process is serving.
    pub status: &'static str,
    /// Crate version.
    pub version: &'static str,
}

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /health/live`, the process liveness probe.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// `GET /health/ready`. Fails while the cache backend is unreachable.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.store.token_ttl(READINESS_PROBE_KEY).await {
        Ok(_) => StatusCode::OK,
        Err(err) => {
            warn!(error = %err, "readiness probe failed against the cache backend");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// `GET /v1/accounts/{tenant_appid}/articles`
pub async fn batch_articles(
    State(state): State<AppState>,
    Path(tenant_appid): Path<String>,
    Query(query): Query<BatchQuery>,
) -> Response {
    let request_id = new_request_id();
    info!(
        request_id = %request_id,
        tenant_appid = %tenant_appid,
        offset = query.offset,
        count = query.count,
        "http: list published articles"
    );

    let req = BatchArticlesRequest {
        tenant_appid,
        offset: query.offset,
        count: query.count,
        no_content: query.no_content,
    };
    let cancel = CancellationToken::new();
    match state.articles.batch_articles(&req, &cancel).await {
        Ok(resp) => success(request_id, resp),
        Err(err) => failure(request_id, &err),
    }
}

/// `GET /v1/accounts/{tenant_appid}/articles/{article_id}`
pub async fn get_article(
    State(state): State<AppState>,
    Path((tenant_appid, article_id)): Path<(String, String)>,
) -> Response {
    let request_id = new_request_id();
    info!(
        request_id = %request_id,
        tenant_appid = %tenant_appid,
        article_id = %article_id,
        "http: fetch published article"
    );

    let req = ArticleRequest {
        tenant_appid,
        article_id,
    };
    let cancel = CancellationToken::new();
    match state.articles.article(&req, &cancel).await {
        Ok(resp) => success(request_id, resp),
        Err(err) => failure(request_id, &err),
    }
}

fn success<T: Serialize>(request_id: String, data: T) -> Response {
    (
        StatusCode::OK,
        Json(Envelope {
            code: CODE_SUCCESS,
            message: "success".to_string(),
            request_id,
            data: Some(data),
        }),
    )
        .into_response()
}

fn failure(request_id: String, err: &ArticleError) -> Response {
    let (status, code, message) = classify(err);
    error!(request_id = %request_id, code, error = %err, "http: request failed");
    (
        status,
        Json(Envelope::<()> {
            code,
            message,
            request_id,
            data: None,
        }),
    )
        .into_response()
}

/// Maps pipeline faults onto HTTP statuses and the stable numeric codes.
fn classify(err: &ArticleError) -> (StatusCode, i32, String) {
    match err {
        ArticleError::Validation(msg) => {
            (StatusCode::BAD_REQUEST, CODE_INVALID_PARAM, msg.clone())
        }
        ArticleError::Token(TokenError::UnknownTenant(id)) => (
            StatusCode::NOT_FOUND,
            CODE_NOT_FOUND,
            format!("unknown account: {id}"),
        ),
        ArticleError::Token(TokenError::Upstream(upstream))
        | ArticleError::Upstream(upstream) => classify_upstream(upstream),
        ArticleError::Token(TokenError::Cancelled | TokenError::Internal(_)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            CODE_INTERNAL_ERROR,
            "internal error".to_string(),
        ),
    }
}

fn classify_upstream(err: &UpstreamError) -> (StatusCode, i32, String) {
    match err {
        UpstreamError::Api { .. } | UpstreamError::CredentialExpired { .. } => (
            StatusCode::BAD_GATEWAY,
            CODE_UPSTREAM_ERROR,
            "wechat api request failed".to_string(),
        ),
        UpstreamError::RateLimited { .. }
        | UpstreamError::Transport(_)
        | UpstreamError::BreakerOpen
        | UpstreamError::BreakerOverloaded => (
            StatusCode::SERVICE_UNAVAILABLE,
            CODE_UPSTREAM_ERROR,
            "wechat api temporarily unavailable".to_string(),
        ),
        UpstreamError::Cancelled => (
            StatusCode::INTERNAL_SERVER_ERROR,
            CODE_INTERNAL_ERROR,
            "internal error".to_string(),
        ),
    }
}
