//! Wire models for the WeChat HTTP API.
//!
//! Serialized field names are bit-exact with the upstream JSON contract;
//! Rust-side names use the facade's platform/tenant vocabulary. Response
//! fields all carry defaults because success bodies omit the error envelope
//! and error bodies omit the payload.

use serde::{Deserialize, Serialize};

/// Access to the error envelope present in every response body.
pub trait ErrorEnvelope {
    /// Upstream errcode; non-zero signals a fault.
    fn errcode(&self) -> i64;
    /// Upstream error message.
    fn errmsg(&self) -> &str;
}

macro_rules! impl_error_envelope {
    ($($ty:ty),+ $(,)?) => {
        $(impl ErrorEnvelope for $ty {
            fn errcode(&self) -> i64 {
                self.errcode
            }
            fn errmsg(&self) -> &str {
                &self.errmsg
            }
        })+
    };
}

/// Response of the direct token endpoint (simple mode).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimpleTokenResponse {
    /// The issued access token.
    #[serde(default)]
    pub access_token: String,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: u64,
    /// Upstream errcode; zero on success.
    #[serde(default)]
    pub errcode: i64,
    /// Upstream error message.
    #[serde(default)]
    pub errmsg: String,
}

/// Request body for the platform credential endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PlatformTokenRequest {
    /// Platform appid.
    #[serde(rename = "component_appid")]
    pub appid: String,
    /// Platform secret.
    #[serde(rename = "component_appsecret")]
    pub secret: String,
    /// Current verify ticket pushed by the upstream.
    #[serde(rename = "component_verify_ticket")]
    pub verify_ticket: String,
}

/// Response of the platform credential endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlatformTokenResponse {
    /// The issued platform access token.
    #[serde(rename = "component_access_token", default)]
    pub access_token: String,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: u64,
    /// Upstream errcode; zero on success.
    #[serde(default)]
    pub errcode: i64,
    /// Upstream error message.
    #[serde(default)]
    pub errmsg: String,
}

/// Request body for the tenant credential refresh endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct TenantTokenRequest {
    /// Platform appid.
    #[serde(rename = "component_appid")]
    pub platform_appid: String,
    /// Tenant appid.
    #[serde(rename = "authorizer_appid")]
    pub tenant_appid: String,
    /// Long-lived refresh token from configuration.
    #[serde(rename = "authorizer_refresh_token")]
    pub refresh_token: String,
}

/// Response of the tenant credential refresh endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TenantTokenResponse {
    /// The issued tenant access token.
    #[serde(rename = "authorizer_access_token", default)]
    pub access_token: String,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: u64,
    /// Possibly-rotated refresh token. Not persisted by this service.
    #[serde(rename = "authorizer_refresh_token", default)]
    pub refresh_token: String,
    /// Upstream errcode; zero on success.
    #[serde(default)]
    pub errcode: i64,
    /// Upstream error message.
    #[serde(default)]
    pub errmsg: String,
}

/// Request body for the published-article batch endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ArticleBatchRequest {
    /// Zero-based offset into the published list.
    pub offset: i64,
    /// Page size.
    pub count: i64,
    /// 1 to omit article content bodies.
    pub no_content: i64,
}

/// Response of the published-article batch endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArticleBatchResponse {
    /// Total number of published articles for the account.
    #[serde(default)]
    pub total_count: i64,
    /// Number of items in this page.
    #[serde(default)]
    pub item_count: i64,
    /// Articles in this page.
    #[serde(rename = "item", default)]
    pub items: Vec<PublishedArticle>,
    /// Upstream errcode; zero on success.
    #[serde(default)]
    pub errcode: i64,
    /// Upstream error message.
    #[serde(default)]
    pub errmsg: String,
}

/// One published article.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishedArticle {
    /// Stable article identifier.
    #[serde(default)]
    pub article_id: String,
    /// Article content, absent when `no_content` was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ArticleContent>,
    /// Last update time as a unix timestamp.
    #[serde(default)]
    pub update_time: i64,
}

/// Content of one article.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArticleContent {
    /// News items making up the article.
    #[serde(default)]
    pub news_item: Vec<NewsItem>,
}

/// A single news item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewsItem {
    /// Title.
    #[serde(default)]
    pub title: String,
    /// Author.
    #[serde(default)]
    pub author: String,
    /// Digest shown in list views.
    #[serde(default)]
    pub digest: String,
    /// Full HTML content.
    #[serde(default)]
    pub content: String,
    /// "Read the original" link.
    #[serde(default)]
    pub content_source_url: String,
    /// Cover image media id.
    #[serde(default)]
    pub thumb_media_id: String,
    /// Cover image URL.
    #[serde(default)]
    pub thumb_url: String,
    /// Whether comments are open.
    #[serde(default)]
    pub need_open_comment: i64,
    /// Whether only followers may comment.
    #[serde(default)]
    pub only_fans_can_comment: i64,
    /// Canonical article URL.
    #[serde(default)]
    pub url: String,
    /// Whether the item has been deleted.
    #[serde(default)]
    pub is_deleted: bool,
}

/// Request body for the single-article endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ArticleDetailRequest {
    /// Stable article identifier.
    pub article_id: String,
}

/// Response of the single-article endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArticleDetailResponse {
    /// News items making up the article.
    #[serde(rename = "news_item", default)]
    pub news_items: Vec<NewsItem>,
    /// Upstream errcode; zero on success.
    #[serde(default)]
    pub errcode: i64,
    /// Upstream error message.
    #[serde(default)]
    pub errmsg: String,
}

impl_error_envelope!(
    SimpleTokenResponse,
    PlatformTokenResponse,
    TenantTokenResponse,
    ArticleBatchResponse,
    ArticleDetailResponse,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_request_serializes_with_upstream_field_names() {
        let req = PlatformTokenRequest {
            appid: "wx_platform".to_string(),
            secret: "secret".to_string(),
            verify_ticket: "ticket".to_string(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["component_appid"], "wx_platform");
        assert_eq!(json["component_appsecret"], "secret");
        assert_eq!(json["component_verify_ticket"], "ticket");
    }

    #[test]
    fn tenant_response_deserializes_upstream_field_names() {
        let body = r#"{
            "authorizer_access_token": "tok",
            "expires_in": 7200,
            "authorizer_refresh_token": "refresh"
        }"#;
        let resp: TenantTokenResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.access_token, "tok");
        assert_eq!(resp.expires_in, 7200);
        assert_eq!(resp.refresh_token, "refresh");
        assert_eq!(resp.errcode, 0);
    }

    #[test]
    fn error_bodies_deserialize_without_payload_fields() {
        let body = r#"{"errcode": 42001, "errmsg": "access_token expired"}"#;
        let resp: ArticleBatchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.errcode(), 42001);
        assert_eq!(resp.errmsg(), "access_token expired");
        assert!(resp.items.is_empty());
    }

    #[test]
    fn batch_response_maps_item_array() {
        let body = r#"{
            "total_count": 2,
            "item_count": 1,
            "item": [{"article_id": "a1", "update_time": 1700000000}]
        }"#;
        let resp: ArticleBatchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.total_count, 2);
        assert_eq!(resp.items.len(), 1);
        assert_eq!(resp.items[0].article_id, "a1");
        assert!(resp.items[0].content.is_none());
    }
}
