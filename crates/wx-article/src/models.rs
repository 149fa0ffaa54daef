//! Caller-facing article request and response types.
//!
//! Responses mirror the upstream payloads transparently, including their
//! serialized field names.

use serde::{Deserialize, Serialize};
use wx_upstream::models::{NewsItem, PublishedArticle};

/// Request for a page of published articles.
#[derive(Debug, Clone)]
pub struct BatchArticlesRequest {
    /// Tenant account appid.
    pub tenant_appid: String,
    /// Zero-based offset into the published list.
    pub offset: i64,
    /// Page size, 1 through 20.
    pub count: i64,
    /// 1 to omit article content bodies, 0 to include them.
    pub no_content: i64,
}

/// A page of published articles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchArticlesResponse {
    /// Total number of published articles for the account.
    pub total_count: i64,
    /// Number of items in this page.
    pub item_count: i64,
    /// Articles in this page.
    #[serde(rename = "item")]
    pub items: Vec<PublishedArticle>,
}

/// Request for one published article.
#[derive(Debug, Clone)]
pub struct ArticleRequest {
    /// Tenant account appid.
    pub tenant_appid: String,
    /// Stable article identifier.
    pub article_id: String,
}

/// One published article's content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleResponse {
    /// News items making up the article.
    #[serde(rename = "news_item")]
    pub news_items: Vec<NewsItem>,
}
