//! Article pipeline service.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use wx_token::TokenManager;
use wx_upstream::models::{ArticleBatchRequest, ArticleDetailRequest};
use wx_upstream::{UpstreamError, WechatApi};

use crate::error::{ArticleError, ArticleResult};
use crate::models::{
    ArticleRequest, ArticleResponse, BatchArticlesRequest, BatchArticlesResponse,
};

/// Exercises the upstream article endpoints with credentials from the token
/// manager.
///
/// An upstream `credential expired` verdict triggers exactly one
/// invalidate-and-refresh round followed by one retried call, whose result
/// is returned verbatim. Everything else passes through unmodified.
pub struct ArticleService {
    tokens: TokenManager,
    client: Arc<dyn WechatApi>,
}

impl ArticleService {
    /// Creates the pipeline over a token manager and an upstream client.
    pub fn new(tokens: TokenManager, client: Arc<dyn WechatApi>) -> Self {
        Self { tokens, client }
    }

    /// Lists published articles for a tenant.
    pub async fn batch_articles(
        &self,
        req: &BatchArticlesRequest,
        cancel: &CancellationToken,
    ) -> ArticleResult<BatchArticlesResponse> {
        validate_batch(req)?;
        let started = Instant::now();
        info!(
            tenant_appid = %req.tenant_appid,
            offset = req.offset,
            count = req.count,
            "listing published articles"
        );

        let token = self.tokens.tenant_token(&req.tenant_appid, cancel).await?;
        let wire = ArticleBatchRequest {
            offset: req.offset,
            count: req.count,
            no_content: req.no_content,
        };

        let resp = match self.client.batch_articles(&token, &wire, cancel).await {
            Err(err) if err.is_credential_expired() => {
                let token = self.recover_expired(&req.tenant_appid, &err, cancel).await?;
                self.client.batch_articles(&token, &wire, cancel).await?
            }
            other => other?,
        };

        info!(
            tenant_appid = %req.tenant_appid,
            total_count = resp.total_count,
            item_count = resp.item_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "listing published articles completed"
        );
        Ok(BatchArticlesResponse {
            total_count: resp.total_count,
            item_count: resp.item_count,
            items: resp.items,
        })
    }

    /// Fetches one published article.
    pub async fn article(
        &self,
        req: &ArticleRequest,
        cancel: &CancellationToken,
    ) -> ArticleResult<ArticleResponse> {
        validate_article(req)?;
        let started = Instant::now();
        info!(
            tenant_appid = %req.tenant_appid,
            article_id = %req.article_id,
            "fetching published article"
        );

        let token = self.tokens.tenant_token(&req.tenant_appid, cancel).await?;
        let wire = ArticleDetailRequest {
            article_id: req.article_id.clone(),
        };

        let resp = match self.client.article(&token, &wire, cancel).await {
            Err(err) if err.is_credential_expired() => {
                let token = self.recover_expired(&req.tenant_appid, &err, cancel).await?;
                self.client.article(&token, &wire, cancel).await?
            }
            other => other?,
        };

        info!(
            tenant_appid = %req.tenant_appid,
            article_id = %req.article_id,
            news_item_count = resp.news_items.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fetching published article completed"
        );
        Ok(ArticleResponse {
            news_items: resp.news_items,
        })
    }

    /// One invalidate-and-refresh round after an expiry verdict.
    async fn recover_expired(
        &self,
        tenant_appid: &str,
        original: &UpstreamError,
        cancel: &CancellationToken,
    ) -> ArticleResult<String> {
        warn!(
            tenant_appid,
            error = %original,
            "access token rejected as expired, refreshing and retrying once"
        );
        let token = self
            .tokens
            .invalidate_and_refresh(tenant_appid, cancel)
            .await?;
        Ok(token)
    }
}

fn validate_batch(req: &BatchArticlesRequest) -> ArticleResult<()> {
    if req.tenant_appid.is_empty() {
        return Err(ArticleError::Validation("tenant_appid is required".into()));
    }
    if req.offset < 0 {
        return Err(ArticleError::Validation("offset must be >= 0".into()));
    }
    if !(1..=20).contains(&req.count) {
        return Err(ArticleError::Validation(
            "count must be between 1 and 20".into(),
        ));
    }
    if req.no_content != 0 && req.no_content != 1 {
        return Err(ArticleError::Validation("no_content must be 0 or 1".into()));
    }
    Ok(())
}

fn validate_article(req: &ArticleRequest) -> ArticleResult<()> {
    if req.tenant_appid.is_empty() {
        return Err(ArticleError::Validation("tenant_appid is required".into()));
    }
    if req.article_id.is_empty() {
        return Err(ArticleError::Validation("article_id is required".into()));
    }
    Ok(())
}
