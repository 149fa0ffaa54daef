//! Shared application state.

use std::sync::Arc;

use wx_article::ArticleService;
use wx_cache::TokenStore;

/// State passed to all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Article pipeline.
    pub articles: Arc<ArticleService>,
    /// Credential store; the readiness probe exercises its connection.
    pub store: TokenStore,
}

impl AppState {
    /// Creates the application state.
    pub fn new(articles: Arc<ArticleService>, store: TokenStore) -> Self {
        Self { articles, store }
    }
}
