//! Article pipeline faults.

use thiserror::Error;
use wx_token::TokenError;
use wx_upstream::UpstreamError;

/// Result type for article pipeline operations.
pub type ArticleResult<T> = std::result::Result<T, ArticleError>;

/// Faults surfaced by the article pipeline.
#[derive(Debug, Error)]
pub enum ArticleError {
    /// The request failed validation; nothing was looked up or fetched.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Token acquisition failed.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// The article call itself failed.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}
