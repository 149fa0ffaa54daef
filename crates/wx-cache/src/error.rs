//! Cache error types.

use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Errors surfaced by cache providers.
///
/// A missing key is never an error; lookups return `None` for absence. These
/// variants cover the backend itself misbehaving.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The backend could not be reached or timed out.
    #[error("cache connection error: {0}")]
    Connection(String),

    /// The provider was misconfigured.
    #[error("cache configuration error: {0}")]
    Configuration(String),

    /// Any other backend failure.
    #[error("cache error: {0}")]
    Internal(String),
}
