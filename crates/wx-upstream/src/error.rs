//! Upstream fault taxonomy and classification.
//!
//! A non-zero `errcode` in any response body is a fault even when the HTTP
//! status is 200. The retry layer re-attempts only transport faults; the
//! pipeline above consumes `CredentialExpired` through its single
//! invalidate-and-retry round.

use thiserror::Error;

/// Errcode reported for an invalid credential.
pub const ERRCODE_INVALID_CREDENTIAL: i64 = 40001;
/// Errcode reported for an expired access token.
pub const ERRCODE_TOKEN_EXPIRED: i64 = 42001;
/// Errcode reported when the caller is throttled.
pub const ERRCODE_RATE_LIMITED: i64 = 45009;

/// Result type for upstream invocations.
pub type UpstreamResult<T> = std::result::Result<T, UpstreamError>;

/// Faults surfaced by upstream invocations.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// The credential used for the call was rejected as expired or invalid.
    #[error("wechat api credential expired: code={code}, msg={message}")]
    CredentialExpired {
        /// Upstream errcode (40001 or 42001).
        code: i64,
        /// Upstream error message.
        message: String,
    },

    /// The upstream throttled the caller.
    #[error("wechat api rate limited: {message}")]
    RateLimited {
        /// Upstream error message.
        message: String,
    },

    /// Any other non-zero errcode.
    #[error("wechat api error: code={code}, msg={message}")]
    Api {
        /// Upstream errcode.
        code: i64,
        /// Upstream error message.
        message: String,
    },

    /// Connection failure, timeout, non-200 status, or unparseable body.
    #[error("upstream transport error: {0}")]
    Transport(String),

    /// The circuit breaker is open; the call never reached the network.
    #[error("wechat api circuit breaker is open")]
    BreakerOpen,

    /// The half-open probe budget is exhausted.
    #[error("wechat api circuit breaker: too many requests in half-open state")]
    BreakerOverloaded,

    /// The caller's cancellation token fired.
    #[error("request cancelled")]
    Cancelled,
}

impl UpstreamError {
    /// Classifies a non-zero errcode into a fault.
    #[must_use]
    pub fn from_errcode(code: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            ERRCODE_INVALID_CREDENTIAL | ERRCODE_TOKEN_EXPIRED => {
                Self::CredentialExpired { code, message }
            }
            ERRCODE_RATE_LIMITED => Self::RateLimited { message },
            _ => Self::Api { code, message },
        }
    }

    /// True when the pipeline should invalidate the credential and retry.
    #[must_use]
    pub const fn is_credential_expired(&self) -> bool {
        matches!(self, Self::CredentialExpired { .. })
    }

    /// True for transport-level faults, the only class the retry layer
    /// re-attempts unconditionally.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// True when the upstream throttled the caller.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}
