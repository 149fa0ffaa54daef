//! Token manager faults.

use thiserror::Error;
use wx_upstream::UpstreamError;

/// Result type for token manager operations.
pub type TokenResult<T> = std::result::Result<T, TokenError>;

/// Faults surfaced by the token manager.
///
/// Cloneable because a coalesced refresh delivers the same fault to every
/// waiting caller.
#[derive(Debug, Clone, Error)]
pub enum TokenError {
    /// The identity is not present in configuration.
    #[error("unknown tenant: {0}")]
    UnknownTenant(String),

    /// The upstream fetch failed; never swallowed.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// The caller's cancellation token fired while waiting.
    #[error("request cancelled")]
    Cancelled,

    /// Invariant breakage inside the manager.
    #[error("token manager internal error: {0}")]
    Internal(String),
}

impl TokenError {
    /// True when the underlying fault is an expired credential.
    #[must_use]
    pub fn is_credential_expired(&self) -> bool {
        matches!(self, Self::Upstream(err) if err.is_credential_expired())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_faults_pass_through_transparently() {
        let err = TokenError::from(UpstreamError::from_errcode(42001, "expired"));
        assert!(err.is_credential_expired());
        assert!(err.to_string().contains("code=42001"));

        let err = TokenError::UnknownTenant("wx_ghost".to_string());
        assert!(!err.is_credential_expired());
        assert_eq!(err.to_string(), "unknown tenant: wx_ghost");
    }
}
