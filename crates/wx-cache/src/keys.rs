//! Token key schema.
//!
//! These key strings are shared with other implementations operating on the
//! same Redis deployment and must not change.

/// Returns the cache key for the platform (component) credential.
#[must_use]
pub fn platform_token_key(platform_appid: &str) -> String {
    format!("wechat:token:component:{platform_appid}")
}

/// Returns the cache key for a tenant (authorizer) credential.
///
/// Simple-mode tokens intentionally share this slot so the caller surface
/// is identical in both deployment modes.
#[must_use]
pub fn tenant_token_key(tenant_appid: &str) -> String {
    format!("wechat:token:authorizer:{tenant_appid}")
}
