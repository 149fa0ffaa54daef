//! Configuration loading and validation.
//!
//! Configuration is read from a YAML file whose path comes from the
//! `WX_CONFIG` environment variable (default `configs/config.yaml`), with a
//! `.env` file honoured for local development. The structure is validated
//! after load; which fields are required depends on the deployment mode.
//!
//! ## Deployment modes
//!
//! - **Simple mode** (`wechat.simple_mode.enabled`): the service talks to
//!   the upstream directly with per-account `app_id`/`app_secret` pairs.
//! - **Two-level mode** (default): the service holds platform credentials
//!   and a list of authorized tenant accounts with their refresh tokens.
//!
//! Both modes cache tenant tokens in the same `wechat:token:authorizer:*`
//! slots so the caller surface is identical. Switching modes against a warm
//! cache would serve tokens minted for the other mode: wipe the cache when
//! changing `simple_mode.enabled` on an existing deployment.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "WX_CONFIG";

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration.
    #[serde(default)]
    pub log: LogConfig,
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Redis connection settings.
    pub redis: RedisSettings,
    /// WeChat platform and account configuration.
    pub wechat: WechatConfig,
    /// Upstream HTTP client settings.
    #[serde(default)]
    pub upstream: UpstreamSettings,
    /// Circuit breaker settings.
    #[serde(default)]
    pub breaker: BreakerSettings,
    /// Token cache and refresh policy.
    #[serde(default)]
    pub tokens: TokenSettings,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Service name attached to startup logs.
    #[serde(default = "default_service_name")]
    pub service: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            service: default_service_name(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port the HTTP listener binds to.
    pub http_port: u16,
}

/// Redis connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    /// Redis server host.
    pub host: String,
    /// Redis server port.
    #[serde(default = "default_redis_port")]
    pub port: u16,
    /// Username for ACL-enabled deployments.
    pub username: Option<String>,
    /// Password (optional).
    pub password: Option<String>,
    /// Database number.
    #[serde(default)]
    pub db: u8,
}

/// WeChat platform and account configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WechatConfig {
    /// Simple mode settings.
    #[serde(default)]
    pub simple_mode: SimpleModeConfig,
    /// Third-party platform credentials (two-level mode).
    #[serde(default)]
    pub platform: PlatformConfig,
    /// Authorized tenant accounts (two-level mode).
    #[serde(default)]
    pub authorizers: Vec<AuthorizerConfig>,
}

impl WechatConfig {
    /// Returns true when the deployment operates in simple mode.
    #[must_use]
    pub fn is_simple_mode(&self) -> bool {
        self.simple_mode.enabled && !self.simple_mode.accounts.is_empty()
    }

    /// Looks up a simple-mode account by appid.
    #[must_use]
    pub fn simple_account(&self, app_id: &str) -> Option<&SimpleAccount> {
        self.simple_mode
            .accounts
            .iter()
            .find(|account| account.app_id == app_id)
    }

    /// Looks up an authorized tenant account by appid.
    #[must_use]
    pub fn authorizer(&self, app_id: &str) -> Option<&AuthorizerConfig> {
        self.authorizers
            .iter()
            .find(|authorizer| authorizer.app_id == app_id)
    }
}

/// Simple mode settings (direct access tokens, no platform credential).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimpleModeConfig {
    /// Whether simple mode is active.
    #[serde(default)]
    pub enabled: bool,
    /// Accounts served in simple mode.
    #[serde(default)]
    pub accounts: Vec<SimpleAccount>,
}

/// Credentials of one simple-mode account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleAccount {
    /// Account appid.
    pub app_id: String,
    /// Account secret.
    pub app_secret: String,
}

/// Third-party platform credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Platform appid.
    #[serde(default)]
    pub app_id: String,
    /// Platform secret.
    #[serde(default)]
    pub app_secret: String,
    /// Verify ticket pushed by the upstream.
    #[serde(default)]
    pub verify_ticket: String,
}

/// One authorized tenant account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizerConfig {
    /// Tenant appid.
    pub app_id: String,
    /// Long-lived refresh token for the tenant. Read-only: a rotated value
    /// reported by the upstream must be applied to this file out of band.
    pub refresh_token: String,
}

/// Upstream HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamSettings {
    /// Base URL of the WeChat API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Maximum retries of transport faults per call.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Whether rate-limit responses are retried like transport faults.
    /// The upstream typically recovers slowly from throttling, so this is
    /// off by default.
    #[serde(default)]
    pub retry_rate_limited: bool,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            max_retries: default_max_retries(),
            request_timeout_secs: default_request_timeout_secs(),
            retry_rate_limited: false,
        }
    }
}

impl UpstreamSettings {
    /// Returns the per-request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Circuit breaker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSettings {
    /// Consecutive failures that trip the breaker.
    #[serde(default = "default_failures_to_trip")]
    pub consecutive_failures_to_trip: u32,
    /// Seconds spent open before probing the upstream again.
    #[serde(default = "default_open_timeout_secs")]
    pub open_timeout_secs: u64,
    /// Concurrent probes allowed while half-open.
    #[serde(default = "default_half_open_max_concurrent")]
    pub half_open_max_concurrent: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            consecutive_failures_to_trip: default_failures_to_trip(),
            open_timeout_secs: default_open_timeout_secs(),
            half_open_max_concurrent: default_half_open_max_concurrent(),
        }
    }
}

impl BreakerSettings {
    /// Returns the open-state timeout.
    #[must_use]
    pub const fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.open_timeout_secs)
    }
}

/// Token cache and refresh policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSettings {
    /// Remaining lifetime in seconds below which a cache hit schedules a
    /// background refresh.
    #[serde(default = "default_refresh_threshold_secs")]
    pub proactive_refresh_threshold_secs: u64,
    /// Seconds subtracted from the upstream-reported lifetime when caching.
    #[serde(default = "default_safety_margin_secs")]
    pub cache_safety_margin_secs: u64,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            proactive_refresh_threshold_secs: default_refresh_threshold_secs(),
            cache_safety_margin_secs: default_safety_margin_secs(),
        }
    }
}

impl TokenSettings {
    /// Returns the proactive refresh threshold.
    #[must_use]
    pub const fn proactive_refresh_threshold(&self) -> Duration {
        Duration::from_secs(self.proactive_refresh_threshold_secs)
    }

    /// Returns the cache safety margin.
    #[must_use]
    pub const fn cache_safety_margin(&self) -> Duration {
        Duration::from_secs(self.cache_safety_margin_secs)
    }
}

impl Config {
    /// Loads configuration from the given YAML file and validates it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        let config: Self = serde_yaml::from_str(&raw)
            .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from the path named by `WX_CONFIG`.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(path)
    }

    /// Validates mode-dependent requirements.
    pub fn validate(&self) -> Result<()> {
        if self.server.http_port == 0 {
            return Err(Error::Validation("server.http_port is required".into()));
        }
        if self.redis.host.is_empty() {
            return Err(Error::Validation("redis.host is required".into()));
        }

        if self.wechat.is_simple_mode() {
            for (i, account) in self.wechat.simple_mode.accounts.iter().enumerate() {
                if account.app_id.is_empty() {
                    return Err(Error::Validation(format!(
                        "wechat.simple_mode.accounts[{i}].app_id is required"
                    )));
                }
                if account.app_secret.is_empty() {
                    return Err(Error::Validation(format!(
                        "wechat.simple_mode.accounts[{i}].app_secret is required"
                    )));
                }
            }
            return Ok(());
        }

        if self.wechat.platform.app_id.is_empty() {
            return Err(Error::Validation(
                "wechat.platform.app_id is required when simple mode is disabled".into(),
            ));
        }
        if self.wechat.platform.app_secret.is_empty() {
            return Err(Error::Validation(
                "wechat.platform.app_secret is required when simple mode is disabled".into(),
            ));
        }
        if self.wechat.platform.verify_ticket.is_empty() {
            return Err(Error::Validation(
                "wechat.platform.verify_ticket is required when simple mode is disabled".into(),
            ));
        }
        if self.wechat.authorizers.is_empty() {
            return Err(Error::Validation(
                "wechat.authorizers is required when simple mode is disabled".into(),
            ));
        }
        for (i, authorizer) in self.wechat.authorizers.iter().enumerate() {
            if authorizer.app_id.is_empty() {
                return Err(Error::Validation(format!(
                    "wechat.authorizers[{i}].app_id is required"
                )));
            }
            if authorizer.refresh_token.is_empty() {
                return Err(Error::Validation(format!(
                    "wechat.authorizers[{i}].refresh_token is required"
                )));
            }
        }
        Ok(())
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "wechat-publish".to_string()
}

const fn default_redis_port() -> u16 {
    6379
}

fn default_base_url() -> String {
    "https://api.weixin.qq.com".to_string()
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_request_timeout_secs() -> u64 {
    10
}

const fn default_failures_to_trip() -> u32 {
    5
}

const fn default_open_timeout_secs() -> u64 {
    60
}

const fn default_half_open_max_concurrent() -> u32 {
    3
}

const fn default_refresh_threshold_secs() -> u64 {
    600
}

const fn default_safety_margin_secs() -> u64 {
    300
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_level_yaml() -> &'static str {
        r#"
server:
  http_port: 8080
redis:
  host: localhost
wechat:
  platform:
    app_id: wx_platform
    app_secret: secret
    verify_ticket: ticket
  authorizers:
    - app_id: wx_tenant_1
      refresh_token: refresh-1
"#
    }

    #[test]
    fn parses_two_level_config_with_defaults() {
        let config: Config = serde_yaml::from_str(two_level_yaml()).unwrap();
        config.validate().unwrap();

        assert!(!config.wechat.is_simple_mode());
        assert_eq!(config.upstream.base_url, "https://api.weixin.qq.com");
        assert_eq!(config.upstream.max_retries, 3);
        assert_eq!(config.upstream.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.breaker.consecutive_failures_to_trip, 5);
        assert_eq!(config.breaker.open_timeout(), Duration::from_secs(60));
        assert_eq!(config.breaker.half_open_max_concurrent, 3);
        assert_eq!(
            config.tokens.proactive_refresh_threshold(),
            Duration::from_secs(600)
        );
        assert_eq!(config.tokens.cache_safety_margin(), Duration::from_secs(300));
        assert_eq!(config.redis.port, 6379);
    }

    #[test]
    fn parses_simple_mode_config() {
        let yaml = r#"
server:
  http_port: 8080
redis:
  host: localhost
wechat:
  simple_mode:
    enabled: true
    accounts:
      - app_id: wx_simple
        app_secret: s3cr3t
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();

        assert!(config.wechat.is_simple_mode());
        assert!(config.wechat.simple_account("wx_simple").is_some());
        assert!(config.wechat.simple_account("unknown").is_none());
    }

    #[test]
    fn two_level_mode_requires_platform_credentials() {
        let yaml = r#"
server:
  http_port: 8080
redis:
  host: localhost
wechat:
  authorizers:
    - app_id: wx_tenant_1
      refresh_token: refresh-1
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("wechat.platform.app_id"));
    }

    #[test]
    fn simple_mode_requires_account_secrets() {
        let yaml = r#"
server:
  http_port: 8080
redis:
  host: localhost
wechat:
  simple_mode:
    enabled: true
    accounts:
      - app_id: wx_simple
        app_secret: ""
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("app_secret"));
    }

    #[test]
    fn authorizer_lookup_by_appid() {
        let config: Config = serde_yaml::from_str(two_level_yaml()).unwrap();
        assert_eq!(
            config.wechat.authorizer("wx_tenant_1").unwrap().refresh_token,
            "refresh-1"
        );
        assert!(config.wechat.authorizer("wx_tenant_2").is_none());
    }

    #[test]
    fn simple_mode_disabled_when_account_list_is_empty() {
        let yaml = r#"
server:
  http_port: 8080
redis:
  host: localhost
wechat:
  simple_mode:
    enabled: true
  platform:
    app_id: wx_platform
    app_secret: secret
    verify_ticket: ticket
  authorizers:
    - app_id: wx_tenant_1
      refresh_token: refresh-1
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(!config.wechat.is_simple_mode());
        config.validate().unwrap();
    }
}
