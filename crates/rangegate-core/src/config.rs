//! Gateway configuration.
//!
//! Provides [`GatewayConfig`] for configuring the streaming gateway. Values are
//! loaded from environment variables with defaults suitable for local runs.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::GatewayError;
use crate::retry::RetryPolicy;

/// Streaming gateway configuration.
///
/// # Examples
///
/// ```
/// use rangegate_core::config::GatewayConfig;
///
/// let config = GatewayConfig::default();
/// assert_eq!(config.gateway_listen, "0.0.0.0:8080");
/// assert_eq!(config.retry_attempts, 3);
/// ```
#[derive(Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Bind address for the HTTP listener.
    #[builder(default = String::from("0.0.0.0:8080"))]
    pub gateway_listen: String,

    /// Log level filter string, used when `RUST_LOG` is unset.
    #[builder(default = String::from("info"))]
    pub log_level: String,

    /// Root directory served by the directory transport.
    #[builder(default = String::from("./media"))]
    pub upstream_root: String,

    /// Path of the persisted user session, if any.
    #[builder(default, setter(strip_option))]
    pub upstream_session: Option<String>,

    /// Service (bot) token used when no user session is authorized.
    #[builder(default, setter(strip_option))]
    #[serde(skip_serializing)]
    pub upstream_service_token: Option<String>,

    /// JSON file holding the file catalog.
    #[builder(default, setter(strip_option))]
    pub catalog_path: Option<String>,

    /// Per-RPC timeout in seconds; no timeout when unset.
    #[builder(default, setter(strip_option))]
    pub upstream_rpc_timeout_secs: Option<u64>,

    /// Attempts per upstream operation, including the first.
    #[builder(default = 3)]
    pub retry_attempts: u32,

    /// Base backoff delay for transient failures, in milliseconds.
    #[builder(default = 500)]
    pub retry_base_delay_ms: u64,

    /// Wait applied to rate limits that carry no duration, in seconds.
    #[builder(default = 3)]
    pub rate_limit_default_wait_secs: u64,

    /// Whether `x-debug-user-id` is trusted as the caller id for usage logs.
    #[builder(default = false)]
    pub allow_debug_headers: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            gateway_listen: String::from("0.0.0.0:8080"),
            log_level: String::from("info"),
            upstream_root: String::from("./media"),
            upstream_session: None,
            upstream_service_token: None,
            catalog_path: None,
            upstream_rpc_timeout_secs: None,
            retry_attempts: 3,
            retry_base_delay_ms: 500,
            rate_limit_default_wait_secs: 3,
            allow_debug_headers: false,
        }
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("gateway_listen", &self.gateway_listen)
            .field("log_level", &self.log_level)
            .field("upstream_root", &self.upstream_root)
            .field("upstream_session", &self.upstream_session)
            .field(
                "upstream_service_token",
                &self.upstream_service_token.as_ref().map(|_| "<redacted>"),
            )
            .field("catalog_path", &self.catalog_path)
            .field("upstream_rpc_timeout_secs", &self.upstream_rpc_timeout_secs)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field(
                "rate_limit_default_wait_secs",
                &self.rate_limit_default_wait_secs,
            )
            .field("allow_debug_headers", &self.allow_debug_headers)
            .finish()
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `GATEWAY_LISTEN` | `0.0.0.0:8080` |
    /// | `LOG_LEVEL` | `info` |
    /// | `UPSTREAM_ROOT` | `./media` |
    /// | `UPSTREAM_SESSION` | unset |
    /// | `UPSTREAM_SERVICE_TOKEN` | unset |
    /// | `CATALOG_PATH` | unset |
    /// | `UPSTREAM_RPC_TIMEOUT_SECS` | unset |
    /// | `RETRY_ATTEMPTS` | `3` |
    /// | `RETRY_BASE_DELAY_MS` | `500` |
    /// | `RATE_LIMIT_DEFAULT_WAIT_SECS` | `3` |
    /// | `ALLOW_DEBUG_HEADERS` | `false` |
    ///
    /// Unparsable numbers keep their defaults; empty strings count as unset.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("GATEWAY_LISTEN") {
            config.gateway_listen = v;
        }
        if let Some(v) = var("LOG_LEVEL") {
            config.log_level = v;
        }
        if let Some(v) = var("UPSTREAM_ROOT") {
            config.upstream_root = v;
        }
        config.upstream_session = var("UPSTREAM_SESSION");
        config.upstream_service_token = var("UPSTREAM_SERVICE_TOKEN");
        config.catalog_path = var("CATALOG_PATH");
        config.upstream_rpc_timeout_secs = var("UPSTREAM_RPC_TIMEOUT_SECS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0);
        if let Some(n) = var("RETRY_ATTEMPTS").and_then(|v| v.trim().parse::<u32>().ok()) {
            config.retry_attempts = n;
        }
        if let Some(n) = var("RETRY_BASE_DELAY_MS").and_then(|v| v.trim().parse::<u64>().ok()) {
            config.retry_base_delay_ms = n;
        }
        if let Some(n) =
            var("RATE_LIMIT_DEFAULT_WAIT_SECS").and_then(|v| v.trim().parse::<u64>().ok())
        {
            config.rate_limit_default_wait_secs = n;
        }
        if let Some(v) = var("ALLOW_DEBUG_HEADERS") {
            config.allow_debug_headers = parse_bool(&v);
        }

        config
    }

    /// Check that the configuration can produce a usable upstream session.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Configuration`] when neither a user session nor
    /// a service token is configured, or when `retry_attempts` is zero.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.upstream_session.is_none() && self.upstream_service_token.is_none() {
            return Err(GatewayError::Configuration(
                "set UPSTREAM_SESSION or UPSTREAM_SERVICE_TOKEN".to_owned(),
            ));
        }
        if self.retry_attempts == 0 {
            return Err(GatewayError::Configuration(
                "RETRY_ATTEMPTS must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }

    /// Retry policy described by this configuration.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_attempts(self.retry_attempts.max(1))
            .base_delay(Duration::from_millis(self.retry_base_delay_ms))
            .default_rate_limit_wait(Duration::from_secs(self.rate_limit_default_wait_secs))
            .rpc_timeout(self.upstream_rpc_timeout_secs.map(Duration::from_secs))
            .build()
    }
}

/// Parse a string as a boolean, accepting `"1"`, `"true"` and `"yes"`
/// (case-insensitive).
fn parse_bool(value: &str) -> bool {
    let value = value.trim();
    value == "1" || value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("yes")
}
