/// Configuration management for broadcast-service
///
/// Loaded from environment variables (prefix `BROADCAST_`) with `.env`
/// support for local development.
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server host to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port to bind to
    #[serde(default = "default_port")]
    pub port: u16,
    /// Postgres connection URL
    pub database_url: String,
    /// Max connections in the pool
    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,
    /// Redis URL for cache invalidation and realtime publish
    pub redis_url: String,
    /// Webhook signing secret issued by the provider
    pub webhook_secret: String,
    /// Allowed clock skew for signed webhook timestamps, seconds
    #[serde(default = "default_skew")]
    pub webhook_allowed_skew_secs: i64,
    /// Base URL of the external media provider API
    pub provider_api_base: String,
    /// Bearer token for provider API calls
    #[serde(default)]
    pub provider_api_token: Option<String>,
    /// Timeout for outbound provider calls, seconds
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8086
}

fn default_max_connections() -> u32 {
    10
}

fn default_skew() -> i64 {
    300
}

fn default_provider_timeout() -> u64 {
    10
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();
        let cfg = envy::prefixed("BROADCAST_").from_env::<Config>()?;
        Ok(cfg)
    }
}
