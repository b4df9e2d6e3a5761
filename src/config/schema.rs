//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the bridge.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Deserializer, Serialize};

/// Root configuration for the LiveKit bridge.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    /// gRPC listener and drain settings.
    pub server: ServerConfig,

    /// Downstream LiveKit deployment.
    pub livekit: LiveKitConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// gRPC server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind (all interfaces by default).
    pub host: String,

    /// Listening port. Accepts `9090` or `"9090"` in config files.
    #[serde(deserialize_with = "port_from_int_or_string")]
    pub port: u16,

    /// Upper bound on waiting for in-flight calls during shutdown.
    pub drain_timeout_secs: u64,

    /// HTTP/2 keepalive ping interval; 0 disables pings.
    pub keepalive_interval_secs: u64,

    /// Optional cap on concurrent requests per connection.
    pub concurrency_limit_per_connection: Option<usize>,
}

impl ServerConfig {
    /// Address the gRPC listener binds to, e.g. `0.0.0.0:9090`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9090,
            drain_timeout_secs: 30,
            keepalive_interval_secs: 30,
            concurrency_limit_per_connection: None,
        }
    }
}

/// LiveKit deployment the bridge connects rooms through.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct LiveKitConfig {
    /// Server URL (e.g., "wss://livekit.example.com"). Used when a
    /// JoinRoom request does not carry its own URL.
    pub url: String,

    /// API key for server-side token operations.
    pub api_key: String,

    /// API secret paired with `api_key`.
    #[serde(skip_serializing)]
    pub api_secret: String,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable multi-line output.
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level or filter directive (trace, debug, info, warn, error).
    pub log_level: String,

    /// Output format for log lines.
    pub log_format: LogFormat,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9091".to_string(),
        }
    }
}

fn port_from_int_or_string<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Int(u16),
        Str(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Int(port) => Ok(port),
        Port::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
