//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::BridgeConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: {reason}")]
    Env { var: &'static str, reason: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, override and validate configuration.
///
/// Starts from defaults (or the TOML file at `path`), applies environment
/// overrides, then validates the result.
pub fn load_config(path: Option<&Path>) -> Result<BridgeConfig, ConfigError> {
    let config = match path {
        Some(path) => read_config_file(path)?,
        None => BridgeConfig::default(),
    };

    let config = apply_env_overrides(config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Parse a TOML configuration file without validating it.
pub fn read_config_file(path: &Path) -> Result<BridgeConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: BridgeConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Apply environment overrides using `lookup` to resolve variables.
///
/// Empty values are treated as unset.
pub fn apply_env_overrides<F>(mut config: BridgeConfig, lookup: F) -> Result<BridgeConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(port) = get("PORT") {
        config.server.port = parse_env("PORT", &port)?;
    }
    if let Some(host) = get("HOST") {
        config.server.host = host;
    }
    if let Some(secs) = get("DRAIN_TIMEOUT_SECS") {
        config.server.drain_timeout_secs = parse_env("DRAIN_TIMEOUT_SECS", &secs)?;
    }
    if let Some(url) = get("LIVEKIT_URL") {
        config.livekit.url = url;
    }
    if let Some(key) = get("LIVEKIT_API_KEY") {
        config.livekit.api_key = key;
    }
    if let Some(secret) = get("LIVEKIT_API_SECRET") {
        config.livekit.api_secret = secret;
    }
    if let Some(level) = get("LOG_LEVEL") {
        config.observability.log_level = level;
    }
    if let Some(format) = get("LOG_FORMAT") {
        config.observability.log_format = parse_env("LOG_FORMAT", &format)?;
    }
    if let Some(enabled) = get("METRICS_ENABLED") {
        config.observability.metrics_enabled = parse_env("METRICS_ENABLED", &enabled)?;
    }
    if let Some(addr) = get("METRICS_ADDRESS") {
        config.observability.metrics_address = addr;
    }

    Ok(config)
}

fn parse_env<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        var,
        reason: e.to_string(),
    })
}
