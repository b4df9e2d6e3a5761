//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (port non-zero, timeouts > 0)
//! - Check that the LiveKit URL is present and well-formed
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BridgeConfig → Result<(), Vec<ValidationError>>
//! - Runs before the listener is bound

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::BridgeConfig;

/// URL schemes accepted for the LiveKit server.
const LIVEKIT_SCHEMES: &[&str] = &["ws", "wss", "http", "https"];

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("server.port must be non-zero")]
    ZeroPort,

    #[error("server.host must not be empty")]
    EmptyHost,

    #[error("server.drain_timeout_secs must be greater than zero")]
    ZeroDrainTimeout,

    #[error("server.concurrency_limit_per_connection must be greater than zero")]
    ZeroConcurrencyLimit,

    #[error("livekit.url must be set")]
    MissingLiveKitUrl,

    #[error("livekit.url '{url}' is invalid: {reason}")]
    InvalidLiveKitUrl { url: String, reason: String },

    #[error("observability.metrics_address '{0}' is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Validate a parsed configuration, collecting every error found.
pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.port == 0 {
        errors.push(ValidationError::ZeroPort);
    }
    if config.server.host.trim().is_empty() {
        errors.push(ValidationError::EmptyHost);
    }
    if config.server.drain_timeout_secs == 0 {
        errors.push(ValidationError::ZeroDrainTimeout);
    }
    if config.server.concurrency_limit_per_connection == Some(0) {
        errors.push(ValidationError::ZeroConcurrencyLimit);
    }

    if let Err(e) = validate_livekit_url(&config.livekit.url) {
        errors.push(e);
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Check that `raw` is a non-empty LiveKit URL with a supported scheme.
pub fn validate_livekit_url(raw: &str) -> Result<Url, ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ValidationError::MissingLiveKitUrl);
    }

    let url = Url::parse(raw).map_err(|e| ValidationError::InvalidLiveKitUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    if !LIVEKIT_SCHEMES.contains(&url.scheme()) {
        return Err(ValidationError::InvalidLiveKitUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    if url.host_str().is_none() {
        return Err(ValidationError::InvalidLiveKitUrl {
            url: raw.to_string(),
            reason: "missing host".to_string(),
        });
    }

    Ok(url)
}
