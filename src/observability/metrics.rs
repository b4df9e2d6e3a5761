//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define bridge metrics (sessions, audio throughput, playbacks)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `livekit_bridge_rooms_joined_total` (counter): successful JoinRoom calls
//! - `livekit_bridge_join_failures_total` (counter): JoinRoom backend failures
//! - `livekit_bridge_active_sessions` (gauge): users currently in a room
//! - `livekit_bridge_audio_bytes_total` (counter): PCM bytes by direction
//! - `livekit_bridge_playbacks_total` (counter): finished playbacks by outcome

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and start its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe();
    tracing::info!(address = %addr, "Metrics endpoint started");
    Ok(())
}

fn describe() {
    describe_counter!(
        "livekit_bridge_rooms_joined_total",
        "Successful JoinRoom calls"
    );
    describe_counter!(
        "livekit_bridge_join_failures_total",
        "JoinRoom calls rejected by the media backend"
    );
    describe_gauge!(
        "livekit_bridge_active_sessions",
        "Users currently joined to a room"
    );
    describe_counter!(
        "livekit_bridge_audio_bytes_total",
        "PCM bytes relayed, by direction"
    );
    describe_counter!(
        "livekit_bridge_playbacks_total",
        "Finished playbacks, by outcome"
    );
}

pub fn record_join(active_sessions: usize) {
    counter!("livekit_bridge_rooms_joined_total").increment(1);
    gauge!("livekit_bridge_active_sessions").set(active_sessions as f64);
}

pub fn record_join_failure() {
    counter!("livekit_bridge_join_failures_total").increment(1);
}

pub fn record_leave(active_sessions: usize) {
    gauge!("livekit_bridge_active_sessions").set(active_sessions as f64);
}

/// `direction` is `inbound` (user → room) or `outbound` (room → user).
pub fn record_audio(direction: &'static str, bytes: usize) {
    counter!("livekit_bridge_audio_bytes_total", "direction" => direction).increment(bytes as u64);
}

/// `outcome` is `completed`, `failed`, `stopped`, or `abandoned` when the
/// caller went away first.
pub fn record_playback(outcome: &'static str) {
    counter!("livekit_bridge_playbacks_total", "outcome" => outcome).increment(1);
}
