//! LiveKit gRPC bridge.
//!
//! Carries session control, bidirectional audio and playback control between
//! the cloud service and a real-time media room over gRPC.
//!
//! # Architecture Overview
//!
//! ```text
//!     cloud client                ┌──────────────────────────────────────────────┐
//!     ────────────────────────────┼─▶ net::Listener ─▶ tonic Server (grpc)       │
//!                                 │                      ├─ LiveKitBridge ─▶ bridge::RoomBackend
//!                                 │                      ├─ grpc.health.v1        │
//!                                 │                      └─ reflection v1         │
//!                                 │                                              │
//!                                 │  config · observability · lifecycle          │
//!                                 └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use livekit_bridge::config::{load_config, ObservabilityConfig};
use livekit_bridge::lifecycle::{signals, startup, Shutdown};
use livekit_bridge::observability::{logging, metrics};
use livekit_bridge::{LiveKitBridgeService, LoopbackBackend};

#[derive(Parser)]
#[command(name = "livekit-bridge")]
#[command(about = "gRPC bridge between the cloud service and LiveKit rooms", long_about = None)]
struct Args {
    /// Path to a TOML config file; defaults and environment are used without one.
    #[arg(short, long, env = "BRIDGE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            // Logging settings come from the config, so fall back to defaults.
            let _ = logging::init_logging(&ObservabilityConfig::default());
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    if let Err(e) = logging::init_logging(&config.observability) {
        eprintln!("livekit-bridge: {}", e);
        std::process::exit(1);
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting LiveKit gRPC Bridge...");
    tracing::info!(
        port = config.server.port,
        livekit_url = %config.livekit.url,
        drain_timeout_secs = config.server.drain_timeout_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let started = config
            .observability
            .metrics_address
            .parse()
            .map_err(|e: std::net::AddrParseError| e.to_string())
            .and_then(|addr| metrics::init_metrics(addr).map_err(|e| e.to_string()));
        if let Err(e) = started {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to start metrics endpoint"
            );
            std::process::exit(1);
        }
    }

    let config = Arc::new(config);
    let shutdown = Shutdown::new();
    let _signals = signals::spawn_signal_handler(shutdown.clone());

    let bridge = LiveKitBridgeService::new(Arc::clone(&config), LoopbackBackend::new());
    if let Err(e) = startup::run(config, bridge, &shutdown).await {
        tracing::error!(error = %e, "LiveKit gRPC bridge failed");
        std::process::exit(1);
    }

    tracing::info!("Shutdown complete");
}
