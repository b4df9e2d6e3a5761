//! gRPC server setup and configuration.
//!
//! # Responsibilities
//! - Build the tonic server with keepalive, concurrency and trace layers
//! - Apply the 10 MiB message ceiling to every registered service
//! - Register bridge, health and reflection services
//! - Serve on a bound listener until shutdown, then drain

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;
use tonic::transport::Server;
use tower_http::trace::TraceLayer;

use crate::config::BridgeConfig;
use crate::grpc::health::HealthService;
use crate::grpc::reflection::reflection_service;
use crate::health::HealthRegistry;
use crate::lifecycle::{Lifecycle, LifecycleState, ShutdownSignal};
use crate::net::Listener;
use crate::proto::health::health_server::HealthServer;
use crate::proto::{LiveKitBridge, LiveKitBridgeServer};

/// Inbound and outbound message ceiling (10 MiB) for every service.
pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Health-check identity of the bridge service.
pub const BRIDGE_SERVICE_NAME: &str = "mentra.livekit.bridge.LiveKitBridge";

/// Errors that end the serve loop.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to build reflection service: {0}")]
    Reflection(#[from] tonic_reflection::server::Error),

    #[error("Failed to serve: {0}")]
    Serve(#[from] tonic::transport::Error),

    #[error("Accept loop exited without a shutdown request")]
    UnexpectedExit,
}

/// Composition root for the bridge's gRPC server.
///
/// Generic over the bridge implementation so tests can inject stubs.
pub struct BridgeServer<S> {
    config: Arc<BridgeConfig>,
    bridge: S,
    health: HealthRegistry,
    lifecycle: Lifecycle,
}

impl<S: LiveKitBridge> BridgeServer<S> {
    /// Create a server for `bridge`. Nothing is bound until [`run`](Self::run).
    pub fn new(config: Arc<BridgeConfig>, bridge: S) -> Self {
        Self {
            config,
            bridge,
            health: HealthRegistry::new(),
            lifecycle: Lifecycle::new(),
        }
    }

    /// Health registry shared with the health service.
    pub fn health(&self) -> HealthRegistry {
        self.health.clone()
    }

    /// Lifecycle handle for observing Starting → Stopped.
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.clone()
    }

    /// Serve on `listener` until `shutdown` fires or the accept loop fails.
    ///
    /// On shutdown every health status flips to NOT_SERVING, new connections
    /// are refused, and in-flight calls get `drain_timeout_secs` to finish.
    /// The accept stream ending on its own is reported as
    /// [`ServerError::UnexpectedExit`].
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), ServerError> {
        let Self {
            config,
            bridge,
            health,
            lifecycle,
        } = self;

        let reflection = match reflection_service() {
            Ok(svc) => svc,
            Err(e) => {
                lifecycle.advance(LifecycleState::Stopped);
                return Err(e.into());
            }
        };

        let bridge_svc = LiveKitBridgeServer::new(bridge)
            .max_decoding_message_size(MAX_MESSAGE_SIZE)
            .max_encoding_message_size(MAX_MESSAGE_SIZE);
        let health_svc = HealthServer::new(HealthService::new(health.clone()))
            .max_decoding_message_size(MAX_MESSAGE_SIZE)
            .max_encoding_message_size(MAX_MESSAGE_SIZE);
        let reflection_svc = reflection
            .max_decoding_message_size(MAX_MESSAGE_SIZE)
            .max_encoding_message_size(MAX_MESSAGE_SIZE);

        let keepalive = match config.server.keepalive_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let mut builder = Server::builder().http2_keepalive_interval(keepalive);
        if let Some(limit) = config.server.concurrency_limit_per_connection {
            builder = builder.concurrency_limit_per_connection(limit);
        }

        let router = builder
            .layer(TraceLayer::new_for_grpc())
            .add_service(bridge_svc)
            .add_service(health_svc)
            .add_service(reflection_svc);

        health.set_serving("");
        health.set_serving(BRIDGE_SERVICE_NAME);

        let address = listener.local_addr();
        let (drain_tx, drain_rx) = oneshot::channel::<()>();
        let serve = router.serve_with_incoming_shutdown(listener.into_incoming(), async {
            let _ = drain_rx.await;
        });
        tokio::pin!(serve);

        lifecycle.advance(LifecycleState::Serving);
        tracing::info!(
            address = %address,
            max_message_bytes = MAX_MESSAGE_SIZE,
            "LiveKit gRPC bridge listening"
        );
        tracing::info!("Ready to accept connections");

        let result = tokio::select! {
            result = &mut serve => match result {
                Ok(()) => Err(ServerError::UnexpectedExit),
                Err(e) => Err(ServerError::Serve(e)),
            },
            _ = shutdown.recv() => {
                lifecycle.advance(LifecycleState::Draining);
                health.set_all_not_serving();
                tracing::info!(
                    timeout_secs = config.server.drain_timeout_secs,
                    "Shutdown requested, draining in-flight calls"
                );
                let _ = drain_tx.send(());

                let drain_timeout = Duration::from_secs(config.server.drain_timeout_secs);
                match tokio::time::timeout(drain_timeout, &mut serve).await {
                    Ok(Ok(())) => {
                        tracing::info!("Drain complete");
                        Ok(())
                    }
                    Ok(Err(e)) => Err(ServerError::Serve(e)),
                    Err(_) => {
                        tracing::warn!("Drain timeout elapsed, dropping remaining calls");
                        Ok(())
                    }
                }
            }
        };

        if result.is_err() {
            health.set_all_not_serving();
        }
        lifecycle.advance(LifecycleState::Stopped);
        tracing::info!("gRPC server stopped");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::bridge::live_kit_bridge_server::SERVICE_NAME;

    #[test]
    fn health_identity_matches_generated_service() {
        assert_eq!(BRIDGE_SERVICE_NAME, SERVICE_NAME);
    }

    #[test]
    fn ceiling_is_ten_mebibytes() {
        assert_eq!(MAX_MESSAGE_SIZE, 10_485_760);
    }
}
