//! Startup orchestration.
//!
//! # Responsibilities
//! - Bind the listener from validated configuration
//! - Hand the bound listener to the gRPC server
//! - Run until shutdown or a fatal serve error
//!
//! # Design Decisions
//! - Fail fast: a bind error is fatal and nothing reports SERVING
//! - The shutdown subscription is taken before binding, so a signal that
//!   arrives during startup is not lost

use std::sync::Arc;

use thiserror::Error;

use crate::config::BridgeConfig;
use crate::grpc::{BridgeServer, ServerError};
use crate::lifecycle::{LifecycleState, Shutdown};
use crate::net::{Listener, ListenerError};
use crate::proto::LiveKitBridge;

/// Errors that abort startup or end the server.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Bind the configured address and serve `bridge` until `shutdown` fires.
pub async fn run<S: LiveKitBridge>(
    config: Arc<BridgeConfig>,
    bridge: S,
    shutdown: &Shutdown,
) -> Result<(), StartupError> {
    let shutdown_rx = shutdown.subscribe();
    let server = BridgeServer::new(Arc::clone(&config), bridge);

    let listener = match Listener::bind(&config.server).await {
        Ok(listener) => listener,
        Err(e) => {
            server.lifecycle().advance(LifecycleState::Stopped);
            return Err(e.into());
        }
    };

    server.run(listener, shutdown_rx).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{LiveKitBridgeService, LoopbackBackend};

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let taken = Listener::bind_addr("127.0.0.1:0".parse().unwrap()).await.unwrap();

        let mut config = BridgeConfig::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = taken.local_addr().port();
        config.livekit.url = "ws://localhost:7880".to_string();
        let config = Arc::new(config);

        let bridge = LiveKitBridgeService::new(Arc::clone(&config), LoopbackBackend::new());
        let err = run(config, bridge, &Shutdown::new()).await.unwrap_err();
        assert!(matches!(err, StartupError::Listener(ListenerError::Bind { .. })));
    }

    #[tokio::test]
    async fn shutdown_requested_before_bind_is_honoured() {
        let mut config = BridgeConfig::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        config.livekit.url = "ws://localhost:7880".to_string();
        let config = Arc::new(config);

        let shutdown = Shutdown::new();
        shutdown.trigger();

        let bridge = LiveKitBridgeService::new(Arc::clone(&config), LoopbackBackend::new());
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            run(config, bridge, &shutdown),
        )
        .await
        .unwrap();
        assert!(result.is_ok());
    }
}
