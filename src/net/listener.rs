//! TCP listener for the gRPC server.
//!
//! # Responsibilities
//! - Bind to the configured host and port
//! - Expose accepted connections as a stream for tonic
//! - Allow the accept stream to be closed externally

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_stream::wrappers::TcpListenerStream;

use crate::config::ServerConfig;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The configured host/port is not a socket address.
    #[error("Invalid bind address {addr}: {reason}")]
    InvalidAddress { addr: String, reason: String },

    /// Failed to bind to address.
    #[error("Failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// A bound TCP listener.
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
    closed: Arc<watch::Sender<bool>>,
}

impl Listener {
    /// Bind to the configured address.
    pub async fn bind(config: &ServerConfig) -> Result<Self, ListenerError> {
        let addr_str = config.bind_address();
        let addr: SocketAddr = addr_str.parse().map_err(|e: std::net::AddrParseError| {
            ListenerError::InvalidAddress {
                addr: addr_str.clone(),
                reason: e.to_string(),
            }
        })?;

        Self::bind_addr(addr).await
    }

    /// Bind to an explicit socket address.
    pub async fn bind_addr(addr: SocketAddr) -> Result<Self, ListenerError> {
        let bind_err = |source| ListenerError::Bind {
            addr: addr.to_string(),
            source,
        };

        let inner = TcpListener::bind(addr).await.map_err(bind_err)?;
        let local_addr = inner.local_addr().map_err(bind_err)?;

        tracing::info!(address = %local_addr, "Listener bound");

        let (closed, _) = watch::channel(false);
        Ok(Self {
            inner,
            local_addr,
            closed: Arc::new(closed),
        })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle that ends the accept stream when closed.
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            closed: Arc::clone(&self.closed),
        }
    }

    /// Convert into the stream of accepted connections.
    ///
    /// The stream ends once any [`CloseHandle`] is closed. Accept errors are
    /// yielded as items and do not end the stream.
    pub fn into_incoming(self) -> impl Stream<Item = std::io::Result<TcpStream>> + Send + 'static {
        let mut closed_rx = self.closed.subscribe();
        let keep_open = self.closed;
        let closed: Pin<Box<dyn Future<Output = ()> + Send>> = Box::pin(async move {
            let _keep_open = keep_open;
            let _ = closed_rx.wait_for(|closed| *closed).await;
            tracing::info!("Listener closed");
        });

        TcpListenerStream::new(self.inner)
            .map(prepare_connection)
            .take_until(closed)
    }
}

/// Configure an accepted socket. Failures are logged here since tonic drops
/// errored connections silently.
fn prepare_connection(accepted: std::io::Result<TcpStream>) -> std::io::Result<TcpStream> {
    let stream = accepted.map_err(|e| {
        tracing::warn!(error = %e, "Accept failed");
        e
    })?;
    let peer = stream.peer_addr().ok();
    if let Err(e) = stream.set_nodelay(true) {
        tracing::warn!(peer_addr = ?peer, error = %e, "Failed to set TCP_NODELAY, dropping connection");
        return Err(e);
    }
    tracing::debug!(peer_addr = ?peer, "Connection accepted");
    Ok(stream)
}

/// Closes a [`Listener`]'s accept stream from outside the server task.
#[derive(Debug, Clone)]
pub struct CloseHandle {
    closed: Arc<watch::Sender<bool>>,
}

impl CloseHandle {
    pub fn close(&self) {
        self.closed.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn local_config(port: u16) -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port,
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn bind_fails_when_port_taken() {
        let first = Listener::bind_addr("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let port = first.local_addr().port();

        let err = Listener::bind(&local_config(port)).await.err().unwrap();
        assert!(matches!(err, ListenerError::Bind { .. }));
        assert!(err.to_string().contains(&port.to_string()));
    }

    #[tokio::test]
    async fn invalid_host_is_reported() {
        let mut config = local_config(9090);
        config.host = "not a host".to_string();
        let err = Listener::bind(&config).await.err().unwrap();
        assert!(matches!(err, ListenerError::InvalidAddress { .. }));
    }

    #[tokio::test]
    async fn accepted_connections_have_nodelay() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = TcpStream::connect(addr).await.unwrap();
        let (accepted, _) = listener.accept().await.unwrap();

        let stream = prepare_connection(Ok(accepted)).unwrap();
        assert!(stream.nodelay().unwrap());
    }

    #[test]
    fn accept_errors_are_passed_through() {
        let err = prepare_connection(Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionAborted,
            "aborted",
        )))
        .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::ConnectionAborted);
    }

    #[tokio::test]
    async fn close_ends_incoming_stream() {
        let listener = Listener::bind_addr("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr();
        let handle = listener.close_handle();
        let mut incoming = Box::pin(listener.into_incoming());

        let _client = TcpStream::connect(addr).await.unwrap();
        let accepted = incoming.next().await.unwrap();
        assert!(accepted.is_ok());

        handle.close();
        let next = tokio::time::timeout(Duration::from_secs(1), incoming.next())
            .await
            .unwrap();
        assert!(next.is_none());
    }
}
