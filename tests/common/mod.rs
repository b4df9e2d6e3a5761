//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_stream::Stream;
use tonic::transport::Channel;
use tonic::{Request, Response, Status, Streaming};

use livekit_bridge::config::BridgeConfig;
use livekit_bridge::grpc::{BridgeServer, ServerError};
use livekit_bridge::net::{CloseHandle, Listener};
use livekit_bridge::proto::bridge::{
    AudioChunk, JoinRoomRequest, JoinRoomResponse, LeaveRoomRequest, LeaveRoomResponse,
    PlayAudioEvent, PlayAudioRequest, StopAudioRequest, StopAudioResponse,
};
use livekit_bridge::proto::health::health_client::HealthClient;
use livekit_bridge::proto::health::HealthCheckRequest;
use livekit_bridge::proto::{LiveKitBridge, ServingStatus};
use livekit_bridge::{HealthRegistry, Lifecycle, Shutdown};

/// Config bound to an ephemeral loopback port.
pub fn test_config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.server.drain_timeout_secs = 5;
    config.livekit.url = "ws://localhost:7880".to_string();
    config
}

type StubStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>>;

/// Bridge stand-in: JoinRoom sleeps for `delay`, every call is counted.
#[derive(Clone, Default)]
pub struct StubBridge {
    pub delay: Duration,
    pub joins: Arc<AtomicUsize>,
    pub audio_chunks: Arc<AtomicUsize>,
}

impl StubBridge {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn joins(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }
}

#[tonic::async_trait]
impl LiveKitBridge for StubBridge {
    async fn join_room(
        &self,
        _request: Request<JoinRoomRequest>,
    ) -> Result<Response<JoinRoomResponse>, Status> {
        tokio::time::sleep(self.delay).await;
        self.joins.fetch_add(1, Ordering::SeqCst);
        Ok(Response::new(JoinRoomResponse {
            success: true,
            participant_id: "PA_stub".to_string(),
            participant_count: 1,
            ..Default::default()
        }))
    }

    async fn leave_room(
        &self,
        _request: Request<LeaveRoomRequest>,
    ) -> Result<Response<LeaveRoomResponse>, Status> {
        Ok(Response::new(LeaveRoomResponse {
            success: true,
            error: String::new(),
        }))
    }

    type StreamAudioStream = StubStream<AudioChunk>;

    async fn stream_audio(
        &self,
        request: Request<Streaming<AudioChunk>>,
    ) -> Result<Response<Self::StreamAudioStream>, Status> {
        let mut inbound = request.into_inner();
        while inbound.message().await?.is_some() {
            self.audio_chunks.fetch_add(1, Ordering::SeqCst);
        }
        Ok(Response::new(Box::pin(tokio_stream::empty())))
    }

    type PlayAudioStream = StubStream<PlayAudioEvent>;

    async fn play_audio(
        &self,
        _request: Request<PlayAudioRequest>,
    ) -> Result<Response<Self::PlayAudioStream>, Status> {
        Ok(Response::new(Box::pin(tokio_stream::empty())))
    }

    async fn stop_audio(
        &self,
        _request: Request<StopAudioRequest>,
    ) -> Result<Response<StopAudioResponse>, Status> {
        Ok(Response::new(StopAudioResponse::default()))
    }
}

/// Handles onto a server running in a background task.
pub struct RunningServer {
    pub addr: SocketAddr,
    pub health: HealthRegistry,
    pub lifecycle: Lifecycle,
    pub close: CloseHandle,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<Result<(), ServerError>>,
}

impl RunningServer {
    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }
}

/// Start `bridge` on an ephemeral port with [`test_config`].
pub async fn start_server<S: LiveKitBridge>(bridge: S) -> RunningServer {
    start_server_with(test_config(), bridge).await
}

pub async fn start_server_with<S: LiveKitBridge>(config: BridgeConfig, bridge: S) -> RunningServer {
    let listener = Listener::bind(&config.server).await.unwrap();
    let addr = listener.local_addr();
    let close = listener.close_handle();

    let server = BridgeServer::new(Arc::new(config), bridge);
    let health = server.health();
    let lifecycle = server.lifecycle();

    let shutdown = Shutdown::new();
    let shutdown_rx = shutdown.subscribe();
    let handle = tokio::spawn(server.run(listener, shutdown_rx));

    RunningServer {
        addr,
        health,
        lifecycle,
        close,
        shutdown,
        handle,
    }
}

pub async fn connect(server: &RunningServer) -> Channel {
    Channel::from_shared(server.endpoint())
        .unwrap()
        .connect()
        .await
        .unwrap()
}

/// Poll the health service until `service` reports SERVING.
pub async fn wait_for_serving(server: &RunningServer, service: &str) {
    let mut client = HealthClient::new(connect(server).await);
    let poll = async {
        loop {
            let status = client
                .check(HealthCheckRequest {
                    service: service.to_string(),
                })
                .await
                .map(|r| r.into_inner().status());
            if matches!(status, Ok(ServingStatus::Serving)) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), poll)
        .await
        .expect("service never reported SERVING");
}
