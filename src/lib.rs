//! LiveKit gRPC bridge library.

pub mod bridge;
pub mod config;
pub mod grpc;
pub mod health;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod proto;

pub use bridge::{LiveKitBridgeService, LoopbackBackend, RoomBackend};
pub use config::schema::BridgeConfig;
pub use grpc::BridgeServer;
pub use health::HealthRegistry;
pub use lifecycle::{Lifecycle, LifecycleState, Shutdown};
pub use net::Listener;
