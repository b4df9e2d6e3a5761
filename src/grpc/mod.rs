//! gRPC surface of the bridge.
//!
//! # Data Flow
//! ```text
//! Listener (net/listener.rs)
//!     → tonic Server (server.rs): TraceLayer, keepalive, 10 MiB limits
//!         → mentra.livekit.bridge.LiveKitBridge (bridge/service.rs)
//!         → grpc.health.v1.Health (health.rs)
//!         → grpc.reflection.v1.ServerReflection (reflection.rs)
//! ```

pub mod health;
pub mod reflection;
pub mod server;

pub use health::HealthService;
pub use server::{BridgeServer, ServerError, BRIDGE_SERVICE_NAME, MAX_MESSAGE_SIZE};
