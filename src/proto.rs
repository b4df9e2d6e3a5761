//! Generated gRPC code from proto files

pub mod bridge {
    tonic::include_proto!("mentra.livekit.bridge");
}

pub mod health {
    tonic::include_proto!("grpc.health.v1");
}

/// Encoded descriptors for every compiled proto, served by reflection.
pub const FILE_DESCRIPTOR_SET: &[u8] =
    tonic::include_file_descriptor_set!("livekit_bridge_descriptor");

pub use bridge::live_kit_bridge_server::{LiveKitBridge, LiveKitBridgeServer};
pub use health::health_check_response::ServingStatus;
