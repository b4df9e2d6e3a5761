//! Schema reflection for grpcurl and similar tooling.

use tonic_reflection::server::v1::{ServerReflection, ServerReflectionServer};

use crate::proto::FILE_DESCRIPTOR_SET;

/// Build a `grpc.reflection.v1` service advertising the bridge and health
/// schemas.
pub fn reflection_service(
) -> Result<ServerReflectionServer<impl ServerReflection>, tonic_reflection::server::Error> {
    tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()
}
