//! gRPC health check service

use std::pin::Pin;

use tokio_stream::{Stream, StreamExt};
use tonic::{Request, Response, Status};

use crate::health::HealthRegistry;
use crate::proto::health::{health_server, HealthCheckRequest, HealthCheckResponse};

/// `grpc.health.v1.Health` backed by a [`HealthRegistry`].
#[derive(Debug, Clone)]
pub struct HealthService {
    registry: HealthRegistry,
}

impl HealthService {
    pub fn new(registry: HealthRegistry) -> Self {
        Self { registry }
    }
}

#[tonic::async_trait]
impl health_server::Health for HealthService {
    async fn check(
        &self,
        request: Request<HealthCheckRequest>,
    ) -> Result<Response<HealthCheckResponse>, Status> {
        let service = request.into_inner().service;

        match self.registry.query(&service) {
            Some(status) => {
                tracing::debug!(service = %service, status = ?status, "Health check");
                Ok(Response::new(HealthCheckResponse {
                    status: status.into(),
                }))
            }
            None => Err(Status::not_found(format!("unknown service: {}", service))),
        }
    }

    type WatchStream = Pin<Box<dyn Stream<Item = Result<HealthCheckResponse, Status>> + Send>>;

    async fn watch(
        &self,
        request: Request<HealthCheckRequest>,
    ) -> Result<Response<Self::WatchStream>, Status> {
        let service = request.into_inner().service;
        tracing::debug!(service = %service, "Health watch started");

        let updates = self.registry.watch_stream(&service).map(|status| {
            Ok(HealthCheckResponse {
                status: status.into(),
            })
        });

        Ok(Response::new(Box::pin(updates)))
    }
}
