//! Native gRPC and gRPC-Web surface.
//!
//! [`GrpcHealth`] implements the tonic-generated `Health` trait on top of a
//! [`LocalHealthClient`], so the tonic server drives the same push-style
//! service through the stream bridge. [`grpc_routes`] packages it as tonic
//! [`Routes`] for the protocol router; gRPC-Web callers reach the same routes
//! through `tonic_web::GrpcWebLayer`.

use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;
use tonic::service::Routes;

use crate::client::LocalHealthClient;
use crate::pb::health_server::{Health, HealthServer};
use crate::pb::{HealthCheckRequest, HealthCheckResponse};
use crate::service::ServiceContext;

#[derive(Debug, Clone)]
pub struct GrpcHealth {
    client: LocalHealthClient,
}

impl GrpcHealth {
    pub fn new(context: &ServiceContext) -> Self {
        Self {
            client: context.local_client(),
        }
    }
}

#[tonic::async_trait]
impl Health for GrpcHealth {
    async fn check(
        &self,
        request: tonic::Request<HealthCheckRequest>,
    ) -> Result<tonic::Response<HealthCheckResponse>, tonic::Status> {
        let response = self.client.check(request.into_inner()).await?;
        Ok(tonic::Response::new(response))
    }

    type WatchStream = BoxStream<'static, Result<HealthCheckResponse, tonic::Status>>;

    async fn watch(
        &self,
        request: tonic::Request<HealthCheckRequest>,
    ) -> Result<tonic::Response<Self::WatchStream>, tonic::Status> {
        // Tonic drops the response stream when the caller goes away, and
        // dropping the handle cancels the call.
        let updates = self
            .client
            .watch(request.into_inner(), &CancellationToken::new())
            .map_err(tonic::Status::from)
            .boxed();
        Ok(tonic::Response::new(updates))
    }
}

/// Tonic routes serving `grpc.health.v1.Health`.
pub fn grpc_routes(context: &ServiceContext) -> Routes {
    Routes::new(HealthServer::new(GrpcHealth::new(context))).prepare()
}
