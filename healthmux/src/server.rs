//! Assembly of the single-port service.
//!
//! ```rust,ignore
//! use healthmux::{HealthMuxBuilder, ServerConfig};
//!
//! let config = ServerConfig::from_env()?;
//! let app = HealthMuxBuilder::from_config(&config).build();
//!
//! let listener = tokio::net::TcpListener::bind(config.addr).await?;
//! healthmux::serve(listener, app, std::future::pending()).await?;
//! ```

use std::future::Future;

use axum::Router;
use tokio::net::TcpListener;
use tonic::service::Routes;
use tonic_web::{GrpcWebLayer, GrpcWebService};
use tower::Layer;

use crate::config::{DEFAULT_MAX_REQUEST_BYTES, ServerConfig};
use crate::grpc::grpc_routes;
use crate::json::JsonTranslator;
use crate::router::ProtocolRouter;
use crate::service::{ServiceContext, StatusResponder};

/// The assembled service: tonic routes, the same routes behind the gRPC-Web
/// layer, and the JSON translator.
pub type HealthMux = ProtocolRouter<Routes, GrpcWebService<Routes>, Router>;

/// Builds a [`HealthMux`] around one [`ServiceContext`].
#[derive(Debug, Clone)]
pub struct HealthMuxBuilder {
    context: ServiceContext,
    max_request_bytes: usize,
}

impl HealthMuxBuilder {
    pub fn new(context: ServiceContext) -> Self {
        Self {
            context,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
        }
    }

    /// The reference [`StatusResponder`] configured from `config`.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(ServiceContext::new(StatusResponder::from_config(config)))
            .max_request_bytes(config.max_request_bytes)
    }

    /// Limit on JSON request bodies. Default is 4 MB.
    pub fn max_request_bytes(mut self, bytes: usize) -> Self {
        self.max_request_bytes = bytes;
        self
    }

    pub fn build(self) -> HealthMux {
        let grpc = grpc_routes(&self.context);
        let grpc_web = GrpcWebLayer::new().layer(grpc.clone());
        let json = JsonTranslator::new(&self.context)
            .max_request_bytes(self.max_request_bytes)
            .into_router();
        ProtocolRouter::new(grpc, grpc_web, json)
    }
}

/// Serve `app` on `listener`, HTTP/1.1 and cleartext HTTP/2, until `shutdown`
/// resolves.
pub async fn serve<F>(listener: TcpListener, app: HealthMux, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, tower::make::Shared::new(app))
        .with_graceful_shutdown(shutdown)
        .await
}
