//! The health service and the registry that holds it.
//!
//! [`HealthService`] is written push-style: `watch` receives a [`Sink`] and
//! emits updates into it. Every transport (native gRPC, gRPC-Web, JSON) reaches
//! the same implementation through [`ServiceContext`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use healthmux_core::Status;

use crate::bridge::Sink;
use crate::client::LocalHealthClient;
use crate::config::{DEFAULT_WATCH_INTERVAL, DEFAULT_WATCH_UPDATES, ServerConfig};
use crate::pb::{HealthCheckRequest, HealthCheckResponse, ServingStatus};

/// `grpc.health.v1.Health`, as seen by the code that implements it.
#[async_trait]
pub trait HealthService: Send + Sync + 'static {
    /// Report the current serving status.
    async fn check(&self, request: HealthCheckRequest) -> Result<HealthCheckResponse, Status>;

    /// Emit status updates until done, or until `sink.emit` returns `false`.
    ///
    /// Implementations that wait between updates should also watch
    /// `sink.cancellation()`.
    async fn watch(
        &self,
        request: HealthCheckRequest,
        sink: Sink<HealthCheckResponse>,
    ) -> Result<(), Status>;
}

/// Always `SERVING`.
///
/// `watch` sends a fixed number of updates spaced by a fixed interval.
#[derive(Debug, Clone)]
pub struct StatusResponder {
    updates: usize,
    interval: Duration,
}

impl Default for StatusResponder {
    fn default() -> Self {
        Self::new(DEFAULT_WATCH_UPDATES, DEFAULT_WATCH_INTERVAL)
    }
}

impl StatusResponder {
    pub fn new(updates: usize, interval: Duration) -> Self {
        Self { updates, interval }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.watch_updates, config.watch_interval)
    }
}

#[async_trait]
impl HealthService for StatusResponder {
    async fn check(&self, request: HealthCheckRequest) -> Result<HealthCheckResponse, Status> {
        tracing::debug!(service = %request.service, "check");
        Ok(HealthCheckResponse::with_status(ServingStatus::Serving))
    }

    async fn watch(
        &self,
        request: HealthCheckRequest,
        sink: Sink<HealthCheckResponse>,
    ) -> Result<(), Status> {
        tracing::debug!(service = %request.service, updates = self.updates, "watch");

        for sent in 1..=self.updates {
            let update = HealthCheckResponse::with_status(ServingStatus::Serving);
            if !sink.emit(update).await {
                tracing::debug!(sent = sent - 1, "watch consumer went away");
                return Ok(());
            }
            if sent == self.updates {
                break;
            }
            tokio::select! {
                _ = sink.cancellation().cancelled() => {
                    return Err(Status::cancelled("watch cancelled"));
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        Ok(())
    }
}

/// The service instance shared by every transport.
///
/// Built once at startup and handed to the router and the JSON translator.
#[derive(Clone)]
pub struct ServiceContext {
    health: Arc<dyn HealthService>,
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext").finish_non_exhaustive()
    }
}

impl ServiceContext {
    pub fn new<S: HealthService>(health: S) -> Self {
        Self {
            health: Arc::new(health),
        }
    }

    pub fn from_arc(health: Arc<dyn HealthService>) -> Self {
        Self { health }
    }

    /// An in-process client calling the registered service.
    pub fn local_client(&self) -> LocalHealthClient {
        LocalHealthClient::new(Arc::clone(&self.health))
    }
}
