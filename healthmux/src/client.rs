//! In-process client for the health service.
//!
//! [`LocalHealthClient`] calls a [`HealthService`] directly, with the same
//! call shapes a remote client sees: `check` returns one response, `watch`
//! returns a [`StreamHandle`] to pull updates from.
//!
//! # Cancellation
//!
//! Dropping the handle returned by [`LocalHealthClient::watch`] stops the
//! call: the service's sink is closed and its cancellation token fires. Use
//! [`StreamHandle::cancel`] instead to also wait for the service to return.
//!
//! ```ignore
//! let client = context.local_client();
//! let mut updates = client.watch(HealthCheckRequest::default(), &CancellationToken::new());
//!
//! while let Some(update) = updates.pull().await? {
//!     println!("status: {:?}", update.status());
//! }
//! ```

use std::sync::Arc;

use healthmux_core::Status;
use tokio_util::sync::CancellationToken;

use crate::bridge::{Sink, StreamBridge, StreamHandle};
use crate::pb::{HealthCheckRequest, HealthCheckResponse};
use crate::service::HealthService;

#[derive(Clone)]
pub struct LocalHealthClient {
    service: Arc<dyn HealthService>,
    watch: StreamBridge<HealthCheckRequest, HealthCheckResponse>,
}

impl std::fmt::Debug for LocalHealthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalHealthClient").finish_non_exhaustive()
    }
}

impl LocalHealthClient {
    pub fn new(service: Arc<dyn HealthService>) -> Self {
        let producer = Arc::clone(&service);
        let watch = StreamBridge::new(
            move |request: HealthCheckRequest, sink: Sink<HealthCheckResponse>| {
                let service = Arc::clone(&producer);
                async move { service.watch(request, sink).await }
            },
        );
        Self { service, watch }
    }

    pub async fn check(&self, request: HealthCheckRequest) -> Result<HealthCheckResponse, Status> {
        self.service.check(request).await
    }

    /// Open a `Watch` call.
    ///
    /// The service does not run until the first pull. Cancelling `cancel`
    /// cancels the call.
    pub fn watch(
        &self,
        request: HealthCheckRequest,
        cancel: &CancellationToken,
    ) -> StreamHandle<HealthCheckResponse> {
        self.watch.open_stream(request, cancel)
    }
}
