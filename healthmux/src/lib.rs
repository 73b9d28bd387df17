//! # healthmux
//!
//! The gRPC health-checking service (`grpc.health.v1.Health`) served to three
//! kinds of callers on one port:
//!
//! - native gRPC (`application/grpc`), handled by tonic;
//! - gRPC-Web (`application/grpc-web*`), handled by tonic behind `tonic_web`;
//! - plain JSON over HTTP (`application/json`), handled by an axum translator.
//!
//! ## Features
//!
//! - **One implementation:** every transport calls the same [`HealthService`].
//! - **Push-style streaming:** `Watch` implementations emit into a [`Sink`];
//!   the [`StreamBridge`] turns that into a pull-style [`StreamHandle`] with
//!   rendezvous backpressure and cooperative cancellation.
//! - **In-process calls:** [`LocalHealthClient`] calls the service with the
//!   same shapes a remote client sees.
//! - **JSON streaming:** `Watch` over JSON answers with newline-delimited
//!   objects (`application/json+stream`).
//!
//! ## Getting Started
//!
//! ```rust,ignore
//! use healthmux::{HealthMuxBuilder, ServerConfig};
//!
//! let config = ServerConfig::from_env()?;
//! let app = HealthMuxBuilder::from_config(&config).build();
//! let listener = tokio::net::TcpListener::bind(config.addr).await?;
//! healthmux::serve(listener, app, std::future::pending()).await?;
//! ```

pub mod bridge;
pub mod client;
pub mod config;
pub mod error;
pub mod grpc;
pub mod json;
pub mod pb;
pub mod protocol;
pub mod router;
pub mod server;
pub mod service;

pub use bridge::{EmitSink, Sink, StreamBridge, StreamHandle, StreamState};
pub use client::LocalHealthClient;
pub use config::{ConfigError, ServerConfig};
pub use error::HttpFailure;
pub use grpc::GrpcHealth;
pub use healthmux_core::{Code, Status};
pub use json::JsonTranslator;
pub use protocol::ContentKind;
pub use router::ProtocolRouter;
pub use server::{HealthMux, HealthMuxBuilder, serve};
pub use service::{HealthService, ServiceContext, StatusResponder};

// Re-export several crates
pub use async_trait::async_trait;
pub use futures;
pub use tokio_util::sync::CancellationToken;
pub use tonic;

pub mod prelude {
    //! A prelude for `healthmux` providing the most common types.
    pub use crate::bridge::{EmitSink, Sink, StreamHandle};
    pub use crate::pb::{HealthCheckRequest, HealthCheckResponse, ServingStatus};
    pub use crate::service::{HealthService, ServiceContext};
    pub use crate::{Code, Status};
    pub use async_trait::async_trait;
    pub use tokio_util::sync::CancellationToken;
}
