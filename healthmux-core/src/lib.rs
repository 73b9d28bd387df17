//! Core status types for healthmux.
//!
//! This crate provides the transport-neutral outcome model shared by the
//! native gRPC, gRPC-Web and JSON paths of the `healthmux` server.
//!
//! ## Modules
//!
//! - [`error`]: RPC status codes, the [`Status`] error type, and the mapping
//!   from codes to HTTP status codes

pub mod error;

pub use error::*;
