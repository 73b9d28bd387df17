//! Generated `grpc.health.v1` types.
//!
//! Messages and tonic stubs come from `tonic-prost-build`; the serde
//! implementations come from `pbjson-build` with default-valued fields emitted,
//! so `{"status":"UNKNOWN"}` is written instead of `{}`.

#![allow(clippy::all)]

include!(concat!(env!("OUT_DIR"), "/grpc.health.v1.rs"));
include!(concat!(env!("OUT_DIR"), "/grpc.health.v1.serde.rs"));

pub use health_check_response::ServingStatus;

impl HealthCheckResponse {
    /// Response carrying the given serving status.
    pub fn with_status(status: ServingStatus) -> Self {
        Self {
            status: status as i32,
        }
    }
}
