//! JSON translation of the health service.
//!
//! Plain HTTP callers post a JSON request to the method path and get JSON back:
//!
//! ```text
//! POST /grpc.health.v1.Health/Check   {"service":""}  ->  {"status":"SERVING"}
//! POST /grpc.health.v1.Health/Watch   {"service":""}  ->  {"status":"SERVING"}\n
//!                                                          {"status":"SERVING"}\n ...
//! ```
//!
//! `Watch` answers with `application/json+stream`: one object per line, each
//! line written as its own body frame as soon as the service emits it. The
//! next update is not requested from the service until hyper has taken the
//! previous line, so a slow reader slows the service down.
//!
//! Errors before anything was written become a plain-text response with the
//! status taken from the failure's code. A `Watch` failure after the first
//! line cannot change the status any more; the body just ends.

use std::convert::Infallible;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use bytes::Bytes;
use futures::Stream;
use http::header::CONTENT_TYPE;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::bridge::StreamHandle;
use crate::client::LocalHealthClient;
use crate::config::DEFAULT_MAX_REQUEST_BYTES;
use crate::error::HttpFailure;
use crate::pb::{HealthCheckRequest, HealthCheckResponse};
use crate::protocol::{CHECK_PATH, JSON_CONTENT_TYPE, JSON_STREAM_CONTENT_TYPE, WATCH_PATH};
use crate::service::ServiceContext;

/// Serves the health service to JSON callers.
#[derive(Debug, Clone)]
pub struct JsonTranslator {
    client: LocalHealthClient,
    max_request_bytes: usize,
}

impl JsonTranslator {
    pub fn new(context: &ServiceContext) -> Self {
        Self {
            client: context.local_client(),
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
        }
    }

    /// Largest request body read before answering "Failed to read request body".
    pub fn max_request_bytes(mut self, bytes: usize) -> Self {
        self.max_request_bytes = bytes;
        self
    }

    /// `POST` routes for `Check` and `Watch`. Other paths get axum's 404.
    pub fn into_router(self) -> Router {
        Router::new()
            .route(CHECK_PATH, post(check))
            .route(WATCH_PATH, post(watch))
            .with_state(self)
    }

    async fn read_request(&self, body: Body) -> Result<HealthCheckRequest, HttpFailure> {
        let bytes = axum::body::to_bytes(body, self.max_request_bytes)
            .await
            .map_err(|err| {
                tracing::debug!(error = %err, "failed to read request body");
                HttpFailure::unreadable_body()
            })?;
        decode(&bytes)
    }
}

async fn check(
    State(translator): State<JsonTranslator>,
    body: Body,
) -> Result<Response, HttpFailure> {
    let request = translator.read_request(body).await?;
    let response = translator.client.check(request).await?;
    let json = encode(&response)?;
    Ok(([(CONTENT_TYPE, JSON_CONTENT_TYPE)], json).into_response())
}

async fn watch(
    State(translator): State<JsonTranslator>,
    body: Body,
) -> Result<Response, HttpFailure> {
    let request = translator.read_request(body).await?;
    let mut updates = translator.client.watch(request, &CancellationToken::new());

    // Headers are not sent until the first update, so a call that fails
    // straight away still gets a real status code.
    let first = match updates.pull().await? {
        Some(update) => Some(encode_line(&update)?),
        None => None,
    };

    let body = Body::from_stream(json_lines(first, updates));
    Ok(([(CONTENT_TYPE, JSON_STREAM_CONTENT_TYPE)], body).into_response())
}

/// Body of a `Watch` response. Dropping it (the caller went away) drops the
/// handle, which cancels the call.
fn json_lines(
    first: Option<Bytes>,
    mut updates: StreamHandle<HealthCheckResponse>,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    async_stream::stream! {
        if let Some(first) = first {
            yield Ok::<_, Infallible>(first);
            let mut written = 1usize;
            loop {
                match updates.pull().await {
                    Ok(Some(update)) => match encode_line(&update) {
                        Ok(line) => {
                            written += 1;
                            yield Ok(line);
                        }
                        Err(_) => {
                            tracing::warn!(
                                lines = written,
                                "failed to encode watch update, truncating stream"
                            );
                            break;
                        }
                    },
                    Ok(None) => break,
                    Err(status) => {
                        tracing::warn!(
                            lines = written,
                            code = %status.code(),
                            message = status.message(),
                            "watch failed after the response started, truncating stream"
                        );
                        break;
                    }
                }
            }
            tracing::debug!(lines = written, "watch stream finished");
        }
    }
}

/// Decode a JSON request body.
///
/// A field set to `null` reads as its default value, as proto3 JSON requires.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, HttpFailure> {
    let mut value: serde_json::Value = serde_json::from_slice(bytes).map_err(invalid_request)?;
    if let serde_json::Value::Object(fields) = &mut value {
        fields.retain(|_, field| !field.is_null());
    }
    serde_json::from_value(value).map_err(invalid_request)
}

fn invalid_request(err: serde_json::Error) -> HttpFailure {
    tracing::debug!(error = %err, "invalid JSON request");
    HttpFailure::invalid_request()
}

/// Encode a message as JSON, default-valued fields included.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, HttpFailure> {
    serde_json::to_vec(message).map_err(|err| {
        tracing::error!(error = %err, "failed to encode JSON response");
        HttpFailure::marshal()
    })
}

fn encode_line<T: Serialize>(message: &T) -> Result<Bytes, HttpFailure> {
    let mut line = encode(message)?;
    line.push(b'\n');
    Ok(Bytes::from(line))
}
