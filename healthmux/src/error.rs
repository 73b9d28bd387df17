//! HTTP-facing failures.
//!
//! Everything the JSON path and the protocol router reject is answered with a
//! plain-text body and an HTTP status. Service failures take their status from
//! [`Code::http_status`](healthmux_core::Code::http_status).

use axum::response::{IntoResponse, Response};
use healthmux_core::Status;
use http::StatusCode;
use http::header::{CONTENT_TYPE, HeaderValue, X_CONTENT_TYPE_OPTIONS};

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// A request that ends in a plain-text error response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpFailure {
    status: StatusCode,
    message: String,
}

impl HttpFailure {
    pub fn new<S: Into<String>>(status: StatusCode, message: S) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn method_not_allowed() -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    }

    pub fn unsupported_media_type() -> Self {
        Self::new(StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported content-type")
    }

    pub fn unreadable_body() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Failed to read request body")
    }

    pub fn invalid_request() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Invalid request")
    }

    pub fn marshal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to marshal response")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<Status> for HttpFailure {
    fn from(status: Status) -> Self {
        let message = if status.message().is_empty() {
            status.code().as_str().to_owned()
        } else {
            status.message().to_owned()
        };
        Self::new(status.http_status(), message)
    }
}

impl IntoResponse for HttpFailure {
    fn into_response(self) -> Response {
        let mut response = (self.status, format!("{}\n", self.message)).into_response();
        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
        headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
        response
    }
}
