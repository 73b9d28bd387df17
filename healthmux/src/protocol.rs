//! Wire protocol detection.
//!
//! Every inbound request is classified once into a [`ContentKind`] from its
//! `Content-Type` header and path. The router stores the result in the request
//! extensions and dispatches on it.

use http::HeaderMap;
use http::header::CONTENT_TYPE;

pub const GRPC_CONTENT_TYPE: &str = "application/grpc";
pub const GRPC_WEB_CONTENT_TYPE: &str = "application/grpc-web";
pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const JSON_STREAM_CONTENT_TYPE: &str = "application/json+stream";

/// Path of the unary `Check` method.
pub const CHECK_PATH: &str = "/grpc.health.v1.Health/Check";
/// Path of the server-streaming `Watch` method.
pub const WATCH_PATH: &str = "/grpc.health.v1.Health/Watch";

/// Protocol variant detected from the incoming request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// gRPC over HTTP/2 (`application/grpc`), handed to tonic untouched.
    NativeBinary,
    /// gRPC-Web (`application/grpc-web`, `+proto` and `-text` variants).
    WebCompatible,
    /// JSON request answered with a single JSON object.
    JsonUnary,
    /// JSON request answered with newline-delimited JSON objects.
    JsonStream,
    /// Nothing matched; rejected with 415.
    Unsupported,
}

struct Rule {
    matches: fn(Option<&str>) -> bool,
    kind: fn(&str) -> ContentKind,
}

/// Checked in order, first match wins. Exact matches come before the
/// gRPC-Web prefix so `application/grpc` is never taken for gRPC-Web.
const RULES: [Rule; 3] = [
    Rule {
        matches: is_grpc,
        kind: native,
    },
    Rule {
        matches: is_json,
        kind: json,
    },
    Rule {
        matches: is_grpc_web,
        kind: web,
    },
];

fn is_grpc(content_type: Option<&str>) -> bool {
    content_type == Some(GRPC_CONTENT_TYPE)
}

fn is_json(content_type: Option<&str>) -> bool {
    content_type == Some(JSON_CONTENT_TYPE)
}

fn is_grpc_web(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ct.starts_with(GRPC_WEB_CONTENT_TYPE))
}

fn native(_path: &str) -> ContentKind {
    ContentKind::NativeBinary
}

fn web(_path: &str) -> ContentKind {
    ContentKind::WebCompatible
}

fn json(path: &str) -> ContentKind {
    if path == WATCH_PATH {
        ContentKind::JsonStream
    } else {
        ContentKind::JsonUnary
    }
}

impl ContentKind {
    /// Classify a request from its headers and path.
    pub fn classify(headers: &HeaderMap, path: &str) -> Self {
        let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
        RULES
            .iter()
            .find(|rule| (rule.matches)(content_type))
            .map_or(Self::Unsupported, |rule| (rule.kind)(path))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NativeBinary => "grpc",
            Self::WebCompatible => "grpc-web",
            Self::JsonUnary => "json",
            Self::JsonStream => "json-stream",
            Self::Unsupported => "unsupported",
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
