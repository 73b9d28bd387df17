//! Single-port protocol dispatch.
//!
//! [`ProtocolRouter`] is the outermost service. It rejects anything but `POST`,
//! classifies the request into a [`ContentKind`], records the kind in the
//! request extensions, and forwards the untouched request to one of three
//! delegates:
//!
//! - native gRPC to the tonic routes,
//! - gRPC-Web to the same routes behind `tonic_web::GrpcWebLayer`,
//! - JSON to the axum translator router.
//!
//! Unsupported content types get 415 and reach no delegate.

use std::convert::Infallible;
use std::task::{Context, Poll};

use axum::body::Body as AxumBody;
use axum::response::{IntoResponse, Response as AxumResponse};
use bytes::Bytes;
use futures::future::{self, BoxFuture};
use http::{Method, Request, Response};
use http_body::Body as HttpBody;
use tower::ServiceExt;
use tracing::Instrument;

use crate::error::HttpFailure;
use crate::protocol::ContentKind;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Dispatches each request to the delegate serving its protocol.
#[derive(Clone, Debug)]
pub struct ProtocolRouter<G, W, J> {
    grpc: G,
    grpc_web: W,
    json: J,
}

impl<G, W, J> ProtocolRouter<G, W, J> {
    pub fn new(grpc: G, grpc_web: W, json: J) -> Self {
        Self {
            grpc,
            grpc_web,
            json,
        }
    }
}

impl<G, GB, W, WB, J, JB> tower::Service<Request<AxumBody>> for ProtocolRouter<G, W, J>
where
    // Tonic routes
    G: tower::Service<Request<AxumBody>, Response = Response<GB>, Error = Infallible>
        + Clone
        + Send
        + 'static,
    G::Future: Send + 'static,
    GB: HttpBody<Data = Bytes> + Send + 'static,
    GB::Error: Into<BoxError>,
    // Tonic routes behind the gRPC-Web layer
    W: tower::Service<Request<AxumBody>, Response = Response<WB>, Error = Infallible>
        + Clone
        + Send
        + 'static,
    W::Future: Send + 'static,
    WB: HttpBody<Data = Bytes> + Send + 'static,
    WB::Error: Into<BoxError>,
    // JSON router
    J: tower::Service<Request<AxumBody>, Response = Response<JB>, Error = Infallible>
        + Clone
        + Send
        + 'static,
    J::Future: Send + 'static,
    JB: HttpBody<Data = Bytes> + Send + 'static,
    JB::Error: Into<BoxError>,
{
    type Response = AxumResponse;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Delegates are cloned per request and driven with `oneshot`.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut req: Request<AxumBody>) -> Self::Future {
        if req.method() != Method::POST {
            tracing::debug!(method = %req.method(), path = req.uri().path(), "rejected method");
            return reject(HttpFailure::method_not_allowed());
        }

        let kind = ContentKind::classify(req.headers(), req.uri().path());
        req.extensions_mut().insert(kind);
        let span = tracing::debug_span!("dispatch", protocol = %kind, path = req.uri().path());

        match kind {
            ContentKind::NativeBinary => {
                Box::pin(forward(self.grpc.clone(), req).instrument(span))
            }
            ContentKind::WebCompatible => {
                Box::pin(forward(self.grpc_web.clone(), req).instrument(span))
            }
            ContentKind::JsonUnary | ContentKind::JsonStream => {
                Box::pin(forward(self.json.clone(), req).instrument(span))
            }
            ContentKind::Unsupported => {
                span.in_scope(|| tracing::debug!("rejected content type"));
                reject(HttpFailure::unsupported_media_type())
            }
        }
    }
}

fn reject(failure: HttpFailure) -> BoxFuture<'static, Result<AxumResponse, Infallible>> {
    Box::pin(future::ready(Ok(failure.into_response())))
}

async fn forward<S, B>(service: S, req: Request<AxumBody>) -> Result<AxumResponse, Infallible>
where
    S: tower::Service<Request<AxumBody>, Response = Response<B>, Error = Infallible>,
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    tracing::debug!("dispatching");
    let response = match service.oneshot(req).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    let (parts, body) = response.into_parts();
    // `AxumBody::new` keeps trailers, which carry the gRPC status.
    Ok(Response::from_parts(parts, AxumBody::new(body)))
}
