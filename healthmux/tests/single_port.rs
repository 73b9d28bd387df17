//! Every protocol against one real listener.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use healthmux::pb::health_client::HealthClient;
use healthmux::pb::{HealthCheckRequest, ServingStatus};
use healthmux::{HealthMuxBuilder, ServerConfig};
use http::Request;
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
}

impl TestServer {
    async fn start(updates: usize) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let config = ServerConfig::new()
            .watch_updates(updates)
            .watch_interval(Duration::from_millis(10));
        let app = HealthMuxBuilder::from_config(&config).build();

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone().cancelled_owned();
        tokio::spawn(async move {
            if let Err(e) = healthmux::serve(listener, app, signal).await {
                eprintln!("server error: {e}");
            }
        });
        Self { addr, shutdown }
    }

    async fn grpc(&self) -> HealthClient<tonic::transport::Channel> {
        HealthClient::connect(format!("http://{}", self.addr))
            .await
            .unwrap()
    }

    async fn post_json(&self, path: &str, body: &'static str) -> (u16, String, String) {
        let stream = TcpStream::connect(self.addr).await.unwrap();
        let (mut sender, conn) = http1::handshake(TokioIo::new(stream)).await.unwrap();
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                eprintln!("connection error: {e}");
            }
        });

        let req = Request::builder()
            .method("POST")
            .uri(path)
            .header("Host", "localhost")
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .unwrap();
        let resp = sender.send_request(req).await.unwrap();
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get("content-type")
            .map(|v| v.to_str().unwrap().to_owned())
            .unwrap_or_default();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[tokio::test]
async fn grpc_check() {
    let server = TestServer::start(3).await;
    let response = server
        .grpc()
        .await
        .check(HealthCheckRequest::default())
        .await
        .unwrap()
        .into_inner();
    assert_eq!(response.status(), ServingStatus::Serving);
}

#[tokio::test]
async fn grpc_watch_ends_after_the_configured_updates() {
    let server = TestServer::start(3).await;
    let mut stream = server
        .grpc()
        .await
        .watch(HealthCheckRequest::default())
        .await
        .unwrap()
        .into_inner();

    let mut received = 0;
    while let Some(update) = stream.message().await.unwrap() {
        assert_eq!(update.status(), ServingStatus::Serving);
        received += 1;
    }
    assert_eq!(received, 3);
}

#[tokio::test]
async fn grpc_watch_dropped_early_leaves_the_server_usable() {
    let server = TestServer::start(1_000).await;
    let mut client = server.grpc().await;

    let mut stream = client
        .watch(HealthCheckRequest::default())
        .await
        .unwrap()
        .into_inner();
    assert!(stream.message().await.unwrap().is_some());
    drop(stream);

    let response = client
        .check(HealthCheckRequest::default())
        .await
        .unwrap()
        .into_inner();
    assert_eq!(response.status(), ServingStatus::Serving);
}

#[tokio::test]
async fn json_check_on_the_same_port() {
    let server = TestServer::start(3).await;
    let (status, content_type, body) = server
        .post_json("/grpc.health.v1.Health/Check", "{}")
        .await;
    assert_eq!(status, 200);
    assert_eq!(content_type, "application/json");
    assert_eq!(body, r#"{"status":"SERVING"}"#);
}

#[tokio::test]
async fn json_watch_on_the_same_port() {
    let server = TestServer::start(3).await;
    let (status, content_type, body) = server
        .post_json("/grpc.health.v1.Health/Watch", "{}")
        .await;
    assert_eq!(status, 200);
    assert_eq!(content_type, "application/json+stream");
    assert_eq!(body, "{\"status\":\"SERVING\"}\n".repeat(3));
}

#[tokio::test]
async fn malformed_json_is_rejected() {
    let server = TestServer::start(3).await;
    let (status, _, body) = server
        .post_json("/grpc.health.v1.Health/Check", "{")
        .await;
    assert_eq!(status, 400);
    assert_eq!(body, "Invalid request\n");
}
