//! Integration tests for the metrics HTTP endpoint.
//!
//! Verifies that the minimal server returns the registry rendering on
//! `GET /metrics`, rejects everything else with the right status codes,
//! and shuts down when signaled.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::timeout;

use qdb_telemetry::metrics_http::spawn_metrics_http_server_with_addr;
use qdb_telemetry::ReplicaMetrics;

// ============================================================================
// Test helpers
// ============================================================================

async fn send_request(addr: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream
        .write_all(request.as_bytes())
        .await
        .expect("write request");
    stream.flush().await.expect("flush");

    let mut response = Vec::new();
    timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .expect("response arrived")
        .expect("read");
    String::from_utf8_lossy(&response).to_string()
}

async fn start_server(metrics: Arc<ReplicaMetrics>) -> (watch::Sender<()>, SocketAddr) {
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let bind: SocketAddr = "127.0.0.1:0".parse().expect("addr");
    let (_handle, addr) = spawn_metrics_http_server_with_addr(metrics, bind, shutdown_rx).await;
    (shutdown_tx, addr.expect("server bound"))
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn get_metrics_returns_registry_rendering() {
    let metrics = Arc::new(ReplicaMetrics::new());
    metrics.phase().inc_prepare();
    metrics.phase().inc_prepare();
    metrics.intake().inc_client_request();
    metrics.gauges().set_txn_throughput(123);

    let (_shutdown_tx, addr) = start_server(metrics).await;

    let response = send_request(addr, "GET /metrics HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains("qdb_prepare_total 2"));
    assert!(response.contains("qdb_client_request_total 1"));
    assert!(response.contains("qdb_txn_throughput 123"));
    assert!(response.contains("qdb_seq_gap_sum 0"));
}

#[tokio::test]
async fn trailing_slash_is_accepted() {
    let metrics = Arc::new(ReplicaMetrics::new());
    let (_shutdown_tx, addr) = start_server(metrics).await;

    let response = send_request(addr, "GET /metrics/ HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 200 OK"));
}

#[tokio::test]
async fn unknown_path_returns_404() {
    let metrics = Arc::new(ReplicaMetrics::new());
    let (_shutdown_tx, addr) = start_server(metrics).await;

    let response = send_request(addr, "GET /health HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 404 Not Found"));
}

#[tokio::test]
async fn non_get_method_returns_405() {
    let metrics = Arc::new(ReplicaMetrics::new());
    let (_shutdown_tx, addr) = start_server(metrics).await;

    let response = send_request(addr, "POST /metrics HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 405 Method Not Allowed"));
}

#[tokio::test]
async fn server_exits_on_shutdown_signal() {
    let metrics = Arc::new(ReplicaMetrics::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let bind: SocketAddr = "127.0.0.1:0".parse().expect("addr");
    let (handle, addr) = spawn_metrics_http_server_with_addr(metrics, bind, shutdown_rx).await;
    let addr = addr.expect("server bound");

    // Server answers before shutdown.
    let response = send_request(addr, "GET /metrics HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 200 OK"));

    shutdown_tx.send(()).expect("signal");
    timeout(Duration::from_secs(5), handle)
        .await
        .expect("server exited")
        .expect("task joined");

    // New connections are refused once the listener is gone.
    let connect = TcpStream::connect(addr).await;
    assert!(connect.is_err(), "listener still accepting after shutdown");
}
