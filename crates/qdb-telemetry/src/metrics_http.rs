//! Minimal HTTP endpoint exposing the counter registry for scraping.
//!
//! A deliberately small HTTP/1.1 server over tokio (no HTTP crates): it
//! answers `GET /metrics` with the Prometheus-style text rendering of
//! `ReplicaMetrics` (including the sampler gauges) and nothing else. The
//! scrape collector owns polling cadence and storage; this side only keeps
//! the counters current.
//!
//! # Design
//!
//! - Listens on the configured TCP address
//! - Parses only the request line; headers are skipped
//! - 200 for `GET /metrics`, 404 for other paths, 405 for other methods,
//!   400 for malformed request lines
//! - Each connection is served by a short-lived task
//! - Shuts down when the `watch` channel fires

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::metrics::ReplicaMetrics;

/// Errors from the metrics HTTP server.
#[derive(Debug, thiserror::Error)]
pub enum MetricsHttpError {
    /// Failed to bind the listening socket.
    #[error("bind metrics endpoint {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    /// I/O error while serving a request.
    #[error("serve metrics request: {0}")]
    Io(#[from] std::io::Error),
}

/// Spawn the metrics HTTP server.
///
/// The task exits when `shutdown` fires. Bind failures are logged and end
/// the task; the rest of the telemetry subsystem keeps running.
pub fn spawn_metrics_http_server(
    metrics: Arc<ReplicaMetrics>,
    bind_addr: SocketAddr,
    shutdown: watch::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match TcpListener::bind(bind_addr).await {
            Ok(listener) => serve(metrics, listener, shutdown).await,
            Err(source) => {
                let e = MetricsHttpError::Bind {
                    addr: bind_addr,
                    source,
                };
                warn!(error = %e, "metrics endpoint disabled");
            }
        }
    })
}

/// Spawn the metrics HTTP server and return the bound address.
///
/// Binding to port 0 and reading the returned address is the test path;
/// `None` means the bind failed.
pub async fn spawn_metrics_http_server_with_addr(
    metrics: Arc<ReplicaMetrics>,
    bind_addr: SocketAddr,
    shutdown: watch::Receiver<()>,
) -> (JoinHandle<()>, Option<SocketAddr>) {
    let listener = match TcpListener::bind(bind_addr).await {
        Ok(listener) => listener,
        Err(source) => {
            let e = MetricsHttpError::Bind {
                addr: bind_addr,
                source,
            };
            warn!(error = %e, "metrics endpoint disabled");
            return (tokio::spawn(async {}), None);
        }
    };
    let local_addr = listener.local_addr().ok();

    let handle = tokio::spawn(serve(metrics, listener, shutdown));
    (handle, local_addr)
}

async fn serve(
    metrics: Arc<ReplicaMetrics>,
    listener: TcpListener,
    mut shutdown: watch::Receiver<()>,
) {
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "metrics endpoint listening");
    }

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let metrics = metrics.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, &metrics).await {
                                debug!(peer = %peer, error = %e, "metrics request failed");
                            }
                        });
                    }
                    Err(e) => {
                        // Transient accept errors are common; keep serving.
                        warn!(error = %e, "metrics endpoint accept failed");
                    }
                }
            }
            _ = shutdown.changed() => {
                debug!("metrics endpoint shutting down");
                break;
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    metrics: &ReplicaMetrics,
) -> Result<(), MetricsHttpError> {
    let mut reader = BufReader::new(&mut stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    // Skip headers until the blank line; nothing in them matters here.
    let mut header_line = String::new();
    loop {
        header_line.clear();
        let n = reader.read_line(&mut header_line).await?;
        if n == 0 || header_line == "\r\n" || header_line == "\n" {
            break;
        }
    }

    let mut parts = request_line.split_whitespace();
    let (method, path) = match (parts.next(), parts.next()) {
        (Some(method), Some(path)) => (method, path),
        _ => {
            return send_response(&mut stream, 400, "Bad Request", "text/plain", b"Bad Request")
                .await;
        }
    };

    if method != "GET" {
        return send_response(
            &mut stream,
            405,
            "Method Not Allowed",
            "text/plain",
            b"Method Not Allowed",
        )
        .await;
    }

    if path == "/metrics" || path == "/metrics/" {
        let body = metrics.format_metrics();
        send_response(
            &mut stream,
            200,
            "OK",
            "text/plain; version=0.0.4; charset=utf-8",
            body.as_bytes(),
        )
        .await
    } else {
        send_response(&mut stream, 404, "Not Found", "text/plain", b"Not Found").await
    }
}

async fn send_response(
    stream: &mut TcpStream,
    status_code: u16,
    status_text: &str,
    content_type: &str,
    body: &[u8],
) -> Result<(), MetricsHttpError> {
    let header = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status_code,
        status_text,
        content_type,
        body.len()
    );
    stream.write_all(header.as_bytes()).await?;
    stream.write_all(body).await?;
    stream.flush().await?;
    Ok(())
}
