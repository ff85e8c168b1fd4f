//! Per-connection handler.
//!
//! Peeks at the first bytes of the connection: a CONNECT gets the literal 501
//! on the raw socket, everything else is served as HTTP/1.1 by hyper with the
//! request pipeline as the service.

use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use cproxy_http::tunnel::{could_be_tunnel_request, is_tunnel_request, reject_tunnel, request_line};
use hyper::{body::Incoming, server::conn::http1, service::service_fn, Request};
use hyper_util::rt::TokioIo;
use tokio::{io::AsyncReadExt, net::TcpStream, sync::watch};
use tracing::{debug, info, instrument, warn};

use crate::{metrics::CacheMetrics, pipeline::Pipeline};

const PEEK_BUF_LEN: usize = 1024;
const PEEK_RETRIES: usize = 20;
const PEEK_RETRY_DELAY: Duration = Duration::from_millis(5);
const TUNNEL_LINGER: Duration = Duration::from_millis(250);

enum Sniffed {
    /// `(method, target)` when the request line was already complete.
    Tunnel(Option<(String, String)>),
    Http,
    Closed,
}

#[instrument(
    skip(stream, pipeline, metrics, shutdown),
    fields(client = %client_addr)
)]
pub(crate) async fn handle_connection(
    mut stream: TcpStream,
    client_addr: SocketAddr,
    pipeline: Arc<Pipeline>,
    metrics: Arc<CacheMetrics>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(target: "cproxy::worker", "Handling new client connection");

    let sniffed = tokio::select! {
        res = sniff(&stream) => res,
        _ = shutdown.changed() => {
            debug!(target: "cproxy::worker", "Shutdown before first request; closing");
            return;
        }
    };

    match sniffed {
        Ok(Sniffed::Closed) => {
            debug!(target: "cproxy::worker", "Client closed without sending data");
        }
        Err(e) => {
            warn!(
                target: "cproxy::worker",
                error = ?e,
                "Error peeking into client stream"
            );
        }
        Ok(Sniffed::Tunnel(line)) => {
            metrics.record_tunnel_rejected();
            let (method, target) = line.unwrap_or_else(|| ("CONNECT".to_string(), String::new()));
            info!(
                target: "cproxy::worker",
                %method,
                %target,
                "Rejecting tunnel request"
            );

            if let Err(e) = reject(&mut stream).await {
                debug!(
                    target: "cproxy::worker",
                    error = ?e,
                    "Client went away during tunnel rejection"
                );
            }
        }
        Ok(Sniffed::Http) => serve_http(stream, pipeline, shutdown).await,
    }
}

/// Waits for the first bytes without consuming them.
async fn sniff(stream: &TcpStream) -> io::Result<Sniffed> {
    let mut buf = [0u8; PEEK_BUF_LEN];

    for _ in 0..PEEK_RETRIES {
        let n = stream.peek(&mut buf).await?;
        let peeked = &buf[..n];

        if n == 0 {
            return Ok(Sniffed::Closed);
        }
        if is_tunnel_request(peeked) {
            return Ok(Sniffed::Tunnel(request_line(peeked)));
        }
        if !could_be_tunnel_request(peeked) {
            return Ok(Sniffed::Http);
        }

        // Only a prefix of "CONNECT " so far; peek returns immediately while
        // data is buffered, so wait for more to arrive.
        tokio::time::sleep(PEEK_RETRY_DELAY).await;
    }

    // Still undecided: hyper answers a late CONNECT with a 501 as well.
    Ok(Sniffed::Http)
}

async fn reject(stream: &mut TcpStream) -> io::Result<()> {
    reject_tunnel(stream).await?;

    // Unread input at close time turns the FIN into a RST, which can discard
    // the 501 before the client reads it.
    let mut sink = [0u8; PEEK_BUF_LEN];
    let _ = tokio::time::timeout(TUNNEL_LINGER, async {
        while let Ok(n) = stream.read(&mut sink).await {
            if n == 0 {
                break;
            }
        }
    })
    .await;

    Ok(())
}

async fn serve_http(
    stream: TcpStream,
    pipeline: Arc<Pipeline>,
    mut shutdown: watch::Receiver<bool>,
) {
    let io = TokioIo::new(stream);
    let service = service_fn(move |req: Request<Incoming>| pipeline.clone().handle(req));

    let conn = http1::Builder::new().serve_connection(io, service);
    tokio::pin!(conn);

    let res = tokio::select! {
        res = conn.as_mut() => res,
        _ = shutdown.changed() => {
            debug!(target: "cproxy::worker", "Shutting connection down gracefully");
            conn.as_mut().graceful_shutdown();
            conn.as_mut().await
        }
    };

    match res {
        Ok(()) => debug!(target: "cproxy::worker", "Connection closed"),
        Err(e) if e.is_incomplete_message() => {
            debug!(
                target: "cproxy::worker",
                error = %e,
                "Client closed mid-request"
            );
        }
        Err(e) => {
            warn!(
                target: "cproxy::worker",
                error = %e,
                "Error serving connection"
            );
        }
    }
}
