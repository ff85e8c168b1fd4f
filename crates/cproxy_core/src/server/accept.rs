use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::{net::TcpListener, sync::watch};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn};

use crate::{metrics::CacheMetrics, pipeline::Pipeline, worker::handle_connection, ProxyError};

/// Pause after a failed accept(), e.g. when the process is out of descriptors.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

pub(super) async fn bind_listener(addr: SocketAddr) -> Result<TcpListener, ProxyError> {
    info!(target: "cproxy::server", listen = %addr, "Binding listener");

    match TcpListener::bind(addr).await {
        Ok(listener) => {
            info!(target: "cproxy::server", listen = %addr, "Bind() successful");
            Ok(listener)
        }
        Err(e) => {
            error!(
                target: "cproxy::server",
                listen = %addr,
                error = ?e,
                "Failed to bind listener"
            );
            Err(ProxyError::Bind { addr, source: e })
        }
    }
}

/// Accepts until `shutdown` fires, then drops (and so releases) the listener.
#[instrument(
    skip(listener, pipeline, metrics, connections, shutdown),
    fields(listen = %listen_addr)
)]
pub(super) async fn accept_loop(
    listener: TcpListener,
    listen_addr: SocketAddr,
    pipeline: Arc<Pipeline>,
    metrics: Arc<CacheMetrics>,
    connections: TaskTracker,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(target: "cproxy::server", "Accept loop started");

    loop {
        let accepted = tokio::select! {
            res = listener.accept() => res,
            _ = shutdown.changed() => break,
        };

        let (stream, client_addr) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                warn!(
                    target: "cproxy::server",
                    error = ?e,
                    "Failed to accept connection"
                );
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                continue;
            }
        };

        debug!(
            target: "cproxy::server",
            client_addr = %client_addr,
            open_connections = connections.len(),
            "Connection accepted"
        );

        connections.spawn(handle_connection(
            stream,
            client_addr,
            pipeline.clone(),
            metrics.clone(),
            shutdown.clone(),
        ));
    }

    drop(listener);
    info!(target: "cproxy::server", "Accept loop stopped; listener released");
}
