use std::{net::SocketAddr, sync::Arc};

use cproxy_cache::CacheStore;
use cproxy_config::CproxyConfig;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::task::TaskTracker;
use tracing::{error, info, instrument, warn};

use crate::{
    metrics::{CacheMetrics, MetricsSnapshot},
    origin::OriginClient,
    pipeline::Pipeline,
    ProxyError,
};

mod accept;

/// Reported by [`ProxyServer::url`] whenever nothing is listening.
pub const NOT_RUNNING_URL: &str = "http://proxy-not-running";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Listening,
    Stopping,
}

/// Everything that only exists while the listener is up.
struct Running {
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
    connections: TaskTracker,
}

/// One proxy instance: a cache root, a port, and at most one live listener.
pub struct ProxyServer {
    cfg: CproxyConfig,
    cache: CacheStore,
    metrics: Arc<CacheMetrics>,
    state: ServerState,
    running: Option<Running>,
}

impl ProxyServer {
    /// Fails with [`ProxyError::Config`] when no cache path is configured.
    pub fn new(cfg: CproxyConfig) -> Result<Self, ProxyError> {
        let cache = CacheStore::new(cfg.cache_path()?, cfg.cache().ttl());

        Ok(Self {
            cfg,
            cache,
            metrics: Arc::new(CacheMetrics::default()),
            state: ServerState::Stopped,
            running: None,
        })
    }

    /// `http://127.0.0.1:<port>` while listening, [`NOT_RUNNING_URL`] otherwise.
    pub fn url(&self) -> String {
        match &self.running {
            Some(running) => format!("http://{}", running.addr),
            None => NOT_RUNNING_URL.to_string(),
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.addr)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn config(&self) -> &CproxyConfig {
        &self.cfg
    }

    /// Binds `127.0.0.1:<port>` and starts accepting connections.
    ///
    /// On failure the instance stays [`ServerState::Stopped`] and can be
    /// started again.
    #[instrument(skip(self), fields(port = self.cfg.proxy().port()))]
    pub async fn start(&mut self) -> Result<(), ProxyError> {
        if self.running.is_some() {
            return Err(ProxyError::AlreadyRunning(self.url()));
        }

        self.state = ServerState::Starting;
        match self.spawn_listener().await {
            Ok(running) => {
                info!(
                    target: "cproxy::server",
                    listen = %running.addr,
                    cache_root = %self.cache.root().display(),
                    "Proxy listening"
                );
                self.running = Some(running);
                self.state = ServerState::Listening;
                Ok(())
            }
            Err(e) => {
                self.state = ServerState::Stopped;
                Err(e)
            }
        }
    }

    async fn spawn_listener(&self) -> Result<Running, ProxyError> {
        let origin = OriginClient::new(self.cfg.proxy())?;
        let pipeline = Arc::new(Pipeline::new(
            self.cache.clone(),
            origin,
            self.metrics.clone(),
        ));

        let requested = SocketAddr::from(([127, 0, 0, 1], self.cfg.proxy().port()));
        let listener = accept::bind_listener(requested).await?;
        let addr = listener
            .local_addr()
            .map_err(|source| ProxyError::Bind {
                addr: requested,
                source,
            })?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let connections = TaskTracker::new();
        let accept_task = tokio::spawn(accept::accept_loop(
            listener,
            addr,
            pipeline,
            self.metrics.clone(),
            connections.clone(),
            shutdown_rx,
        ));

        Ok(Running {
            addr,
            shutdown,
            accept_task,
            connections,
        })
    }

    /// Stops listening and drains open connections. No-op when stopped.
    ///
    /// Returns once the listening socket has been released.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        self.state = ServerState::Stopping;

        info!(target: "cproxy::server", listen = %running.addr, "Stopping proxy");

        // Receivers only go away once every task has exited.
        let _ = running.shutdown.send(true);

        if let Err(e) = running.accept_task.await {
            error!(
                target: "cproxy::server",
                error = ?e,
                "Accept loop terminated abnormally"
            );
        }

        running.connections.close();
        let drain = self.cfg.proxy().drain_timeout();
        if tokio::time::timeout(drain, running.connections.wait())
            .await
            .is_err()
        {
            warn!(
                target: "cproxy::server",
                remaining = running.connections.len(),
                drain_timeout_ms = drain.as_millis() as u64,
                "Connections still open after drain timeout"
            );
        }

        let snap = self.metrics.snapshot();
        info!(
            target: "cproxy::server",
            hits = snap.hits,
            misses = snap.misses,
            cache_read_errors = snap.cache_read_errors,
            failures = snap.failures,
            tunnels_rejected = snap.tunnels_rejected,
            bytes_replayed = snap.bytes_replayed,
            hit_rate = snap.hit_rate(),
            "Proxy stopped"
        );

        self.state = ServerState::Stopped;
    }
}

impl Drop for ProxyServer {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            let _ = running.shutdown.send(true);
        }
    }
}
