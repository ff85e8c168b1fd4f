use std::net::SocketAddr;

use cproxy_cache::CacheError;
use cproxy_config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("proxy is already listening at {0}")]
    AlreadyRunning(String),

    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot build origin client: {0}")]
    Client(#[source] reqwest::Error),

    /// Origin-form or authority-form target; there is nowhere to forward it.
    #[error("request target {0:?} is not an absolute http(s) URL")]
    InvalidTarget(String),

    #[error("origin request to {url} failed: {source}")]
    OriginUnreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("origin response from {url} exceeds {limit} bytes")]
    ResponseTooLarge { url: String, limit: u64 },

    #[error("cannot store response: {0}")]
    CacheWrite(#[source] CacheError),

    #[error("request handler panicked: {0}")]
    HandlerPanic(String),
}
