//! Caching HTTP forward proxy.
//!
//! [`ProxyServer`] listens on `127.0.0.1`, answers every request except
//! CONNECT from the on-disk cache when it can, and otherwise forwards the
//! request to the origin named in the absolute request URL, stores the full
//! response, and replays it to the client.

mod error;
mod metrics;
mod origin;
mod pipeline;
mod server;
mod worker;

pub use error::ProxyError;
pub use metrics::{CacheMetrics, MetricsSnapshot};
pub use pipeline::{cache_key, CachedResponse, ResponseMeta};
pub use server::{ProxyServer, ServerState, NOT_RUNNING_URL};
