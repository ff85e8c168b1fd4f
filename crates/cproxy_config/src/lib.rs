//! Configuration model for the caching proxy.
//!
//! `cproxy.toml` is split in three sections:
//! - `[global]`: process-wide knobs (log level)
//! - `[cache]`: where and for how long responses are kept
//! - `[proxy]`: listener port and origin-side limits

mod cache;
mod cproxy;
mod error;
mod global;
mod proxy;
mod validation;

pub use cache::CacheConfig;
pub use cproxy::{CproxyConfig, CONFIG_ENV_PREFIX, DEFAULT_CONFIG_FILE};
pub use error::ConfigError;
pub use global::GlobalConfig;
pub use proxy::ProxyConfig;
pub use validation::ConfigReport;
