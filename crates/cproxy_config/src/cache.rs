use std::{path::PathBuf, time::Duration};

use serde::Deserialize;

/// One day, in milliseconds.
pub const DEFAULT_TTL_MS: u64 = 24 * 60 * 60 * 1000;

// =======================================================
// CACHE CONFIG + DEFAULTS
// =======================================================
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory where cached responses are kept. Required.
    pub path: Option<PathBuf>,
    /// Maximum age of an entry before it is treated as a miss.
    /// `0` disables expiry.
    pub ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: None,
            ttl_ms: DEFAULT_TTL_MS,
        }
    }
}

impl CacheConfig {
    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    /// TTL as a `Duration`; `None` when expiry is disabled.
    pub fn ttl(&self) -> Option<Duration> {
        if self.ttl_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.ttl_ms))
        }
    }

    pub(crate) fn normalize(&mut self) {
        if self
            .path
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            self.path = None;
        }
    }
}
