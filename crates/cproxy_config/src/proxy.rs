use std::time::Duration;

use serde::Deserialize;

// =======================================================
// PROXY CONFIG + DEFAULTS
// =======================================================
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// TCP port on 127.0.0.1. `0` lets the OS pick one.
    pub port: u16,

    // Timeouts (milliseconds)
    pub request_timeout_ms: Option<u64>,
    pub drain_timeout_ms: u64,

    // Limits (bytes)
    pub max_response_body_bytes: Option<u64>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: 0,
            request_timeout_ms: None,
            drain_timeout_ms: 5_000,
            max_response_body_bytes: None,
        }
    }
}

impl ProxyConfig {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn max_response_body_bytes(&self) -> Option<u64> {
        self.max_response_body_bytes
    }

    pub(crate) fn apply_defaults_from(&mut self, defaults: &ProxyConfig) {
        if self.drain_timeout_ms == 0 {
            self.drain_timeout_ms = defaults.drain_timeout_ms;
        }
        if self.request_timeout_ms == Some(0) {
            self.request_timeout_ms = None;
        }
    }
}
