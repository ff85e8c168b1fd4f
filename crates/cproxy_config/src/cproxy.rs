use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::validation::{validate, ConfigReport};
use crate::{CacheConfig, ConfigError, GlobalConfig, ProxyConfig};

/// File read by `from_env` when `CPROXY_CONFIG` is not set.
pub const DEFAULT_CONFIG_FILE: &str = "cproxy.toml";

/// Prefix of environment overrides, e.g. `CPROXY__CACHE__PATH`.
pub const CONFIG_ENV_PREFIX: &str = "CPROXY";

// =======================================================
// CPROXY CONFIG: main config
// =======================================================
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CproxyConfig {
    #[serde(default)]
    pub global: GlobalConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub proxy: ProxyConfig,
}

impl CproxyConfig {
    /// Minimal configuration: everything defaulted except the cache root.
    pub fn with_cache_path(path: impl Into<PathBuf>) -> Self {
        let mut cfg = Self::default();
        cfg.cache.path = Some(path.into());
        cfg.apply_defaults();
        cfg
    }

    pub fn global(&self) -> &GlobalConfig {
        &self.global
    }

    pub fn cache(&self) -> &CacheConfig {
        &self.cache
    }

    pub fn proxy(&self) -> &ProxyConfig {
        &self.proxy
    }

    /// The cache root, or `ConfigError::MissingCachePath`.
    pub fn cache_path(&self) -> Result<&Path, ConfigError> {
        self.cache
            .path()
            .map(PathBuf::as_path)
            .ok_or(ConfigError::MissingCachePath)
    }

    /// Validate the configuration and return a report of warnings and errors.
    pub fn validate(&self) -> ConfigReport {
        validate(self)
    }

    /// Loads `file_name` (TOML, optional) layered with `CPROXY__*` env vars.
    pub fn from_file(file_name: &str) -> Result<Self, ConfigError> {
        let built = config::Config::builder()
            .add_source(config::File::new(file_name, config::FileFormat::Toml).required(false))
            .add_source(
                config::Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let mut cfg: CproxyConfig = built.try_deserialize()?;

        cfg.apply_defaults();
        Ok(cfg)
    }

    /// Loads from `$CPROXY_CONFIG`, falling back to `cproxy.toml`, and
    /// rejects configurations whose report contains errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        let file_name = std::env::var(format!("{CONFIG_ENV_PREFIX}_CONFIG"))
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let cfg = Self::from_file(&file_name)?;

        let report = cfg.validate();
        if report.has_errors() {
            return Err(ConfigError::Invalid(report.format()));
        }
        Ok(cfg)
    }

    fn apply_defaults(&mut self) {
        self.cache.normalize();

        let def_global = GlobalConfig::default();
        self.global.apply_defaults_from(&def_global);

        let def_proxy = ProxyConfig::default();
        self.proxy.apply_defaults_from(&def_proxy);
    }

    /// One-line summary for startup logs.
    pub fn summary(&self) -> String {
        format!(
            "cache.path={:?} cache.ttl_ms={} proxy.port={} proxy.request_timeout_ms={:?} proxy.max_response_body_bytes={:?}",
            self.cache.path,
            self.cache.ttl_ms,
            self.proxy.port,
            self.proxy.request_timeout_ms,
            self.proxy.max_response_body_bytes,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::CproxyConfig;
    use crate::ConfigError;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = CproxyConfig::with_cache_path("/tmp/cproxy");
        assert_eq!(cfg.cache.ttl_ms, 86_400_000);
        assert_eq!(cfg.proxy.port, 0);
        assert_eq!(cfg.global.log_level, "info");
        assert!(cfg.proxy.request_timeout().is_none());
    }

    #[test]
    fn missing_cache_path_is_an_error() {
        let cfg = CproxyConfig::default();
        assert!(matches!(cfg.cache_path(), Err(ConfigError::MissingCachePath)));
    }

    #[test]
    fn from_file_reads_sections() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp file");
        writeln!(
            file,
            "[cache]\npath = \"/var/tmp/cproxy\"\nttl_ms = 1000\n\n[proxy]\nport = 8123\nrequest_timeout_ms = 0\n"
        )
        .expect("write config");

        let path = file.path().to_str().expect("utf-8 path").to_string();
        let cfg = CproxyConfig::from_file(&path).expect("expected ok");
        assert_eq!(cfg.cache_path().expect("path").to_str(), Some("/var/tmp/cproxy"));
        assert_eq!(cfg.cache.ttl_ms, 1000);
        assert_eq!(cfg.proxy.port, 8123);
        // 0 means "no deadline"
        assert!(cfg.proxy.request_timeout().is_none());
        assert_eq!(cfg.proxy.drain_timeout_ms, 5_000);
    }

    #[test]
    fn from_file_tolerates_missing_file() {
        let cfg = CproxyConfig::from_file("/nonexistent/cproxy-test.toml").expect("expected ok");
        assert_eq!(cfg.proxy.drain_timeout_ms, 5_000);
        assert_eq!(cfg.global.log_level, "info");
    }

    #[test]
    fn empty_cache_path_is_treated_as_missing() {
        let mut cfg = CproxyConfig::with_cache_path("");
        cfg.apply_defaults();
        assert!(cfg.cache_path().is_err());
    }
}
