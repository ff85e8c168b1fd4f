use std::fmt::{self, Write};

use crate::CproxyConfig;

/// Problems found in a loaded configuration. Errors stop the proxy from
/// starting; warnings are logged once at startup.
#[derive(Debug, Default)]
pub struct ConfigReport {
    warnings: Vec<String>,
    errors: Vec<String>,
}

impl ConfigReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.is_ok()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Multi-line rendering used in `ConfigError::Invalid`.
    pub fn format(&self) -> String {
        self.to_string()
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }
}

impl fmt::Display for ConfigReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sections = [("error", &self.errors), ("warning", &self.warnings)];
        let mut first = true;
        for (label, items) in sections {
            for item in items.iter() {
                if !first {
                    f.write_char('\n')?;
                }
                first = false;
                write!(f, "{label}: {item}")?;
            }
        }
        Ok(())
    }
}

/// Checks `cfg` and collects every problem found, errors and warnings alike.
pub fn validate(cfg: &CproxyConfig) -> ConfigReport {
    let mut report = ConfigReport::default();

    validate_cache(cfg, &mut report);
    validate_proxy(cfg, &mut report);

    report
}

fn validate_cache(cfg: &CproxyConfig, report: &mut ConfigReport) {
    let Some(cache_path) = cfg.cache.path.as_deref() else {
        report.error("cache.path is required");
        return;
    };

    let shown = cache_path.display();
    if cache_path.exists() {
        if !cache_path.is_dir() {
            report.error(format!("cache.path '{shown}' exists but is not a directory"));
        }
    } else if !cache_path.is_absolute() {
        report.warn(format!(
            "cache.path '{shown}' is relative and does not exist; it will be created under the working directory"
        ));
    }

    if cfg.cache.ttl_ms == 0 {
        report.warn("cache.ttl_ms is 0; cached entries never expire");
    }
}

fn validate_proxy(cfg: &CproxyConfig, report: &mut ConfigReport) {
    if cfg.proxy.port != 0 && cfg.proxy.port < 1024 {
        report.warn(format!(
            "proxy.port {} is privileged; binding may require elevated permissions",
            cfg.proxy.port
        ));
    }

    if cfg.proxy.request_timeout_ms.is_none() {
        report.warn("proxy.request_timeout_ms is not set; origin calls have no deadline");
    }

    if cfg.proxy.max_response_body_bytes == Some(0) {
        report.error("proxy.max_response_body_bytes is 0; every origin response would be rejected");
    }
}

#[cfg(test)]
mod tests {
    use super::validate;
    use crate::CproxyConfig;

    #[test]
    fn missing_cache_path_is_reported() {
        let report = validate(&CproxyConfig::default());
        assert!(report.has_errors());
        assert!(report.format().contains("cache.path is required"));
    }

    #[test]
    fn cache_path_pointing_at_a_file_is_an_error() {
        let file = tempfile::NamedTempFile::new().expect("temp file");
        let report = validate(&CproxyConfig::with_cache_path(file.path()));
        assert!(report.errors().iter().any(|e| e.contains("not a directory")));
    }

    #[test]
    fn zero_ttl_and_missing_timeout_are_warnings() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut cfg = CproxyConfig::with_cache_path(dir.path());
        cfg.cache.ttl_ms = 0;
        let report = validate(&cfg);
        assert!(report.is_ok());
        assert_eq!(report.warnings().len(), 2);
    }

    #[test]
    fn report_lists_errors_before_warnings() {
        let mut cfg = CproxyConfig::default();
        cfg.cache.ttl_ms = 0;
        let rendered = validate(&cfg).format();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "error: cache.path is required");
        assert!(lines[1..].iter().all(|l| l.starts_with("warning: ")));
    }

    #[test]
    fn zero_body_cap_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut cfg = CproxyConfig::with_cache_path(dir.path());
        cfg.proxy.request_timeout_ms = Some(1_000);
        cfg.proxy.max_response_body_bytes = Some(0);
        let report = validate(&cfg);
        assert_eq!(report.errors().len(), 1);
        assert!(report.warnings().is_empty());
    }
}
