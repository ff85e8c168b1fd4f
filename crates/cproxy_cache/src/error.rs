use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    /// No entry, or only a stale one, exists for the key.
    #[error("no cache entry for {key:?}")]
    NotFound { key: String },

    #[error("cache I/O failed at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt cache index {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot encode cache metadata: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("integrity mismatch for {key:?}: expected {expected}, found {actual}")]
    Integrity {
        key: String,
        expected: String,
        actual: String,
    },
}

impl CacheError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound { .. })
    }

    pub(crate) fn not_found(key: &str) -> Self {
        CacheError::NotFound {
            key: key.to_string(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| CacheError::Io { path, source }
    }
}
