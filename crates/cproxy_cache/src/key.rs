use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `bytes`.
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// `<root>/index/<aa>/<sha256(key)>.json`
pub(crate) fn index_path(root: &Path, key: &str) -> PathBuf {
    let hash = digest(key.as_bytes());
    root.join("index")
        .join(&hash[..2])
        .join(format!("{hash}.json"))
}

/// `<root>/content/<aa>/<integrity>`
pub(crate) fn content_path(root: &Path, integrity: &str) -> PathBuf {
    let bucket = integrity.get(..2).unwrap_or("00");
    root.join("content").join(bucket).join(integrity)
}
