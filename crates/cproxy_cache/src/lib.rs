//! Content-addressed response cache on local disk.
//!
//! Layout under the cache root:
//! - `index/<aa>/<sha256(key)>.json`: index record (key, body digest, metadata)
//! - `content/<aa>/<sha256(body)>`: body bytes, shared by identical bodies
//! - `tmp/`: staging area; every file is renamed into place once complete
//!
//! A reader never observes a half-written entry: content is renamed into
//! place before the index record that points at it.

mod entry;
mod error;
mod key;
mod policy;
mod store;

use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

pub use entry::Entry;
pub use error::CacheError;
pub use key::digest;
pub use policy::CachePolicy;
pub use store::CacheStore;

/// Reads the entry stored under `key` in the cache rooted at `root`.
/// No TTL is applied; use [`CacheStore`] for staleness checks.
pub async fn get<M: DeserializeOwned>(
    root: impl AsRef<Path>,
    key: &str,
) -> Result<Entry<M>, CacheError> {
    CacheStore::new(root.as_ref(), None).get(key).await
}

/// Atomically stores `data` and `metadata` under `key`, replacing any
/// previous entry. Returns the body digest.
pub async fn put<M: Serialize>(
    root: impl AsRef<Path>,
    key: &str,
    data: &[u8],
    metadata: &M,
) -> Result<String, CacheError> {
    CacheStore::new(root.as_ref(), None)
        .put(key, data, metadata)
        .await
}
