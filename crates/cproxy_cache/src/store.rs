use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, instrument, warn};

use crate::{
    entry::{Entry, IndexRecord},
    error::CacheError,
    key::{content_path, digest, index_path},
    policy::{now_millis, CachePolicy},
};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Disk-backed store shared by every request of a proxy instance.
///
/// Cloning is cheap; clones address the same directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
    policy: CachePolicy,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>, ttl: Option<Duration>) -> Self {
        Self {
            root: root.into(),
            policy: CachePolicy::new(ttl),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Returns the fresh entry stored under `key`.
    ///
    /// `CacheError::NotFound` covers both "never stored" and "stored longer
    /// ago than the TTL". Every other error means the store itself failed.
    #[instrument(level = "debug", skip(self), fields(root = %self.root.display()))]
    pub async fn get<M: DeserializeOwned>(&self, key: &str) -> Result<Entry<M>, CacheError> {
        let index_path = index_path(&self.root, key);
        let raw = match fs::read(&index_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CacheError::not_found(key));
            }
            Err(e) => return Err(CacheError::io(&index_path)(e)),
        };

        let record: IndexRecord<M> =
            serde_json::from_slice(&raw).map_err(|source| CacheError::Corrupt {
                path: index_path.clone(),
                source,
            })?;

        // Two keys sharing a digest: not ours.
        if record.key != key {
            return Err(CacheError::not_found(key));
        }

        if !self.policy.is_fresh(record.stored_at, now_millis()) {
            debug!(
                target: "cproxy::cache",
                cache_key = %key,
                stored_at = record.stored_at,
                "Entry is stale"
            );
            return Err(CacheError::not_found(key));
        }

        let content_path = content_path(&self.root, &record.integrity);
        let data = fs::read(&content_path)
            .await
            .map_err(CacheError::io(&content_path))?;

        let actual = digest(&data);
        if actual != record.integrity {
            return Err(CacheError::Integrity {
                key: key.to_string(),
                expected: record.integrity,
                actual,
            });
        }

        debug!(
            target: "cproxy::cache",
            cache_key = %key,
            size = data.len(),
            "Cache read"
        );
        Ok(Entry::from_record(record, Bytes::from(data)))
    }

    /// Stores `data` + `metadata` under `key`, replacing any previous entry.
    /// Returns the body digest.
    #[instrument(level = "debug", skip(self, data, metadata), fields(size = data.len()))]
    pub async fn put<M: Serialize>(
        &self,
        key: &str,
        data: &[u8],
        metadata: &M,
    ) -> Result<String, CacheError> {
        let integrity = digest(data);

        let content_path = content_path(&self.root, &integrity);
        let content_reused = self.content_intact(&content_path, &integrity).await;
        if !content_reused {
            self.write_atomic(&content_path, data).await?;
        }

        let record = IndexRecord {
            key: key.to_string(),
            integrity: integrity.clone(),
            size: data.len() as u64,
            stored_at: now_millis(),
            metadata,
        };
        let json = serde_json::to_vec(&record).map_err(CacheError::Encode)?;
        self.write_atomic(&index_path(&self.root, key), &json).await?;

        debug!(
            target: "cproxy::cache",
            cache_key = %key,
            integrity = %integrity,
            content_reused,
            "Cache write"
        );
        Ok(integrity)
    }

    /// True when `path` already holds bytes hashing to `integrity`. A missing,
    /// unreadable or damaged file is rewritten by the caller.
    async fn content_intact(&self, path: &Path, integrity: &str) -> bool {
        match fs::read(path).await {
            Ok(existing) if digest(&existing) == integrity => true,
            Ok(_) => {
                warn!(
                    target: "cproxy::cache",
                    path = %path.display(),
                    "Stored content does not match its digest; rewriting"
                );
                false
            }
            Err(_) => false,
        }
    }

    /// Writes into `tmp/` first, then renames over `dest`.
    async fn write_atomic(&self, dest: &Path, bytes: &[u8]) -> Result<(), CacheError> {
        let tmp_dir = self.root.join("tmp");
        fs::create_dir_all(&tmp_dir)
            .await
            .map_err(CacheError::io(&tmp_dir))?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(CacheError::io(parent))?;
        }

        let tmp = tmp_dir.join(tmp_file_name());
        if let Err(e) = write_synced(&tmp, bytes).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(CacheError::io(&tmp)(e));
        }

        if let Err(e) = fs::rename(&tmp, dest).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(CacheError::io(dest)(e));
        }

        Ok(())
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(())
}

fn tmp_file_name() -> String {
    let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}-{seq}.tmp", std::process::id(), now_millis())
}
