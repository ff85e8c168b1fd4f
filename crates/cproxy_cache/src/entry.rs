use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// What `index/<..>.json` holds for one key.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct IndexRecord<M> {
    pub(crate) key: String,
    pub(crate) integrity: String,
    pub(crate) size: u64,
    pub(crate) stored_at: u64,
    pub(crate) metadata: M,
}

/// A cache hit: the caller's metadata plus the stored body.
#[derive(Debug, Clone)]
pub struct Entry<M> {
    pub key: String,
    /// SHA-256 of `data`.
    pub integrity: String,
    pub metadata: M,
    pub data: Bytes,
    pub stored_at: SystemTime,
}

impl<M> Entry<M> {
    pub(crate) fn from_record(record: IndexRecord<M>, data: Bytes) -> Self {
        Self {
            key: record.key,
            integrity: record.integrity,
            metadata: record.metadata,
            data,
            stored_at: UNIX_EPOCH + Duration::from_millis(record.stored_at),
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}
