//! # stream-store
//!
//! Durable staging area for incoming file chunks.
//!
//! Chunks are keyed by `(FileKey, offset)` and survive a process crash until
//! they are reassembled, cleared, or evicted by age. Reassembly only succeeds
//! when the staged chunks tile the declared file exactly.
//!
//! - [`SqliteChunkStore`] - on-disk store (WAL mode)
//! - [`MemoryChunkStore`] - in-process store for tests and ephemeral use

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod memory;
mod sqlite;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryChunkStore;
pub use sqlite::SqliteChunkStore;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use stream_types::FileKey;

/// A reassembled file.
#[derive(Clone, PartialEq, Eq)]
pub struct Blob {
    /// MIME type declared by the sender.
    pub mime: String,
    /// File contents.
    pub data: Vec<u8>,
}

impl Blob {
    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the file is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for Blob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blob")
            .field("mime", &self.mime)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Trait for chunk staging backends.
///
/// One store is shared by every session; sessions never touch each other's
/// keys, so implementations need no cross-key coordination.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Stage `data` at `(key, offset)`, overwriting any chunk already there.
    ///
    /// Returns `QuotaExceeded` when the write would not fit.
    async fn put(&self, key: &FileKey, offset: u64, data: &[u8]) -> StoreResult<()>;

    /// Concatenate the staged chunks for `key` in offset order.
    ///
    /// Returns `Ok(None)` when nothing is staged. Returns `Integrity` when
    /// the chunks leave a gap, overlap, or do not end at `expected_size`.
    async fn reassemble(
        &self,
        key: &FileKey,
        mime: &str,
        expected_size: u64,
    ) -> StoreResult<Option<Blob>>;

    /// Delete every chunk for `key`. Returns rows removed.
    async fn clear(&self, key: &FileKey) -> StoreResult<u64>;

    /// Delete every chunk in the store. Returns rows removed.
    async fn clear_all(&self) -> StoreResult<u64>;

    /// Delete files whose newest chunk was written more than `max_age` ago.
    ///
    /// A file that is still receiving chunks is never partially evicted.
    /// Returns rows removed.
    async fn evict_older_than(&self, max_age: Duration) -> StoreResult<u64>;

    /// Number of chunks staged for `key`.
    async fn chunk_count(&self, key: &FileKey) -> StoreResult<u64>;

    /// Bytes staged for `key`.
    async fn staged_bytes(&self, key: &FileKey) -> StoreResult<u64>;

    /// Bytes staged across all keys.
    async fn total_bytes(&self) -> StoreResult<u64>;
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Cutoff timestamp for an age-based eviction.
pub(crate) fn cutoff_millis(max_age: Duration) -> i64 {
    now_millis().saturating_sub(max_age.as_millis().min(i64::MAX as u128) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_debug_omits_contents() {
        let blob = Blob {
            mime: "text/plain".into(),
            data: vec![0xAB; 16],
        };
        let debug = format!("{blob:?}");
        assert!(debug.contains("len: 16"));
        assert!(!debug.contains("171"));
    }

    #[test]
    fn cutoff_is_in_the_past() {
        let now = now_millis();
        let cutoff = cutoff_millis(Duration::from_secs(60));
        assert!(cutoff <= now - 60_000);
        assert!(cutoff_millis(Duration::MAX) <= 0);
    }
}
