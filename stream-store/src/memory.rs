//! In-memory chunk store.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use stream_core::verify_tiling;
use stream_types::FileKey;

use crate::error::{StoreError, StoreResult};
use crate::{cutoff_millis, now_millis, Blob, ChunkStore};

#[derive(Debug, Clone)]
struct StagedChunk {
    data: Vec<u8>,
    written_at: i64,
}

#[derive(Default)]
struct Inner {
    chunks: BTreeMap<(FileKey, u64), StagedChunk>,
    total: u64,
}

/// In-memory chunk store.
///
/// Not persistent: staged chunks are lost when the last clone is dropped.
/// Ordered by `(key, offset)` so reassembly is a range scan.
#[derive(Default, Clone)]
pub struct MemoryChunkStore {
    inner: Arc<Mutex<Inner>>,
    max_bytes: Option<u64>,
}

impl MemoryChunkStore {
    /// Create a new empty store with no quota.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that rejects writes past `max_bytes`.
    pub fn with_max_bytes(max_bytes: u64) -> Self {
        Self {
            inner: Arc::default(),
            max_bytes: Some(max_bytes),
        }
    }

    /// Number of chunks across all keys.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().chunks.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().chunks.is_empty()
    }
}

fn key_range<'a>(
    chunks: &'a BTreeMap<(FileKey, u64), StagedChunk>,
    key: &FileKey,
) -> impl Iterator<Item = (u64, StagedChunk)> + 'a {
    let key = key.clone();
    chunks
        .range((key.clone(), 0)..=(key, u64::MAX))
        .map(|((_, offset), chunk)| (*offset, chunk.clone()))
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn put(&self, key: &FileKey, offset: u64, data: &[u8]) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let slot = (key.clone(), offset);
        let replaced = inner
            .chunks
            .get(&slot)
            .map(|c| c.data.len() as u64)
            .unwrap_or(0);

        let after = inner.total - replaced + data.len() as u64;
        if let Some(limit) = self.max_bytes {
            if after > limit {
                return Err(StoreError::QuotaExceeded { limit });
            }
        }

        inner.chunks.insert(
            slot,
            StagedChunk {
                data: data.to_vec(),
                written_at: now_millis(),
            },
        );
        inner.total = after;
        Ok(())
    }

    async fn reassemble(
        &self,
        key: &FileKey,
        mime: &str,
        expected_size: u64,
    ) -> StoreResult<Option<Blob>> {
        let staged: Vec<(u64, StagedChunk)> = {
            let inner = self.inner.lock().unwrap();
            let staged = key_range(&inner.chunks, key).collect();
            staged
        };

        if staged.is_empty() {
            return Ok(None);
        }

        verify_tiling(
            staged
                .iter()
                .map(|(offset, chunk)| (*offset, chunk.data.len() as u64)),
            expected_size,
        )
        .map_err(|source| StoreError::Integrity {
            key: key.to_string(),
            source,
        })?;

        let data = staged.into_iter().flat_map(|(_, c)| c.data).collect();
        Ok(Some(Blob {
            mime: mime.to_string(),
            data,
        }))
    }

    async fn clear(&self, key: &FileKey) -> StoreResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        let offsets: Vec<u64> = key_range(&inner.chunks, key).map(|(o, _)| o).collect();

        let mut freed = 0u64;
        for offset in &offsets {
            if let Some(chunk) = inner.chunks.remove(&(key.clone(), *offset)) {
                freed += chunk.data.len() as u64;
            }
        }
        inner.total -= freed;
        Ok(offsets.len() as u64)
    }

    async fn clear_all(&self) -> StoreResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        let removed = inner.chunks.len() as u64;
        inner.chunks.clear();
        inner.total = 0;
        Ok(removed)
    }

    async fn evict_older_than(&self, max_age: Duration) -> StoreResult<u64> {
        let cutoff = cutoff_millis(max_age);
        let mut inner = self.inner.lock().unwrap();

        let mut newest: BTreeMap<FileKey, i64> = BTreeMap::new();
        for ((key, _), chunk) in &inner.chunks {
            let entry = newest.entry(key.clone()).or_insert(i64::MIN);
            *entry = (*entry).max(chunk.written_at);
        }
        let stale: Vec<FileKey> = newest
            .into_iter()
            .filter(|(_, written_at)| *written_at < cutoff)
            .map(|(key, _)| key)
            .collect();

        let before = inner.chunks.len();
        let mut freed = 0u64;
        inner.chunks.retain(|(key, _), chunk| {
            if stale.contains(key) {
                freed += chunk.data.len() as u64;
                false
            } else {
                true
            }
        });
        inner.total -= freed;
        Ok((before - inner.chunks.len()) as u64)
    }

    async fn chunk_count(&self, key: &FileKey) -> StoreResult<u64> {
        let inner = self.inner.lock().unwrap();
        let count = key_range(&inner.chunks, key).count();
        Ok(count as u64)
    }

    async fn staged_bytes(&self, key: &FileKey) -> StoreResult<u64> {
        let inner = self.inner.lock().unwrap();
        let bytes = key_range(&inner.chunks, key)
            .map(|(_, c)| c.data.len() as u64)
            .sum();
        Ok(bytes)
    }

    async fn total_bytes(&self) -> StoreResult<u64> {
        Ok(self.inner.lock().unwrap().total)
    }
}
