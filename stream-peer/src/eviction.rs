//! Background eviction of abandoned chunks.
//!
//! Runs periodically to delete files whose newest chunk is older than the
//! retention period, so interrupted transfers do not pile up.

use crate::config::EvictionConfig;
use std::sync::Arc;
use std::time::Duration;
use stream_store::ChunkStore;
use tokio::time::interval;

/// Spawn a background eviction task.
///
/// Returns a handle that can be used to abort the task.
pub fn spawn_eviction_task(
    store: Arc<dyn ChunkStore>,
    config: EvictionConfig,
    retention: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if !config.enabled {
            tracing::info!("Eviction task disabled");
            return;
        }

        let interval_secs = config.interval_secs.max(1);
        tracing::info!(
            "Eviction task started (interval: {}s, retention: {}s)",
            interval_secs,
            retention.as_secs()
        );

        let mut timer = interval(Duration::from_secs(interval_secs));

        loop {
            timer.tick().await;

            match store.evict_older_than(retention).await {
                Ok(removed) => {
                    if removed > 0 {
                        tracing::info!("Eviction: removed {} stale chunks", removed);
                    } else {
                        tracing::debug!("Eviction: nothing stale");
                    }
                }
                Err(e) => {
                    tracing::error!("Eviction error: {}", e);
                }
            }
        }
    })
}
