//! Drop staged chunks from the local store.

use anyhow::Result;
use stream_store::ChunkStore;

use super::Context;

/// Evict stale chunks, or everything with `all`.
pub async fn run(ctx: &Context, all: bool) -> Result<()> {
    let store = ctx.open_store().await?;
    let removed = if all {
        store.clear_all().await?
    } else {
        store
            .evict_older_than(ctx.config.store.retention())
            .await?
    };
    let remaining = store.total_bytes().await?;

    println!("Removed {removed} staged chunks");
    println!("{remaining} bytes still staged");
    Ok(())
}
