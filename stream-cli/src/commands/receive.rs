//! Wait for incoming files and save them.

use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stream_peer::{spawn_eviction_task, ConnectionManager, Event, EventSender, ReceivedFile, TransferEngine};

use super::{render, Context};

/// Run the receive command until interrupted.
pub async fn run(ctx: &Context, out_dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(out_dir)
        .await
        .context("Failed to create output directory")?;

    let (events, mut rx) = EventSender::channel();
    let store = ctx.open_store().await?;
    let eviction = spawn_eviction_task(
        store.clone(),
        ctx.config.eviction.clone(),
        ctx.config.store.retention(),
    );
    let engine = TransferEngine::new(store, events.clone(), &ctx.config.transfer);
    let rendezvous = ctx.rendezvous(None)?;
    let manager = ConnectionManager::new(
        rendezvous.clone(),
        Arc::new(engine),
        events,
        ctx.config.connection.clone(),
    );

    let id = ctx.register(&manager).await?;
    match rendezvous.local_addr() {
        Some(addr) => println!("Receiving as {id} on {addr}"),
        None => println!("Receiving as {id}"),
    }

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                if let Some(line) = render(&event) {
                    println!("{line}");
                }
                if let Event::FileReceived(file) = &event {
                    match save(out_dir, file).await {
                        Ok(path) => println!("Saved to {}", path.display()),
                        Err(e) => eprintln!("{e:#}"),
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    manager.shutdown().await;
    eviction.abort();
    Ok(())
}

/// Write a received file into `out_dir` without overwriting anything.
async fn save(out_dir: &Path, file: &ReceivedFile) -> Result<PathBuf> {
    let path = unique_path(out_dir, &safe_name(&file.name));
    tokio::fs::write(&path, &file.blob.data)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// Final path component of a sender-supplied name.
fn safe_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("").trim();
    if base.is_empty() || base == "." || base == ".." {
        "received.bin".to_string()
    } else {
        base.to_string()
    }
}

fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }
    let (stem, ext) = match name.rfind('.') {
        Some(i) if i > 0 => (&name[..i], &name[i..]),
        _ => (name, ""),
    };
    (1..)
        .map(|n| dir.join(format!("{stem} ({n}){ext}")))
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}
