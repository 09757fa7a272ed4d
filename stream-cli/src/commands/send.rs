//! Send one file to a peer.

use anyhow::{anyhow, Context as _, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use stream_peer::{ConnectionManager, Event, EventSender, OutgoingFile, StatusKind, TransferEngine};

use super::{render, Context};
use crate::recent::{pick_target, RecentPeer};

/// How long to wait for queued frames to leave after the last chunk.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the send command.
///
/// Without `to`, the peer dialed in the last 30 minutes is used.
pub async fn run(ctx: &Context, to: Option<&str>, addr: Option<&str>, file: &Path) -> Result<()> {
    let outgoing = OutgoingFile::from_path(file)
        .await
        .with_context(|| format!("Failed to open {}", file.display()))?;

    let recent = RecentPeer::load(&ctx.data_dir).await?;
    let (peer, addr) = pick_target(to, addr, recent)
        .context("No recent peer to send to; pass --to <PEER>")?;
    let (peer, addr) = (peer.as_str(), addr.as_deref());

    let (events, mut rx) = EventSender::channel();
    let store = ctx.open_store().await?;
    let engine = TransferEngine::new(store, events.clone(), &ctx.config.transfer);
    let rendezvous = ctx.rendezvous(addr.map(|addr| (peer, addr)))?;
    let manager = ConnectionManager::new(
        rendezvous,
        Arc::new(engine.clone()),
        events,
        ctx.config.connection.clone(),
    );

    let local = ctx.register(&manager).await?;
    tracing::info!(%local, "registered");

    let handle = manager
        .connect(peer)
        .await
        .with_context(|| format!("Failed to connect to {peer}"))?;
    RecentPeer::remember(&ctx.data_dir, handle.id().as_str(), addr).await;
    println!(
        "Sending {} ({} bytes, {}) to {}",
        outgoing.name,
        outgoing.size,
        outgoing.mime,
        handle.id()
    );
    engine.send_file(&handle, outgoing)?;

    let outcome = loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else {
                    break Err(anyhow!("event stream closed"));
                };
                if let Some(line) = render(&event) {
                    println!("{line}");
                }
                if let Some(result) = finished(&event) {
                    break result;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                engine.cancel(&handle).await;
                break Err(anyhow!("cancelled"));
            }
        }
    };

    if outcome.is_ok() {
        if tokio::time::timeout(DRAIN_TIMEOUT, handle.wait_buffered_below(1))
            .await
            .is_err()
        {
            tracing::warn!("timed out flushing the last chunks");
        }
    }
    manager.shutdown().await;
    outcome
}

/// Whether `event` ends a send, and how.
fn finished(event: &Event) -> Option<Result<()>> {
    match event {
        Event::Status {
            kind: StatusKind::TransferSuccess,
            ..
        } => Some(Ok(())),
        Event::Status {
            kind: StatusKind::Error,
            message,
        } => Some(Err(anyhow!("{message}"))),
        Event::Status {
            kind: StatusKind::Disconnected,
            ..
        } => Some(Err(anyhow!("peer disconnected"))),
        Event::Status {
            kind: StatusKind::Info,
            message,
        } => Some(Err(anyhow!("{message}"))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(kind: StatusKind, message: &str) -> Event {
        Event::Status {
            kind,
            message: message.to_string(),
        }
    }

    #[test]
    fn sent_file_finishes_ok() {
        assert!(matches!(
            finished(&status(StatusKind::TransferSuccess, "File Sent!")),
            Some(Ok(()))
        ));
    }

    #[test]
    fn errors_and_cancels_finish_with_failure() {
        let err = finished(&status(StatusKind::Error, "Error: Room Full"))
            .unwrap()
            .unwrap_err();
        assert_eq!(err.to_string(), "Error: Room Full");

        assert!(matches!(
            finished(&status(StatusKind::Info, "Transfer Cancelled by Peer")),
            Some(Err(_))
        ));
        assert!(matches!(
            finished(&status(StatusKind::Disconnected, "Disconnected")),
            Some(Err(_))
        ));
    }

    #[test]
    fn progress_does_not_finish() {
        let progress = Event::Progress {
            percent: 50,
            throughput_mbps: "1.00".into(),
        };
        assert!(finished(&progress).is_none());
        assert!(finished(&status(StatusKind::Connected, "Connected")).is_none());
    }

    #[tokio::test]
    async fn missing_file_is_reported_before_connecting() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::load(dir.path().to_path_buf(), None).unwrap();
        let err = run(&ctx, Some("ABC123"), None, &dir.path().join("absent.bin"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("absent.bin"));
    }

    #[tokio::test]
    async fn no_peer_and_nothing_recent_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"hi").unwrap();
        let ctx = Context::load(dir.path().to_path_buf(), None).unwrap();

        let err = run(&ctx, None, None, &file).await.unwrap_err();
        assert!(err.to_string().contains("--to"), "{err}");
    }
}
