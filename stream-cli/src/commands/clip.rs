//! Shared clipboard over a broadcast session.
//!
//! Each line read from stdin replaces the shared text.

use anyhow::{Context as _, Result};
use std::sync::Arc;
use stream_peer::{BroadcastMode, BroadcastSession, ConnectionManager, EventSender};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{render, Context};
use crate::recent::{pick_target, RecentPeer};

/// Role on the command line.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Share text with many clients.
    Host,
    /// Follow one host, read-only.
    Client,
    /// Edit together with one peer.
    Bidirectional,
}

impl From<Mode> for BroadcastMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Host => BroadcastMode::Host,
            Mode::Client => BroadcastMode::Client,
            Mode::Bidirectional => BroadcastMode::Bidirectional,
        }
    }
}

/// Run the clip command until stdin closes or the user interrupts.
///
/// A client without `connect` follows the peer dialed in the last 30 minutes.
pub async fn run(
    ctx: &Context,
    mode: Mode,
    connect: Option<&str>,
    addr: Option<&str>,
) -> Result<()> {
    let mode = BroadcastMode::from(mode);
    let target = if connect.is_some() || mode == BroadcastMode::Client {
        pick_target(connect, addr, RecentPeer::load(&ctx.data_dir).await?)
    } else {
        None
    };
    let (events, mut rx) = EventSender::channel();
    let session = Arc::new(BroadcastSession::new(mode, events.clone()));

    let mut connection = ctx.config.connection.clone();
    connection.max_peers = mode.max_peers(connection.max_peers);
    let rendezvous = ctx.rendezvous(extra_peer(target.as_ref()))?;
    let manager = ConnectionManager::new(rendezvous, session.clone(), events, connection);

    let id = ctx.register(&manager).await?;
    println!("Clipboard as {id} ({mode:?})");

    if let Some((remote, addr)) = &target {
        let handle = manager
            .connect(remote)
            .await
            .with_context(|| format!("Failed to connect to {remote}"))?;
        RecentPeer::remember(&ctx.data_dir, handle.id().as_str(), addr.as_deref()).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else { break };
                if let Err(e) = session.set_text(line).await {
                    eprintln!("{e}");
                }
            }
            event = rx.recv() => {
                let Some(event) = event else { break };
                if let Some(line) = render(&event) {
                    println!("{line}");
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    manager.shutdown().await;
    Ok(())
}

/// Directory entry for a target that came with an address.
fn extra_peer(target: Option<&(String, Option<String>)>) -> Option<(&str, &str)> {
    let (peer, addr) = target?;
    Some((peer.as_str(), addr.as_deref()?))
}
