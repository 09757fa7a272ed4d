//! Shared text broadcast.
//!
//! A [`BroadcastSession`] keeps one text buffer in sync across its peers.
//! The last write wins; nothing is persisted.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use stream_core::TransferStatus;
use stream_types::{Message, PeerId};
use tracing::{debug, warn};

use crate::error::BroadcastError;
use crate::events::{Event, EventSender};
use crate::manager::{PeerHandle, SessionHandler};

/// Role of this endpoint in a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastMode {
    /// Authoritative; many peers; inbound text is ignored.
    Host,
    /// One upstream host; read-only.
    Client,
    /// One peer; either side edits.
    Bidirectional,
}

impl BroadcastMode {
    /// Pool bound for this role.
    pub fn max_peers(self, configured: usize) -> usize {
        match self {
            Self::Host => configured.max(1),
            Self::Client | Self::Bidirectional => 1,
        }
    }

    /// Whether local edits are allowed.
    pub fn can_edit(self) -> bool {
        !matches!(self, Self::Client)
    }
}

/// Broadcast session. Attach to a manager as its session handler.
pub struct BroadcastSession {
    mode: BroadcastMode,
    text: Mutex<String>,
    peers: Mutex<BTreeMap<PeerId, PeerHandle>>,
    events: EventSender,
}

impl BroadcastSession {
    /// Create an empty session.
    pub fn new(mode: BroadcastMode, events: EventSender) -> Self {
        Self {
            mode,
            text: Mutex::new(String::new()),
            peers: Mutex::new(BTreeMap::new()),
            events,
        }
    }

    /// Replace the local text and send it to every open channel.
    ///
    /// Delivery failures are logged per peer and do not fail the call.
    pub async fn set_text(&self, text: impl Into<String>) -> Result<(), BroadcastError> {
        if !self.mode.can_edit() {
            return Err(BroadcastError::ReadOnly);
        }

        let text = text.into();
        *self.text.lock().unwrap() = text.clone();

        let message = Message::text(text);
        for peer in self.handles() {
            if !peer.is_open() {
                continue;
            }
            if let Err(e) = peer.send(&message).await {
                warn!(peer = %peer.id(), error = %e, "text not delivered");
            }
        }
        Ok(())
    }

    /// Current text.
    pub fn text(&self) -> String {
        self.text.lock().unwrap().clone()
    }

    /// Peers currently in the session.
    pub fn peers(&self) -> Vec<PeerId> {
        self.peers.lock().unwrap().keys().cloned().collect()
    }

    /// Role of this endpoint.
    pub fn mode(&self) -> BroadcastMode {
        self.mode
    }

    fn handles(&self) -> Vec<PeerHandle> {
        self.peers.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl SessionHandler for BroadcastSession {
    async fn on_open(&self, peer: &PeerHandle) {
        self.peers
            .lock()
            .unwrap()
            .insert(peer.id().clone(), peer.clone());

        if self.mode == BroadcastMode::Host {
            let text = self.text();
            if !text.is_empty() {
                if let Err(e) = peer.send(&Message::text(text)).await {
                    warn!(peer = %peer.id(), error = %e, "replay not delivered");
                }
            }
        }
    }

    async fn on_message(&self, peer: &PeerHandle, message: Message) {
        match message {
            Message::Text(update) if self.mode != BroadcastMode::Host => {
                *self.text.lock().unwrap() = update.text.clone();
                self.events.emit(Event::TextChanged(update.text));
            }
            Message::Error(notice) => {
                warn!(peer = %peer.id(), message = %notice.message, "peer reported error");
                self.events
                    .emit(Event::transfer(&TransferStatus::PeerError(notice.message)));
            }
            other => debug!(peer = %peer.id(), kind = other.kind(), "ignoring message"),
        }
    }

    async fn on_close(&self, peer: &PeerId) {
        self.peers.lock().unwrap().remove(peer);
    }
}
