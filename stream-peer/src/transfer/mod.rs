//! File transfer engine.
//!
//! Drives the sender and receiver state machines from `stream-core` over
//! admitted channels. Attach a [`TransferEngine`] to a
//! [`ConnectionManager`](crate::ConnectionManager) as its session handler.
//!
//! Per channel there is at most one outgoing and one incoming transfer.
//! Inbound chunks are staged in the [`ChunkStore`] and reassembled once the
//! declared size has arrived.

mod receiver;
mod sender;

pub use sender::{detect_mime_type, OutgoingFile};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use stream_core::{
    display_name, Progress, ReceiveEvent, ReceiveState, SendAction, SendEvent, TransferPolicy,
    TransferStatus,
};
use stream_store::ChunkStore;
use stream_types::{Message, PeerId};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::TransferConfig;
use crate::error::{TransferError, TransferResult};
use crate::events::{Event, EventSender};
use crate::manager::{PeerHandle, SessionHandler};
use sender::{read_worker, OutgoingTransfer, Producer, SendGate};

/// Transfer state for one channel.
#[derive(Default)]
struct ChannelSession {
    receive: Arc<tokio::sync::Mutex<ReceiveState>>,
    outgoing: Option<OutgoingTransfer>,
}

struct EngineInner {
    store: Arc<dyn ChunkStore>,
    events: EventSender,
    policy: TransferPolicy,
    high_water_mark: usize,
    sessions: Mutex<HashMap<PeerId, ChannelSession>>,
}

/// File transfer engine.
///
/// Cheap to clone; clones share sessions.
#[derive(Clone)]
pub struct TransferEngine {
    inner: Arc<EngineInner>,
}

impl TransferEngine {
    /// Create an engine staging into `store`.
    pub fn new(store: Arc<dyn ChunkStore>, events: EventSender, config: &TransferConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store,
                events,
                policy: config.policy(),
                high_water_mark: config.high_water_mark.max(1),
                sessions: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Start streaming `file` to `peer`.
    ///
    /// Returns once the transfer is running; completion is reported through
    /// events.
    ///
    /// # Errors
    ///
    /// - `NotConnected` if the channel is closed
    /// - `Busy` if a transfer to this peer is still running
    pub fn send_file(&self, peer: &PeerHandle, file: OutgoingFile) -> TransferResult<()> {
        if !peer.is_open() {
            return Err(TransferError::NotConnected(peer.id().clone()));
        }

        let mut sessions = self.inner.sessions.lock().unwrap();
        let session = sessions.entry(peer.id().clone()).or_default();
        if session.outgoing.as_ref().is_some_and(|o| !o.is_finished()) {
            return Err(TransferError::Busy(peer.id().clone()));
        }

        info!(peer = %peer.id(), name = %file.name, size = file.size, "sending file");
        self.inner.events.emit(Event::transfer(&TransferStatus::Sending {
            name: display_name(&file.name),
        }));
        let meta = Message::meta(file.name, file.size, file.mime);
        let (request_tx, request_rx) = mpsc::channel(1);
        let (reply_tx, reply_rx) = mpsc::channel(1);
        let reader = tokio::spawn(read_worker(file.source, request_rx, reply_tx));

        let cancel = Arc::new(AtomicBool::new(false));
        let gate = SendGate::default();
        let state = Arc::default();
        let producer = Producer {
            peer: peer.clone(),
            meta,
            size: file.size,
            events: self.inner.events.clone(),
            policy: self.inner.policy.clone(),
            high_water_mark: self.inner.high_water_mark,
            cancel: cancel.clone(),
            gate: gate.clone(),
            state: Arc::clone(&state),
            reader: reader.abort_handle(),
            requests: request_tx,
            replies: reply_rx,
        };
        let producer = tokio::spawn(producer.run());

        session.outgoing = Some(OutgoingTransfer {
            cancel,
            gate,
            state,
            producer,
            reader: reader.abort_handle(),
        });
        Ok(())
    }

    /// Cancel every transfer on the channel to `peer`.
    ///
    /// Stops the local producer before it sends anything else, purges any
    /// partially received file, and tells the peer. A message the producer
    /// is already handing to the channel goes out before the cancel.
    pub async fn cancel(&self, peer: &PeerHandle) {
        self.inner.abort_outgoing(peer.id()).await;

        let receive = self.inner.receive_state(peer.id());
        let mut state = receive.lock().await;
        if let Some(session) = state.session() {
            let key = session.key.clone();
            self.inner.purge(&key).await;
        }
        *state = ReceiveState::Idle;
        drop(state);

        if let Err(e) = peer.send(&Message::Cancel(Default::default())).await {
            debug!(peer = %peer.id(), error = %e, "cancel not delivered");
        }
        self.inner.events.progress(Progress::reset());
        self.inner
            .events
            .emit(Event::transfer(&TransferStatus::Cancelled));
        info!(peer = %peer.id(), "transfer cancelled");
    }

    /// Whether an outgoing transfer to `peer` is running.
    pub fn is_sending(&self, peer: &PeerId) -> bool {
        let sessions = self.inner.sessions.lock().unwrap();
        sessions
            .get(peer)
            .and_then(|s| s.outgoing.as_ref())
            .is_some_and(|o| !o.is_finished())
    }

    /// Whether a file from `peer` is partially received.
    pub async fn is_receiving(&self, peer: &PeerId) -> bool {
        let receive = self.inner.receive_state(peer);
        let receiving = !receive.lock().await.is_idle();
        receiving
    }
}

impl EngineInner {
    fn receive_state(&self, peer: &PeerId) -> Arc<tokio::sync::Mutex<ReceiveState>> {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.entry(peer.clone()).or_default().receive.clone()
    }

    /// Stop the outgoing transfer to `peer`, if any.
    ///
    /// Returns whether a running transfer was stopped. Progress is reported
    /// by the caller.
    async fn abort_outgoing(&self, peer: &PeerId) -> bool {
        let outgoing = {
            let mut sessions = self.sessions.lock().unwrap();
            sessions.get_mut(peer).and_then(|s| s.outgoing.take())
        };
        match outgoing {
            Some(outgoing) => {
                let was_running = !outgoing.is_finished();
                outgoing.abort(&self.policy).await;
                was_running
            }
            None => false,
        }
    }
}

#[async_trait]
impl SessionHandler for TransferEngine {
    async fn on_open(&self, peer: &PeerHandle) {
        self.inner.receive_state(peer.id());
    }

    async fn on_message(&self, peer: &PeerHandle, message: Message) {
        let event = match message {
            Message::Meta(meta) => ReceiveEvent::Meta {
                name: meta.name,
                size: meta.size,
                mime: meta.mime,
            },
            Message::Chunk(chunk) => ReceiveEvent::Chunk {
                offset: chunk.offset,
                data: chunk.data,
                at: std::time::Instant::now(),
            },
            Message::Cancel(_) => ReceiveEvent::Cancel,
            Message::Error(notice) => {
                warn!(peer = %peer.id(), message = %notice.message, "peer reported error");
                self.inner
                    .events
                    .emit(Event::transfer(&TransferStatus::PeerError(notice.message)));
                return;
            }
            other => {
                debug!(peer = %peer.id(), kind = other.kind(), "ignoring message");
                return;
            }
        };
        self.inner.handle_receive(peer, event).await;
    }

    async fn on_close(&self, peer: &PeerId) {
        if self.inner.abort_outgoing(peer).await {
            info!(peer = %peer, "outgoing transfer stopped by disconnect");
        }
        self.inner.sessions.lock().unwrap().remove(peer);
    }
}

impl OutgoingTransfer {
    fn is_finished(&self) -> bool {
        self.producer.is_finished()
    }

    /// Stop both tasks. Nothing is sent after this returns.
    async fn abort(self, policy: &TransferPolicy) {
        let _gate = self.gate.lock().await;
        self.cancel.store(true, Ordering::SeqCst);
        self.producer.abort();

        let actions = {
            let mut state = self.state.lock().unwrap();
            let (next, actions) = std::mem::take(&mut *state).on_event(SendEvent::Cancel, policy);
            *state = next;
            actions
        };
        for action in actions {
            // progress is reset by whoever asked for the abort
            if action == SendAction::AbortReader {
                self.reader.abort();
            }
        }
    }
}
