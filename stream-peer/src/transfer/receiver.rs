//! Incoming side: staging chunks and reassembling completed files.

use std::collections::VecDeque;

use stream_core::{CompletedFile, ReceiveAction, ReceiveEvent, TransferStatus};
use stream_store::Blob;
use stream_types::{FileKey, Message};
use tracing::{debug, error, info, warn};

use super::EngineInner;
use crate::events::{Event, ReceivedFile};
use crate::manager::PeerHandle;

impl EngineInner {
    /// Feed one inbound event to the channel's receive state and perform the
    /// resulting actions.
    ///
    /// The receive state stays locked until every action has run, so a
    /// concurrent local cancel sees either the state before this message or
    /// the state after it.
    pub(super) async fn handle_receive(&self, peer: &PeerHandle, event: ReceiveEvent) {
        let receive = self.receive_state(peer.id());
        let mut state = receive.lock().await;

        let (next, actions) = std::mem::take(&mut *state).on_event(event, &self.policy);
        *state = next;

        let mut queue: VecDeque<ReceiveAction> = actions.into();
        while let Some(action) = queue.pop_front() {
            match action {
                ReceiveAction::Purge(key) => self.purge(&key).await,
                ReceiveAction::Stage { key, offset, data } => {
                    if let Err(e) = self.store.put(&key, offset, &data).await {
                        error!(peer = %peer.id(), %key, offset, error = %e, "failed to stage chunk");
                        let failed = ReceiveEvent::StoreFailed {
                            key,
                            error: e.to_string(),
                        };
                        let (next, actions) = std::mem::take(&mut *state).on_event(failed, &self.policy);
                        *state = next;
                        queue = actions.into();
                    } else {
                        debug!(peer = %peer.id(), %key, offset, len = data.len(), "chunk staged");
                    }
                }
                ReceiveAction::Progress(progress) => self.events.progress(progress),
                ReceiveAction::Complete(file) => self.complete(peer, file).await,
                ReceiveAction::AbortOutgoing => {
                    if self.abort_outgoing(peer.id()).await {
                        info!(peer = %peer.id(), "outgoing transfer cancelled by peer");
                    }
                }
                ReceiveAction::AbortPeer(reason) => {
                    warn!(peer = %peer.id(), %reason, "stopping peer's transfer");
                    for message in [Message::error(reason), Message::Cancel(Default::default())] {
                        if let Err(e) = peer.send(&message).await {
                            debug!(peer = %peer.id(), kind = message.kind(), error = %e, "abort notice not delivered");
                        }
                    }
                }
                ReceiveAction::Status(status) => self.events.emit(Event::transfer(&status)),
            }
        }
    }

    /// Reassemble a fully received file and hand it off.
    async fn complete(&self, peer: &PeerHandle, file: CompletedFile) {
        let reassembled = if file.size == 0 {
            Ok(Some(Blob {
                mime: file.mime.clone(),
                data: Vec::new(),
            }))
        } else {
            self.store
                .reassemble(&file.key, &file.mime, file.size)
                .await
        };

        match reassembled {
            Ok(Some(blob)) => {
                info!(peer = %peer.id(), name = %file.name, size = file.size, "file received");
                self.events.emit(Event::FileReceived(ReceivedFile {
                    from: peer.id().clone(),
                    name: file.name,
                    blob,
                }));
                self.events
                    .emit(Event::transfer(&TransferStatus::DownloadComplete));
                self.purge(&file.key).await;
            }
            Ok(None) => {
                warn!(peer = %peer.id(), key = %file.key, "no chunks staged at completion");
                self.events.emit(Event::transfer(&TransferStatus::Failed(format!(
                    "no data staged for {}",
                    file.name
                ))));
            }
            Err(e) if e.is_integrity() => {
                // chunks stay staged for inspection until the next clear
                warn!(peer = %peer.id(), key = %file.key, error = %e, "reassembly failed");
                self.events
                    .emit(Event::transfer(&TransferStatus::Failed(e.to_string())));
            }
            Err(e) => {
                error!(peer = %peer.id(), key = %file.key, error = %e, "reassembly failed");
                self.events
                    .emit(Event::transfer(&TransferStatus::Failed(e.to_string())));
                self.purge(&file.key).await;
            }
        }
    }

    /// Drop every staged chunk for `key`.
    pub(super) async fn purge(&self, key: &FileKey) {
        match self.store.clear(key).await {
            Ok(0) => {}
            Ok(removed) => debug!(%key, removed, "purged staged chunks"),
            Err(e) => error!(%key, error = %e, "failed to purge staged chunks"),
        }
    }
}
