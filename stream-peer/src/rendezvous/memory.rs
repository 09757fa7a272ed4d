//! In-process rendezvous hub.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;
use stream_types::PeerId;
use tokio::sync::mpsc;
use tracing::debug;

use super::{Incoming, Rendezvous, RendezvousError, INCOMING_BACKLOG};
use crate::channel::{Channel, MemoryChannel};

/// In-process rendezvous hub.
///
/// Clones share the same directory, so several managers in one process can
/// reach each other through it.
#[derive(Clone, Default)]
pub struct MemoryRendezvous {
    endpoints: Arc<DashMap<PeerId, mpsc::Sender<Arc<dyn Channel>>>>,
    unresponsive: Arc<Mutex<HashSet<PeerId>>>,
}

impl MemoryRendezvous {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `open_channel` toward `id` hang forever.
    ///
    /// Simulates a peer whose transport never completes negotiation.
    pub fn add_unresponsive(&self, id: PeerId) {
        self.unresponsive.lock().unwrap().insert(id);
    }

    /// Number of registered identities.
    pub fn registered(&self) -> usize {
        self.endpoints.len()
    }
}

#[async_trait]
impl Rendezvous for MemoryRendezvous {
    async fn register(&self, local: &PeerId) -> Result<Incoming, RendezvousError> {
        let (tx, rx) = mpsc::channel(INCOMING_BACKLOG);
        match self.endpoints.entry(local.clone()) {
            dashmap::mapref::entry::Entry::Occupied(entry) if !entry.get().is_closed() => {
                return Err(RendezvousError::IdTaken(local.clone()));
            }
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                entry.insert(tx);
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(tx);
            }
        }
        debug!(peer = %local, "registered with memory rendezvous");
        Ok(rx)
    }

    async fn open_channel(
        &self,
        local: &PeerId,
        remote: &PeerId,
    ) -> Result<Arc<dyn Channel>, RendezvousError> {
        let unresponsive = self.unresponsive.lock().unwrap().contains(remote);
        if unresponsive {
            std::future::pending::<()>().await;
        }

        // clone the sender so no map guard is held across the await
        let target = self
            .endpoints
            .get(remote)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RendezvousError::UnknownPeer(remote.clone()))?;

        let (ours, theirs) = MemoryChannel::pair(local.clone(), remote.clone());
        target
            .send(Arc::new(theirs))
            .await
            .map_err(|_| RendezvousError::UnknownPeer(remote.clone()))?;

        Ok(Arc::new(ours))
    }

    async fn unregister(&self, local: &PeerId) {
        self.endpoints.remove(local);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn id(s: &str) -> PeerId {
        PeerId::parse(s).unwrap()
    }

    #[tokio::test]
    async fn open_channel_delivers_the_other_end() {
        let hub = MemoryRendezvous::new();
        let _a_in = hub.register(&id("AAAAAA")).await.unwrap();
        let mut b_in = hub.register(&id("BBBBBB")).await.unwrap();

        let ours = hub.open_channel(&id("AAAAAA"), &id("BBBBBB")).await.unwrap();
        let theirs = b_in.recv().await.unwrap();

        assert_eq!(ours.remote_id(), &id("BBBBBB"));
        assert_eq!(theirs.remote_id(), &id("AAAAAA"));

        ours.send(b"hi").await.unwrap();
        assert_eq!(theirs.recv().await.unwrap(), b"hi");
    }

    #[tokio::test]
    async fn identity_cannot_be_claimed_twice() {
        let hub = MemoryRendezvous::new();
        let _first = hub.register(&id("AAAAAA")).await.unwrap();
        assert!(matches!(
            hub.register(&id("AAAAAA")).await,
            Err(RendezvousError::IdTaken(_))
        ));
    }

    #[tokio::test]
    async fn identity_is_reusable_after_unregister() {
        let hub = MemoryRendezvous::new();
        let _first = hub.register(&id("AAAAAA")).await.unwrap();
        hub.unregister(&id("AAAAAA")).await;
        assert_eq!(hub.registered(), 0);
        hub.register(&id("AAAAAA")).await.unwrap();
    }

    #[tokio::test]
    async fn identity_is_reusable_after_incoming_dropped() {
        let hub = MemoryRendezvous::new();
        drop(hub.register(&id("AAAAAA")).await.unwrap());
        hub.register(&id("AAAAAA")).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_peer_is_an_error() {
        let hub = MemoryRendezvous::new();
        assert!(matches!(
            hub.open_channel(&id("AAAAAA"), &id("NOBODY")).await,
            Err(RendezvousError::UnknownPeer(_))
        ));
    }

    #[tokio::test]
    async fn unresponsive_peer_never_opens() {
        let hub = MemoryRendezvous::new();
        let _b_in = hub.register(&id("BBBBBB")).await.unwrap();
        hub.add_unresponsive(id("BBBBBB"));

        let attempt = tokio::time::timeout(
            Duration::from_millis(50),
            hub.open_channel(&id("AAAAAA"), &id("BBBBBB")),
        )
        .await;
        assert!(attempt.is_err());
    }
}
