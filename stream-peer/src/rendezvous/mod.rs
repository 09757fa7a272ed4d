//! Rendezvous: claiming an identity and opening channels to other identities.
//!
//! A [`Rendezvous`] plays the role of the signaling service. It hands out
//! open [`Channel`]s; what carries the bytes is up to the implementation.
//!
//! - [`MemoryRendezvous`] - in-process hub, every registered identity can
//!   reach every other
//! - [`TcpRendezvous`] - listen address plus a static directory of
//!   identity to socket address

mod memory;
mod tcp;

pub use memory::MemoryRendezvous;
pub use tcp::{Handshake, TcpRendezvous};

use std::sync::Arc;

use async_trait::async_trait;
use stream_types::PeerId;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::channel::{Channel, ChannelError};

/// Inbound channels for a registered identity.
pub type Incoming = mpsc::Receiver<Arc<dyn Channel>>;

/// Depth of the inbound channel queue per identity.
pub(crate) const INCOMING_BACKLOG: usize = 16;

/// Rendezvous errors.
#[derive(Debug, Error)]
pub enum RendezvousError {
    /// Another endpoint already holds this identity.
    #[error("identity already taken: {0}")]
    IdTaken(PeerId),

    /// Nobody is registered under this identity.
    #[error("unknown peer: {0}")]
    UnknownPeer(PeerId),

    /// The rendezvous service cannot be reached or refused the request.
    #[error("rendezvous unavailable: {0}")]
    Unavailable(String),

    /// Socket I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The channel failed during the identity handshake.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Signaling abstraction.
#[async_trait]
pub trait Rendezvous: Send + Sync {
    /// Claim `local` and start receiving inbound channels for it.
    async fn register(&self, local: &PeerId) -> Result<Incoming, RendezvousError>;

    /// Open a channel from `local` to `remote`.
    ///
    /// Resolves once the channel is open. Callers impose their own timeout.
    async fn open_channel(
        &self,
        local: &PeerId,
        remote: &PeerId,
    ) -> Result<Arc<dyn Channel>, RendezvousError>;

    /// Release `local`. Inbound channels stop arriving.
    async fn unregister(&self, local: &PeerId);
}
