//! Error types for the peer layer.

use stream_store::StoreError;
use stream_types::{PeerId, WireError};
use thiserror::Error;

use crate::channel::ChannelError;
use crate::rendezvous::RendezvousError;

/// Connection manager errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Tried to connect to our own identity.
    #[error("cannot connect to yourself")]
    SelfConnection,

    /// A channel to this identity is already open.
    #[error("already connected to {0}")]
    DuplicateConnection(PeerId),

    /// The channel did not open in time.
    #[error("connection to {0} timed out")]
    ConnectTimeout(PeerId),

    /// The pool is at capacity.
    #[error("room full")]
    RoomFull,

    /// Rendezvous failed.
    #[error("rendezvous error: {0}")]
    Rendezvous(#[from] RendezvousError),

    /// Channel failed.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// `register` has not been called.
    #[error("not registered")]
    NotRegistered,

    /// No open link to this identity.
    #[error("unknown peer: {0}")]
    UnknownPeer(PeerId),

    /// Identity string is not valid.
    #[error("invalid peer id: {0}")]
    InvalidPeerId(#[from] WireError),
}

/// Transfer errors.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Channel failed.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Chunk store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Reading the outgoing source failed.
    #[error("read error: {0}")]
    Read(#[from] std::io::Error),

    /// An outgoing transfer is already running on this channel.
    #[error("a transfer to {0} is already running")]
    Busy(PeerId),

    /// Encoding failed.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// No open link to this identity.
    #[error("not connected to {0}")]
    NotConnected(PeerId),
}

/// Broadcast errors.
#[derive(Debug, Error)]
pub enum BroadcastError {
    /// Clients cannot edit the shared text.
    #[error("read-only session")]
    ReadOnly,
}

/// Result type for connection operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Result type for transfer operations.
pub type TransferResult<T> = Result<T, TransferError>;
