//! # flashstream-peer
//!
//! Peer-to-peer session engine for FlashStream.
//!
//! Peers find each other through a rendezvous service by short identity,
//! open ordered message channels, and run one of two sessions over them:
//! chunked file transfer or shared text broadcast.
//!
//! ## Features
//!
//! - **Connection Pool**: bounded admission, duplicate rejection, heartbeat liveness
//! - **Chunked Transfer**: backpressured sending, staged receiving, verified reassembly
//! - **Broadcast**: last-writer-wins text shared by a host, client, or two equal peers
//! - **Pure State Machines**: uses stream-core for side-effect-free logic
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use stream_peer::{ConnectionManager, EventSender, MemoryRendezvous, TransferEngine};
//!
//! let (events, mut rx) = EventSender::channel();
//! let engine = TransferEngine::new(store, events.clone(), &config.transfer);
//! let manager = ConnectionManager::new(
//!     Arc::new(MemoryRendezvous::new()),
//!     Arc::new(engine.clone()),
//!     events,
//!     config.connection,
//! );
//!
//! manager.register(None).await?;
//! let peer = manager.connect("ABC123").await?;
//! engine.send_file(&peer, OutgoingFile::from_path(path).await?)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod broadcast;
pub mod channel;
pub mod config;
pub mod error;
pub mod events;
pub mod eviction;
pub mod manager;
pub mod rendezvous;
pub mod transfer;

pub use broadcast::{BroadcastMode, BroadcastSession};
pub use channel::{Channel, ChannelError, MemoryChannel, MockChannel, TcpChannel, MAX_FRAME_SIZE};
pub use config::{
    Config, ConfigError, ConnectionConfig, EvictionConfig, RendezvousConfig, StoreConfig,
    TransferConfig,
};
pub use error::{BroadcastError, ConnectionError, ConnectionResult, TransferError, TransferResult};
pub use events::{Event, EventSender, ReceivedFile, StatusKind};
pub use eviction::spawn_eviction_task;
pub use manager::{ConnectionManager, PeerHandle, SessionHandler, ROOM_FULL};
pub use rendezvous::{Incoming, MemoryRendezvous, Rendezvous, RendezvousError, TcpRendezvous};
pub use transfer::{detect_mime_type, OutgoingFile, TransferEngine};
