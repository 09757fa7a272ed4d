//! # stream-types
//!
//! Wire format types for the FlashStream peer-to-peer transfer protocol.
//!
//! - [`PeerId`], [`FileKey`] - Rendezvous identity and staging key
//! - [`Message`] - Protocol messages (meta, chunk, cancel, error, ping, pong, text)
//! - [`WireError`] - Encode/decode failures

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod messages;

pub use error::WireError;
pub use ids::{FileKey, PeerId, GENERATED_PEER_ID_LEN, MAX_PEER_ID_LEN};
pub use messages::{Cancel, Chunk, ErrorNotice, Message, Meta, Ping, Pong, Text};
