//! Error types for the FlashStream wire format.

use thiserror::Error;

/// Errors produced while encoding or decoding wire data.
#[derive(Debug, Error)]
pub enum WireError {
    /// MessagePack serialization failed
    #[error("encode failed: {0}")]
    Encode(#[source] rmp_serde::encode::Error),

    /// MessagePack deserialization failed
    #[error("decode failed: {0}")]
    Decode(#[source] rmp_serde::decode::Error),

    /// Peer identity is empty, too long, or contains unsupported characters
    #[error("invalid peer id: {0:?}")]
    InvalidPeerId(String),
}
