//! Protocol messages for FlashStream.
//!
//! Every frame on a channel carries exactly one [`Message`]. Frames are
//! MessagePack maps with an internal `type` tag, so a `meta` frame decodes as
//! `{ "type": "meta", "name": ..., "size": ..., "mime": ... }`.

use serde::{Deserialize, Serialize};

use crate::WireError;

/// All possible protocol messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    /// Announces a file about to be streamed
    Meta(Meta),
    /// One slice of the announced file
    Chunk(Chunk),
    /// Abort the transfer in progress on this channel
    Cancel(Cancel),
    /// Human-readable failure reported by the remote side
    Error(ErrorNotice),
    /// Liveness check
    Ping(Ping),
    /// Liveness reply
    Pong(Pong),
    /// Full replacement of the shared text buffer
    Text(Text),
}

impl Message {
    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        rmp_serde::to_vec_named(self).map_err(WireError::Encode)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        rmp_serde::from_slice(bytes).map_err(WireError::Decode)
    }

    /// Wire tag of this message, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Meta(_) => "meta",
            Message::Chunk(_) => "chunk",
            Message::Cancel(_) => "cancel",
            Message::Error(_) => "error",
            Message::Ping(_) => "ping",
            Message::Pong(_) => "pong",
            Message::Text(_) => "text",
        }
    }

    /// Shorthand for a `meta` message.
    pub fn meta(name: impl Into<String>, size: u64, mime: impl Into<String>) -> Self {
        Message::Meta(Meta {
            name: name.into(),
            size,
            mime: mime.into(),
        })
    }

    /// Shorthand for a `chunk` message.
    pub fn chunk(offset: u64, data: Vec<u8>) -> Self {
        Message::Chunk(Chunk { offset, data })
    }

    /// Shorthand for an `error` message.
    pub fn error(message: impl Into<String>) -> Self {
        Message::Error(ErrorNotice {
            message: message.into(),
        })
    }

    /// Shorthand for a `text` message.
    pub fn text(text: impl Into<String>) -> Self {
        Message::Text(Text { text: text.into() })
    }
}

/// File announcement sent once before any chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// Original file name, unsanitized
    pub name: String,
    /// Declared size in bytes
    pub size: u64,
    /// MIME type ("application/octet-stream" when unknown)
    pub mime: String,
}

/// One contiguous slice of file content.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Byte offset of `data` within the file
    pub offset: u64,
    /// Raw bytes, encoded as MessagePack bin
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

impl Chunk {
    /// Exclusive end offset of this slice.
    pub fn end(&self) -> u64 {
        self.offset + self.data.len() as u64
    }
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk")
            .field("offset", &self.offset)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Cancel the transfer on this channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancel {}

/// Error report from the remote side (e.g. "Room Full").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorNotice {
    /// Message shown to the user
    pub message: String,
}

/// Heartbeat request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {}

/// Heartbeat reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {}

/// Complete shared text; the receiver replaces its buffer with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Text {
    /// New buffer contents
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_roundtrip() {
        let msg = Message::meta("report.pdf", 600_000, "application/pdf");

        let bytes = msg.to_bytes().unwrap();
        let restored = Message::from_bytes(&bytes).unwrap();

        assert_eq!(msg, restored);
    }

    #[test]
    fn chunk_payload_survives_and_stays_compact() {
        let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let msg = Message::chunk(262_144, data.clone());

        let bytes = msg.to_bytes().unwrap();
        // bin encoding: payload plus a small header, not one marker per byte
        assert!(bytes.len() < data.len() + 64);

        match Message::from_bytes(&bytes).unwrap() {
            Message::Chunk(chunk) => {
                assert_eq!(chunk.offset, 262_144);
                assert_eq!(chunk.data, data);
                assert_eq!(chunk.end(), 262_144 + 4096);
            }
            other => panic!("expected chunk, got {other:?}"),
        }
    }

    #[test]
    fn empty_body_messages_roundtrip() {
        for msg in [
            Message::Cancel(Cancel {}),
            Message::Ping(Ping {}),
            Message::Pong(Pong {}),
        ] {
            let bytes = msg.to_bytes().unwrap();
            assert_eq!(Message::from_bytes(&bytes).unwrap(), msg);
        }
    }

    #[test]
    fn error_and_text_roundtrip() {
        let err = Message::error("Room Full");
        assert_eq!(Message::from_bytes(&err.to_bytes().unwrap()).unwrap(), err);

        let text = Message::text("héllo 🚀");
        assert_eq!(
            Message::from_bytes(&text.to_bytes().unwrap()).unwrap(),
            text
        );
    }

    #[test]
    fn type_tag_is_lowercase() {
        let json = serde_json::to_value(Message::meta("a.txt", 3, "text/plain")).unwrap();
        assert_eq!(json["type"], "meta");
        assert_eq!(json["name"], "a.txt");
        assert_eq!(json["size"], 3);

        let json = serde_json::to_value(Message::Ping(Ping {})).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "ping" }));
    }

    #[test]
    fn kind_matches_wire_tag() {
        let msg = Message::text("x");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], msg.kind());
    }

    #[test]
    fn garbage_fails_to_decode() {
        assert!(matches!(
            Message::from_bytes(&[0xc1, 0x00, 0xff]),
            Err(WireError::Decode(_))
        ));
    }

    #[test]
    fn unknown_type_fails_to_decode() {
        #[derive(Serialize)]
        struct Bogus {
            #[serde(rename = "type")]
            kind: &'static str,
        }
        let bytes = rmp_serde::to_vec_named(&Bogus { kind: "teleport" }).unwrap();
        assert!(Message::from_bytes(&bytes).is_err());
    }

    #[test]
    fn chunk_debug_omits_payload() {
        let chunk = Chunk {
            offset: 0,
            data: vec![0xAB; 32],
        };
        let debug = format!("{chunk:?}");
        assert!(debug.contains("len: 32"));
        assert!(!debug.contains("171"));
    }
}
