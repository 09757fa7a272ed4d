//! Events reported to the presentation layer.
//!
//! One process has one subscriber: the receiving half of
//! [`EventSender::channel`]. Emitting never blocks and never fails; events
//! sent after the subscriber is gone are dropped.

use stream_core::{LinkStatus, Progress, TransferStatus};
use stream_store::Blob;
use stream_types::PeerId;
use tokio::sync::mpsc;

/// Kind of a status event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    /// A peer link opened.
    Connected,
    /// A peer link closed.
    Disconnected,
    /// Something failed.
    Error,
    /// Neutral information, such as a cancel.
    Info,
    /// A transfer started.
    TransferStart,
    /// A transfer finished.
    TransferSuccess,
}

/// A file that arrived and passed reassembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    /// Sender identity.
    pub from: PeerId,
    /// File name as declared by the sender.
    pub name: String,
    /// Reassembled contents.
    pub blob: Blob,
}

/// Observable event.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Status line.
    Status {
        /// Kind.
        kind: StatusKind,
        /// Human-readable message.
        message: String,
    },
    /// Transfer progress, in either direction.
    Progress {
        /// 0..=100.
        percent: u8,
        /// Throughput in MB/s, two decimals.
        throughput_mbps: String,
    },
    /// A complete file was received.
    FileReceived(ReceivedFile),
    /// Shared text was replaced by a peer.
    TextChanged(String),
    /// A peer was admitted to the pool.
    PeerJoined(PeerId),
    /// A peer left the pool.
    PeerLeft(PeerId),
}

impl Event {
    /// Status event for a link transition.
    pub fn link(status: LinkStatus) -> Self {
        let kind = match status {
            LinkStatus::Connected => StatusKind::Connected,
            LinkStatus::Disconnected => StatusKind::Disconnected,
            LinkStatus::TimedOut => StatusKind::Error,
        };
        Self::Status {
            kind,
            message: status.message().to_string(),
        }
    }

    /// Status event for a transfer transition.
    pub fn transfer(status: &TransferStatus) -> Self {
        let kind = match status {
            TransferStatus::Sending { .. } | TransferStatus::Receiving { .. } => {
                StatusKind::TransferStart
            }
            TransferStatus::DownloadComplete | TransferStatus::FileSent => {
                StatusKind::TransferSuccess
            }
            TransferStatus::Cancelled | TransferStatus::CancelledByPeer => StatusKind::Info,
            TransferStatus::Failed(_) | TransferStatus::PeerError(_) => StatusKind::Error,
        };
        Self::Status {
            kind,
            message: status.message(),
        }
    }
}

impl From<Progress> for Event {
    fn from(progress: Progress) -> Self {
        Self::Progress {
            percent: progress.percent,
            throughput_mbps: progress.throughput_mbps,
        }
    }
}

/// Cloneable handle for emitting events.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Option<mpsc::UnboundedSender<Event>>,
}

impl EventSender {
    /// Create a sender and its single subscriber.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sender that drops everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Emit one event.
    pub fn emit(&self, event: Event) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    /// Emit a status event.
    pub fn status(&self, kind: StatusKind, message: impl Into<String>) {
        self.emit(Event::Status {
            kind,
            message: message.into(),
        });
    }

    /// Emit a progress event.
    pub fn progress(&self, progress: Progress) {
        self.emit(progress.into());
    }
}
