//! Sender and receiver transfer state machines.
//!
//! These mirror the wire protocol one channel at a time. The receiver turns
//! inbound `meta` / `chunk` / `cancel` into staging, progress, and completion
//! actions; the sender walks a file through `meta`, one slice in flight, and
//! completion. Neither touches the store, the channel, or the clock: the
//! caller passes the current `Instant` in and executes the returned actions
//! in order.

use std::time::{Duration, Instant};

use stream_types::FileKey;

use crate::throughput::{percent, ThroughputMeter, DEFAULT_WINDOW};

/// Default slice size for outgoing chunks (256 KiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 256 * 1024;

/// Names longer than this are shortened in status messages.
const DISPLAY_NAME_LIMIT: usize = 20;

/// Tunables shared by both directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPolicy {
    /// Bytes per outgoing chunk.
    pub chunk_size: u64,
    /// Sampling window for the throughput figure.
    pub throughput_window: Duration,
}

impl Default for TransferPolicy {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            throughput_window: DEFAULT_WINDOW,
        }
    }
}

/// User-facing transfer status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    /// Outgoing file started.
    Sending {
        /// Shortened display name
        name: String,
    },
    /// Incoming file announced.
    Receiving {
        /// Shortened display name
        name: String,
    },
    /// Incoming file reassembled.
    DownloadComplete,
    /// Outgoing file fully handed to the channel.
    FileSent,
    /// Cancelled from this side.
    Cancelled,
    /// Cancelled by the remote side.
    CancelledByPeer,
    /// Local failure (store, read, or channel).
    Failed(String),
    /// Remote side reported an error.
    PeerError(String),
}

impl TransferStatus {
    /// User-facing wording.
    pub fn message(&self) -> String {
        match self {
            Self::Sending { name } => format!("Sending {name}"),
            Self::Receiving { name } => format!("Receiving {name}"),
            Self::DownloadComplete => "Download Complete".to_string(),
            Self::FileSent => "File Sent!".to_string(),
            Self::Cancelled => "Transfer Cancelled".to_string(),
            Self::CancelledByPeer => "Transfer Cancelled by Peer".to_string(),
            Self::Failed(reason) => format!("Error: {reason}"),
            Self::PeerError(message) => format!("Error: {message}"),
        }
    }
}

/// Shorten long file names for status lines: first 10 characters, `...`,
/// then the extension.
pub fn display_name(name: &str) -> String {
    if name.chars().count() <= DISPLAY_NAME_LIMIT {
        return name.to_string();
    }
    let head: String = name.chars().take(10).collect();
    let ext = name.rfind('.').map(|i| &name[i..]).unwrap_or("");
    format!("{head}...{ext}")
}

/// Progress report for either direction.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// Whole percent, `0..=100`
    pub percent: u8,
    /// MB/s formatted for display
    pub throughput_mbps: String,
}

impl Progress {
    /// Zeroed progress, reported after a cancel.
    pub fn reset() -> Self {
        Self {
            percent: 0,
            throughput_mbps: "0.00".to_string(),
        }
    }
}

// ============================================================================
// Receiver
// ============================================================================

/// An incoming file being staged.
#[derive(Debug, Clone)]
pub struct ReceiveSession {
    /// Staging key derived from `name`
    pub key: FileKey,
    /// Name as announced by the sender
    pub name: String,
    /// Declared size in bytes
    pub size: u64,
    /// Declared MIME type
    pub mime: String,
    /// Bytes staged so far
    pub received: u64,
    meter: ThroughputMeter,
}

/// A file whose last byte has been staged, ready to reassemble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedFile {
    /// Staging key
    pub key: FileKey,
    /// Name as announced by the sender
    pub name: String,
    /// Declared MIME type
    pub mime: String,
    /// Declared size in bytes
    pub size: u64,
}

/// Receiving side of one channel.
#[derive(Debug, Clone, Default)]
pub enum ReceiveState {
    /// No transfer in progress; stray chunks are ignored.
    #[default]
    Idle,
    /// A `meta` was accepted and chunks are being staged.
    Receiving(ReceiveSession),
}

/// Inbound transfer traffic, plus store failures fed back by the caller.
#[derive(Debug, Clone)]
pub enum ReceiveEvent {
    /// `meta` frame.
    Meta {
        /// Original name
        name: String,
        /// Declared size
        size: u64,
        /// Declared MIME type
        mime: String,
    },
    /// `chunk` frame.
    Chunk {
        /// Offset within the file
        offset: u64,
        /// Payload
        data: Vec<u8>,
        /// Arrival time
        at: Instant,
    },
    /// `cancel` frame.
    Cancel,
    /// A `Stage` action failed; the transfer for `key` is abandoned.
    StoreFailed {
        /// Key whose staging failed
        key: FileKey,
        /// Failure description
        error: String,
    },
}

/// Instructions for the transfer engine, executed in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiveAction {
    /// Delete every staged chunk for the key.
    Purge(FileKey),
    /// Write one chunk to the store.
    Stage {
        /// Staging key
        key: FileKey,
        /// Offset within the file
        offset: u64,
        /// Payload
        data: Vec<u8>,
    },
    /// Report progress.
    Progress(Progress),
    /// Reassemble and hand off the finished file.
    Complete(CompletedFile),
    /// Stop this endpoint's own outgoing transfer on the same channel.
    AbortOutgoing,
    /// Tell the peer the transfer failed and stop its producer.
    AbortPeer(String),
    /// Surface a status change.
    Status(TransferStatus),
}

impl ReceiveState {
    /// Process an event and return the new state plus actions to execute.
    pub fn on_event(
        self,
        event: ReceiveEvent,
        policy: &TransferPolicy,
    ) -> (Self, Vec<ReceiveAction>) {
        match (self, event) {
            (prior, ReceiveEvent::Meta { name, size, mime }) => {
                let key = FileKey::from_name(&name);
                let mut actions = Vec::new();

                // fresh start: whatever was staged before is discarded
                if let Self::Receiving(old) = prior {
                    if old.key != key {
                        actions.push(ReceiveAction::Purge(old.key));
                    }
                }
                actions.push(ReceiveAction::Purge(key.clone()));
                actions.push(ReceiveAction::Status(TransferStatus::Receiving {
                    name: display_name(&name),
                }));
                actions.push(ReceiveAction::Progress(Progress::reset()));

                if size == 0 {
                    actions.push(ReceiveAction::Complete(CompletedFile {
                        key,
                        name,
                        mime,
                        size,
                    }));
                    return (Self::Idle, actions);
                }

                let session = ReceiveSession {
                    key,
                    name,
                    size,
                    mime,
                    received: 0,
                    meter: ThroughputMeter::new(policy.throughput_window),
                };
                (Self::Receiving(session), actions)
            }

            (Self::Idle, ReceiveEvent::Chunk { .. }) => (Self::Idle, vec![]),

            (Self::Receiving(mut session), ReceiveEvent::Chunk { offset, data, at }) => {
                let len = data.len() as u64;
                session.received += len;
                session.meter.record(len, at);

                let mut actions = vec![
                    ReceiveAction::Stage {
                        key: session.key.clone(),
                        offset,
                        data,
                    },
                    ReceiveAction::Progress(Progress {
                        percent: percent(session.received, session.size),
                        throughput_mbps: session.meter.mbps_string(),
                    }),
                ];

                if session.received >= session.size {
                    actions.push(ReceiveAction::Complete(CompletedFile {
                        key: session.key,
                        name: session.name,
                        mime: session.mime,
                        size: session.size,
                    }));
                    return (Self::Idle, actions);
                }
                (Self::Receiving(session), actions)
            }

            (prior, ReceiveEvent::Cancel) => {
                let mut actions = vec![ReceiveAction::AbortOutgoing];
                if let Self::Receiving(session) = prior {
                    actions.push(ReceiveAction::Purge(session.key));
                }
                actions.push(ReceiveAction::Progress(Progress::reset()));
                actions.push(ReceiveAction::Status(TransferStatus::CancelledByPeer));
                (Self::Idle, actions)
            }

            (_, ReceiveEvent::StoreFailed { key, error }) => (
                Self::Idle,
                vec![
                    ReceiveAction::Purge(key),
                    ReceiveAction::AbortPeer(error.clone()),
                    ReceiveAction::Progress(Progress::reset()),
                    ReceiveAction::Status(TransferStatus::Failed(error)),
                ],
            ),
        }
    }

    /// The session in progress, if any.
    pub fn session(&self) -> Option<&ReceiveSession> {
        match self {
            Self::Receiving(session) => Some(session),
            Self::Idle => None,
        }
    }

    /// Check whether no transfer is in progress.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

// ============================================================================
// Sender
// ============================================================================

/// Sending side of one channel.
#[derive(Debug, Clone, Default)]
pub enum SendState {
    /// Nothing announced yet.
    #[default]
    Idle,
    /// `meta` queued, no chunk yet.
    MetaSent {
        /// Declared size
        size: u64,
    },
    /// One slice in flight at `offset`.
    Streaming {
        /// Declared size
        size: u64,
        /// Start of the slice in flight
        offset: u64,
        /// Per-session throughput sampling
        meter: ThroughputMeter,
    },
    /// Every byte handed to the channel.
    Completed,
    /// Stopped by a cancel from either side.
    Cancelled,
    /// Stopped by a read or send failure.
    Failed,
}

/// Progress of the outgoing stream, fed by the producer task.
#[derive(Debug, Clone)]
pub enum SendEvent {
    /// Start sending a file of `size` bytes.
    Begin {
        /// Declared size
        size: u64,
    },
    /// The `meta` frame was handed to the channel.
    MetaDelivered,
    /// The reader worker delivered `len` bytes for the requested slice.
    SliceRead {
        /// Bytes read
        len: u64,
    },
    /// The chunk was handed to the channel and the buffer drained below the
    /// high-water mark.
    SliceAccepted {
        /// Bytes in the accepted chunk
        len: u64,
        /// Time of acceptance
        at: Instant,
    },
    /// Local or remote cancel.
    Cancel,
    /// Read or send failure.
    Failed {
        /// Failure description
        error: String,
    },
}

/// Instructions for the producer task, executed in order.
#[derive(Debug, Clone, PartialEq)]
pub enum SendAction {
    /// Send the `meta` frame.
    SendMeta,
    /// Ask the reader worker for the next slice.
    RequestSlice {
        /// Start of the slice
        offset: u64,
        /// Bytes wanted
        len: u64,
    },
    /// Send the slice just read as a `chunk` at `offset`, then wait for drain.
    SendChunk {
        /// Start of the slice
        offset: u64,
    },
    /// Report progress.
    Progress(Progress),
    /// Stop the reader worker.
    AbortReader,
    /// Surface a status change.
    Status(TransferStatus),
}

impl SendState {
    /// Process an event and return the new state plus actions to execute.
    pub fn on_event(self, event: SendEvent, policy: &TransferPolicy) -> (Self, Vec<SendAction>) {
        match (self, event) {
            // From Idle
            (Self::Idle, SendEvent::Begin { size }) => {
                (Self::MetaSent { size }, vec![SendAction::SendMeta])
            }

            // From MetaSent
            (Self::MetaSent { size: 0 }, SendEvent::MetaDelivered) => (
                Self::Completed,
                vec![
                    SendAction::AbortReader,
                    SendAction::Status(TransferStatus::FileSent),
                ],
            ),
            (Self::MetaSent { size }, SendEvent::MetaDelivered) => (
                Self::Streaming {
                    size,
                    offset: 0,
                    meter: ThroughputMeter::new(policy.throughput_window),
                },
                vec![SendAction::RequestSlice {
                    offset: 0,
                    len: policy.chunk_size.min(size),
                }],
            ),

            // From Streaming
            (Self::Streaming { size, offset, .. }, SendEvent::SliceRead { len: 0 }) => (
                Self::Failed,
                vec![
                    SendAction::AbortReader,
                    SendAction::Status(TransferStatus::Failed(format!(
                        "source ended at {offset} of {size} bytes"
                    ))),
                ],
            ),
            (
                Self::Streaming {
                    size,
                    offset,
                    meter,
                },
                SendEvent::SliceRead { .. },
            ) => (
                Self::Streaming {
                    size,
                    offset,
                    meter,
                },
                vec![SendAction::SendChunk { offset }],
            ),
            (
                Self::Streaming {
                    size,
                    offset,
                    mut meter,
                },
                SendEvent::SliceAccepted { len, at },
            ) => {
                let offset = offset + len;
                meter.record(len, at);
                let mut actions = vec![SendAction::Progress(Progress {
                    percent: percent(offset, size),
                    throughput_mbps: meter.mbps_string(),
                })];

                if offset >= size {
                    actions.push(SendAction::AbortReader);
                    actions.push(SendAction::Status(TransferStatus::FileSent));
                    return (Self::Completed, actions);
                }

                actions.push(SendAction::RequestSlice {
                    offset,
                    len: policy.chunk_size.min(size - offset),
                });
                (Self::Streaming { size, offset, meter }, actions)
            }

            // Cancel and failure from any live state
            (
                Self::Idle | Self::MetaSent { .. } | Self::Streaming { .. },
                SendEvent::Cancel,
            ) => (
                Self::Cancelled,
                vec![
                    SendAction::AbortReader,
                    SendAction::Progress(Progress::reset()),
                ],
            ),
            (
                Self::Idle | Self::MetaSent { .. } | Self::Streaming { .. },
                SendEvent::Failed { error },
            ) => (
                Self::Failed,
                vec![
                    SendAction::AbortReader,
                    SendAction::Status(TransferStatus::Failed(error)),
                ],
            ),

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Check whether the stream has stopped for any reason.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHUNK: u64 = DEFAULT_CHUNK_SIZE;

    fn policy() -> TransferPolicy {
        TransferPolicy::default()
    }

    fn meta(name: &str, size: u64) -> ReceiveEvent {
        ReceiveEvent::Meta {
            name: name.into(),
            size,
            mime: "application/octet-stream".into(),
        }
    }

    fn chunk(offset: u64, len: usize) -> ReceiveEvent {
        ReceiveEvent::Chunk {
            offset,
            data: vec![7u8; len],
            at: Instant::now(),
        }
    }

    fn staged_offsets(actions: &[ReceiveAction]) -> Vec<u64> {
        actions
            .iter()
            .filter_map(|a| match a {
                ReceiveAction::Stage { offset, .. } => Some(*offset),
                _ => None,
            })
            .collect()
    }

    // ========================================================================
    // Receiver
    // ========================================================================

    #[test]
    fn meta_purges_key_and_starts_receiving() {
        let (state, actions) = ReceiveState::Idle.on_event(meta("a.bin", 600_000), &policy());

        let session = state.session().unwrap();
        assert_eq!(session.key, FileKey::from_name("a.bin"));
        assert_eq!(session.received, 0);
        assert_eq!(actions[0], ReceiveAction::Purge(FileKey::from_name("a.bin")));
        assert!(actions.contains(&ReceiveAction::Status(TransferStatus::Receiving {
            name: "a.bin".into()
        })));
    }

    #[test]
    fn three_chunk_file_completes_on_last_chunk() {
        let (state, _) = ReceiveState::Idle.on_event(meta("a.bin", 600_000), &policy());
        let (state, a1) = state.on_event(chunk(0, CHUNK as usize), &policy());
        let (state, a2) = state.on_event(chunk(CHUNK, CHUNK as usize), &policy());
        assert!(!state.is_idle());
        let (state, a3) = state.on_event(chunk(2 * CHUNK, 75_712), &policy());

        assert!(state.is_idle());
        assert_eq!(staged_offsets(&a1), vec![0]);
        assert_eq!(staged_offsets(&a2), vec![CHUNK]);
        assert_eq!(staged_offsets(&a3), vec![2 * CHUNK]);
        assert!(a3.contains(&ReceiveAction::Complete(CompletedFile {
            key: FileKey::from_name("a.bin"),
            name: "a.bin".into(),
            mime: "application/octet-stream".into(),
            size: 600_000,
        })));
    }

    #[test]
    fn progress_tracks_received_bytes() {
        let (state, _) = ReceiveState::Idle.on_event(meta("a.bin", 600_000), &policy());
        let (_, actions) = state.on_event(chunk(0, CHUNK as usize), &policy());

        let pct = actions.iter().find_map(|a| match a {
            ReceiveAction::Progress(p) => Some(p.percent),
            _ => None,
        });
        assert_eq!(pct, Some(44));
    }

    #[test]
    fn chunk_without_session_is_ignored() {
        let (state, actions) = ReceiveState::Idle.on_event(chunk(0, 10), &policy());
        assert!(state.is_idle());
        assert!(actions.is_empty());
    }

    #[test]
    fn zero_size_meta_completes_immediately() {
        let (state, actions) = ReceiveState::Idle.on_event(meta("empty.txt", 0), &policy());

        assert!(state.is_idle());
        assert!(matches!(
            actions.last(),
            Some(ReceiveAction::Complete(CompletedFile { size: 0, .. }))
        ));
    }

    #[test]
    fn second_meta_discards_prior_session() {
        let (state, _) = ReceiveState::Idle.on_event(meta("first.bin", 1000), &policy());
        let (state, _) = state.on_event(chunk(0, 500), &policy());
        let (state, actions) = state.on_event(meta("second.bin", 2000), &policy());

        assert_eq!(state.session().unwrap().key, FileKey::from_name("second.bin"));
        assert_eq!(state.session().unwrap().received, 0);
        assert!(actions.contains(&ReceiveAction::Purge(FileKey::from_name("first.bin"))));
        assert!(actions.contains(&ReceiveAction::Purge(FileKey::from_name("second.bin"))));
    }

    #[test]
    fn repeated_meta_for_same_name_purges_once() {
        let (state, _) = ReceiveState::Idle.on_event(meta("same.bin", 1000), &policy());
        let (state, _) = state.on_event(chunk(0, 500), &policy());
        let (state, actions) = state.on_event(meta("same.bin", 1000), &policy());

        let purges = actions
            .iter()
            .filter(|a| matches!(a, ReceiveAction::Purge(_)))
            .count();
        assert_eq!(purges, 1);
        assert_eq!(state.session().unwrap().received, 0);
    }

    #[test]
    fn cancel_purges_and_aborts_outgoing() {
        let (state, _) = ReceiveState::Idle.on_event(meta("a.bin", 1000), &policy());
        let (state, _) = state.on_event(chunk(0, 500), &policy());
        let (state, actions) = state.on_event(ReceiveEvent::Cancel, &policy());

        assert!(state.is_idle());
        assert_eq!(
            actions,
            vec![
                ReceiveAction::AbortOutgoing,
                ReceiveAction::Purge(FileKey::from_name("a.bin")),
                ReceiveAction::Progress(Progress::reset()),
                ReceiveAction::Status(TransferStatus::CancelledByPeer),
            ]
        );
    }

    #[test]
    fn chunks_after_cancel_are_ignored() {
        let (state, _) = ReceiveState::Idle.on_event(meta("a.bin", 1000), &policy());
        let (state, _) = state.on_event(ReceiveEvent::Cancel, &policy());
        let (_, actions) = state.on_event(chunk(0, 500), &policy());
        assert!(staged_offsets(&actions).is_empty());
    }

    #[test]
    fn store_failure_purges_and_reports() {
        let (state, _) = ReceiveState::Idle.on_event(meta("a.bin", 1000), &policy());
        let (state, actions) = state.on_event(
            ReceiveEvent::StoreFailed {
                key: FileKey::from_name("a.bin"),
                error: "storage quota exceeded".into(),
            },
            &policy(),
        );

        assert!(state.is_idle());
        assert_eq!(
            actions,
            vec![
                ReceiveAction::Purge(FileKey::from_name("a.bin")),
                ReceiveAction::AbortPeer("storage quota exceeded".into()),
                ReceiveAction::Progress(Progress::reset()),
                ReceiveAction::Status(TransferStatus::Failed("storage quota exceeded".into())),
            ]
        );

        // chunks still in flight from the stopped sender are dropped
        let (state, actions) = state.on_event(chunk(0, 10), &policy());
        assert!(state.is_idle());
        assert!(actions.is_empty());
    }

    // ========================================================================
    // Sender
    // ========================================================================

    fn drive_send(size: u64) -> Vec<SendAction> {
        let policy = policy();
        let mut log = Vec::new();
        let (mut state, actions) = SendState::Idle.on_event(SendEvent::Begin { size }, &policy);
        log.extend(actions);

        let (next, actions) = state.on_event(SendEvent::MetaDelivered, &policy);
        state = next;
        let mut pending = actions;

        loop {
            log.extend(pending.iter().cloned());
            let Some(SendAction::RequestSlice { len, .. }) = pending
                .iter()
                .find(|a| matches!(a, SendAction::RequestSlice { .. }))
                .cloned()
            else {
                break;
            };
            let (next, actions) = state.on_event(SendEvent::SliceRead { len }, &policy);
            log.extend(actions);
            let (next, actions) = next.on_event(
                SendEvent::SliceAccepted {
                    len,
                    at: Instant::now(),
                },
                &policy,
            );
            state = next;
            pending = actions;
        }

        assert!(state.is_terminal());
        log
    }

    #[test]
    fn sender_slices_600000_bytes_into_three_chunks() {
        let log = drive_send(600_000);

        let chunks: Vec<u64> = log
            .iter()
            .filter_map(|a| match a {
                SendAction::SendChunk { offset } => Some(*offset),
                _ => None,
            })
            .collect();
        assert_eq!(chunks, vec![0, CHUNK, 2 * CHUNK]);

        let requests: Vec<(u64, u64)> = log
            .iter()
            .filter_map(|a| match a {
                SendAction::RequestSlice { offset, len } => Some((*offset, *len)),
                _ => None,
            })
            .collect();
        assert_eq!(requests, vec![(0, CHUNK), (CHUNK, CHUNK), (2 * CHUNK, 75_712)]);
        assert_eq!(log.first(), Some(&SendAction::SendMeta));
        assert!(log.contains(&SendAction::Status(TransferStatus::FileSent)));
    }

    #[test]
    fn empty_source_sends_meta_only() {
        let log = drive_send(0);
        assert_eq!(log[0], SendAction::SendMeta);
        assert!(!log.iter().any(|a| matches!(a, SendAction::SendChunk { .. })));
        assert!(log.contains(&SendAction::Status(TransferStatus::FileSent)));
    }

    #[test]
    fn one_slice_in_flight() {
        let policy = policy();
        let (state, _) = SendState::Idle.on_event(SendEvent::Begin { size: 600_000 }, &policy);
        let (state, _) = state.on_event(SendEvent::MetaDelivered, &policy);
        let (_, actions) = state.on_event(SendEvent::SliceRead { len: CHUNK }, &policy);

        // reading a slice never requests the next one; only acceptance does
        assert_eq!(actions, vec![SendAction::SendChunk { offset: 0 }]);
    }

    #[test]
    fn short_source_fails() {
        let policy = policy();
        let (state, _) = SendState::Idle.on_event(SendEvent::Begin { size: 100 }, &policy);
        let (state, _) = state.on_event(SendEvent::MetaDelivered, &policy);
        let (state, actions) = state.on_event(SendEvent::SliceRead { len: 0 }, &policy);

        assert!(matches!(state, SendState::Failed));
        assert!(actions.contains(&SendAction::AbortReader));
    }

    #[test]
    fn cancel_mid_stream_stops_everything() {
        let policy = policy();
        let (state, _) = SendState::Idle.on_event(SendEvent::Begin { size: 600_000 }, &policy);
        let (state, _) = state.on_event(SendEvent::MetaDelivered, &policy);
        let (state, actions) = state.on_event(SendEvent::Cancel, &policy);

        assert!(matches!(state, SendState::Cancelled));
        assert_eq!(
            actions,
            vec![SendAction::AbortReader, SendAction::Progress(Progress::reset())]
        );

        // nothing after cancel
        let (_, actions) = state.on_event(
            SendEvent::SliceAccepted {
                len: CHUNK,
                at: Instant::now(),
            },
            &policy,
        );
        assert!(actions.is_empty());
    }

    // ========================================================================
    // Status wording
    // ========================================================================

    #[test]
    fn long_names_are_shortened() {
        assert_eq!(display_name("short.txt"), "short.txt");
        assert_eq!(
            display_name("a_very_long_file_name_indeed.tar.gz"),
            "a_very_lon....gz"
        );
        assert_eq!(display_name("no_extension_but_very_long"), "no_extensi...");
        // multi-byte characters are never split
        assert_eq!(display_name("日本語日本語日本語日本語日本語日本語日本語.pdf"), "日本語日本語日本語日....pdf");
    }

    #[test]
    fn status_wording() {
        assert_eq!(
            TransferStatus::Sending { name: "a.bin".into() }.message(),
            "Sending a.bin"
        );
        assert_eq!(
            TransferStatus::Receiving { name: "a.bin".into() }.message(),
            "Receiving a.bin"
        );
        assert_eq!(TransferStatus::DownloadComplete.message(), "Download Complete");
        assert_eq!(TransferStatus::FileSent.message(), "File Sent!");
        assert_eq!(TransferStatus::Cancelled.message(), "Transfer Cancelled");
        assert_eq!(
            TransferStatus::CancelledByPeer.message(),
            "Transfer Cancelled by Peer"
        );
        assert_eq!(
            TransferStatus::PeerError("Room Full".into()).message(),
            "Error: Room Full"
        );
    }
}
