//! Outgoing side: the source file, the reader worker, and the producer.

use std::collections::VecDeque;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use stream_core::{SendAction, SendEvent, SendState, TransferPolicy};
use stream_types::Message;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::debug;

use crate::error::TransferResult;
use crate::events::{Event, EventSender};
use crate::manager::PeerHandle;

/// Fallback MIME type.
const OCTET_STREAM: &str = "application/octet-stream";

/// A file to send.
pub struct OutgoingFile {
    /// Name announced to the receiver.
    pub name: String,
    /// Exact number of bytes `source` will yield.
    pub size: u64,
    /// MIME type announced to the receiver.
    pub mime: String,
    pub(super) source: Box<dyn AsyncRead + Send + Unpin>,
}

impl OutgoingFile {
    /// Open a file on disk. The MIME type is sniffed from its contents,
    /// falling back to the extension.
    pub async fn from_path(path: &Path) -> io::Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "untitled".to_string());
        let mime = detect_mime_type(path).unwrap_or_else(|| OCTET_STREAM.to_string());

        Ok(Self {
            name,
            size,
            mime,
            source: Box::new(file),
        })
    }

    /// Send an in-memory buffer.
    pub fn from_bytes(name: impl Into<String>, mime: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            size: data.len() as u64,
            mime: mime.into(),
            source: Box::new(io::Cursor::new(data)),
        }
    }

    /// Send from any reader that yields exactly `size` bytes.
    pub fn from_reader(
        name: impl Into<String>,
        size: u64,
        mime: impl Into<String>,
        reader: impl AsyncRead + Send + Unpin + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            size,
            mime: mime.into(),
            source: Box::new(reader),
        }
    }
}

impl std::fmt::Debug for OutgoingFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutgoingFile")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("mime", &self.mime)
            .finish()
    }
}

/// Detect MIME type from magic bytes, then from the extension.
pub fn detect_mime_type(path: &Path) -> Option<String> {
    if let Some(kind) = infer::get_from_path(path).ok().flatten() {
        return Some(kind.mime_type().to_string());
    }

    let extension = path.extension()?.to_str()?.to_lowercase();
    let mime = match extension.as_str() {
        "txt" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "xml" => "application/xml",
        "json" => "application/json",
        "yaml" | "yml" => "application/x-yaml",
        "toml" => "application/toml",
        "js" => "text/javascript",
        "rs" => "text/x-rust",
        "svg" => "image/svg+xml",
        _ => return None,
    };
    Some(mime.to_string())
}

/// Serializes producer sends against an abort.
pub(super) type SendGate = Arc<tokio::sync::Mutex<()>>;

/// Handles for a running outgoing transfer.
pub(super) struct OutgoingTransfer {
    pub(super) cancel: Arc<AtomicBool>,
    pub(super) gate: SendGate,
    pub(super) state: Arc<Mutex<SendState>>,
    pub(super) producer: JoinHandle<()>,
    pub(super) reader: AbortHandle,
}

/// Serve slice requests from `source`, one at a time, in order.
///
/// A reply shorter than requested means the source ended.
pub(super) async fn read_worker(
    mut source: Box<dyn AsyncRead + Send + Unpin>,
    mut requests: mpsc::Receiver<u64>,
    replies: mpsc::Sender<io::Result<Vec<u8>>>,
) {
    while let Some(len) = requests.recv().await {
        let mut slice = Vec::with_capacity(len.min(16 * 1024 * 1024) as usize);
        let read = (&mut source).take(len).read_to_end(&mut slice).await;
        let result = read.map(|_| slice);

        let failed = result.is_err();
        if replies.send(result).await.is_err() || failed {
            break;
        }
    }
}

/// Drives one [`SendState`] to a terminal state.
pub(super) struct Producer {
    pub(super) peer: PeerHandle,
    pub(super) meta: Message,
    pub(super) size: u64,
    pub(super) events: EventSender,
    pub(super) policy: TransferPolicy,
    pub(super) high_water_mark: usize,
    pub(super) cancel: Arc<AtomicBool>,
    pub(super) gate: SendGate,
    pub(super) state: Arc<Mutex<SendState>>,
    pub(super) reader: AbortHandle,
    pub(super) requests: mpsc::Sender<u64>,
    pub(super) replies: mpsc::Receiver<io::Result<Vec<u8>>>,
}

impl Producer {
    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn apply(&self, event: SendEvent) -> Vec<SendAction> {
        let mut state = self.state.lock().unwrap();
        let (next, actions) = std::mem::take(&mut *state).on_event(event, &self.policy);
        *state = next;
        actions
    }

    pub(super) async fn run(mut self) {
        let mut queue: VecDeque<SendAction> = self.apply(SendEvent::Begin { size: self.size }).into();
        let mut slice = Vec::new();

        while let Some(action) = queue.pop_front() {
            if self.cancelled() {
                return;
            }

            let event = match action {
                SendAction::SendMeta => match self.send(&self.meta).await {
                    None => return,
                    Some(Ok(())) => Some(SendEvent::MetaDelivered),
                    Some(Err(e)) => Some(SendEvent::Failed {
                        error: e.to_string(),
                    }),
                },
                SendAction::RequestSlice { offset, len } => {
                    debug!(peer = %self.peer.id(), offset, len, "reading slice");
                    Some(match self.read_slice(len).await {
                        Ok(bytes) => {
                            let len = bytes.len() as u64;
                            slice = bytes;
                            SendEvent::SliceRead { len }
                        }
                        Err(e) => SendEvent::Failed {
                            error: e.to_string(),
                        },
                    })
                }
                SendAction::SendChunk { offset } => {
                    let data = std::mem::take(&mut slice);
                    let len = data.len() as u64;
                    match self.deliver(offset, data).await {
                        None => return,
                        Some(Ok(())) => Some(SendEvent::SliceAccepted {
                            len,
                            at: std::time::Instant::now(),
                        }),
                        Some(Err(e)) => Some(SendEvent::Failed {
                            error: e.to_string(),
                        }),
                    }
                }
                SendAction::Progress(progress) => {
                    self.events.progress(progress);
                    None
                }
                SendAction::AbortReader => {
                    self.reader.abort();
                    None
                }
                SendAction::Status(status) => {
                    self.events.emit(Event::transfer(&status));
                    None
                }
            };

            if let Some(event) = event {
                if self.cancelled() {
                    return;
                }
                queue.extend(self.apply(event));
            }
        }
        debug!(peer = %self.peer.id(), "producer finished");
    }

    async fn read_slice(&mut self, len: u64) -> io::Result<Vec<u8>> {
        let stopped = || io::Error::new(io::ErrorKind::BrokenPipe, "reader stopped");
        self.requests.send(len).await.map_err(|_| stopped())?;
        self.replies.recv().await.unwrap_or_else(|| Err(stopped()))
    }

    /// Send one message unless the transfer was cancelled first.
    ///
    /// The gate is held for the whole send, so an abort either lands before
    /// the message starts or waits until the channel has taken it.
    async fn send(&self, message: &Message) -> Option<TransferResult<()>> {
        let _gate = self.gate.lock().await;
        if self.cancelled() {
            return None;
        }
        Some(self.peer.send(message).await)
    }

    /// Hand one chunk to the channel, then wait out backpressure.
    async fn deliver(&self, offset: u64, data: Vec<u8>) -> Option<TransferResult<()>> {
        if let Err(e) = self.send(&Message::chunk(offset, data)).await? {
            return Some(Err(e));
        }
        Some(
            self.peer
                .wait_buffered_below(self.high_water_mark)
                .await
                .map_err(Into::into),
        )
    }
}
