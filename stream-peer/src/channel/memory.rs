//! In-process channel pair.

use std::sync::Arc;

use async_trait::async_trait;
use stream_types::PeerId;
use tokio::sync::{mpsc, watch, Mutex};

use super::{BufferGauge, Channel, ChannelError, MAX_FRAME_SIZE};

/// One end of an in-process channel pair.
///
/// Frames sent on one end count toward its `buffered_amount` until the other
/// end receives them. Closing either end closes both; frames already queued
/// are still delivered before `recv` reports `Closed`. Dropping an end
/// closes the pair.
pub struct MemoryChannel {
    remote: PeerId,
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    outbound: Arc<BufferGauge>,
    inbound: Arc<BufferGauge>,
    closed: Arc<watch::Sender<bool>>,
    closed_rx: watch::Receiver<bool>,
}

impl MemoryChannel {
    /// Create a connected pair.
    ///
    /// The first end talks to `b` and the second end talks to `a`.
    pub fn pair(a: PeerId, b: PeerId) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        let a_gauge = Arc::new(BufferGauge::default());
        let b_gauge = Arc::new(BufferGauge::default());
        let (closed, closed_rx) = watch::channel(false);
        let closed = Arc::new(closed);

        let end_a = Self {
            remote: b,
            tx: a_tx,
            rx: Mutex::new(a_rx),
            outbound: a_gauge.clone(),
            inbound: b_gauge.clone(),
            closed: closed.clone(),
            closed_rx: closed_rx.clone(),
        };
        let end_b = Self {
            remote: a,
            tx: b_tx,
            rx: Mutex::new(b_rx),
            outbound: b_gauge,
            inbound: a_gauge,
            closed,
            closed_rx,
        };
        (end_a, end_b)
    }

    fn mark_closed(&self) {
        self.closed.send_replace(true);
        self.outbound.wake_all();
        self.inbound.wake_all();
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    fn remote_id(&self) -> &PeerId {
        &self.remote
    }

    async fn send(&self, frame: &[u8]) -> Result<(), ChannelError> {
        if !self.is_open() {
            return Err(ChannelError::Closed);
        }
        if frame.len() > MAX_FRAME_SIZE {
            return Err(ChannelError::FrameTooLarge {
                size: frame.len(),
                max: MAX_FRAME_SIZE,
            });
        }

        self.outbound.add(frame.len());
        self.tx.send(frame.to_vec()).map_err(|_| {
            self.outbound.sub(frame.len());
            ChannelError::Closed
        })
    }

    async fn recv(&self) -> Result<Vec<u8>, ChannelError> {
        let mut rx = self.rx.lock().await;
        let mut closed = self.closed_rx.clone();

        tokio::select! {
            biased;

            frame = rx.recv() => match frame {
                Some(frame) => {
                    self.inbound.sub(frame.len());
                    Ok(frame)
                }
                None => Err(ChannelError::Closed),
            },
            _ = closed.wait_for(|c| *c) => {
                // drain whatever was queued before the close
                match rx.try_recv() {
                    Ok(frame) => {
                        self.inbound.sub(frame.len());
                        Ok(frame)
                    }
                    Err(_) => Err(ChannelError::Closed),
                }
            }
        }
    }

    fn buffered_amount(&self) -> usize {
        self.outbound.get()
    }

    async fn wait_buffered_below(&self, threshold: usize) -> Result<(), ChannelError> {
        self.outbound.wait_below(threshold, &self.closed_rx).await
    }

    fn is_open(&self) -> bool {
        !*self.closed_rx.borrow()
    }

    async fn close(&self) {
        self.mark_closed();
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        self.mark_closed();
    }
}

impl std::fmt::Debug for MemoryChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryChannel")
            .field("remote", &self.remote)
            .field("open", &self.is_open())
            .field("buffered", &self.outbound.get())
            .finish()
    }
}
