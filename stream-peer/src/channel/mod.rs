//! Duplex channel abstraction for FlashStream.
//!
//! A [`Channel`] is a reliable, ordered, message-framed pipe to exactly one
//! remote endpoint. Implementations:
//!
//! - [`MemoryChannel`] - in-process pair, used by [`MemoryRendezvous`]
//! - [`TcpChannel`] - length-prefixed frames over a TCP stream
//! - [`MockChannel`] - scripted channel for unit tests
//!
//! Besides send/recv, a channel exposes how many bytes it has accepted but
//! not yet delivered (`buffered_amount`), which the sender uses for
//! backpressure.
//!
//! [`MemoryRendezvous`]: crate::rendezvous::MemoryRendezvous

mod memory;
mod mock;
mod tcp;

pub use memory::MemoryChannel;
pub use mock::MockChannel;
pub use tcp::TcpChannel;
pub(crate) use tcp::{read_frame, write_frame};

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use stream_types::PeerId;
use thiserror::Error;
use tokio::sync::{watch, Notify};

/// Maximum frame size accepted on the wire (16 MiB).
///
/// Comfortably above one 256 KiB chunk plus its envelope.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Channel errors.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel never opened.
    #[error("channel not open")]
    NotOpen,

    /// The channel was closed by either side.
    #[error("channel closed")]
    Closed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Frame exceeds [`MAX_FRAME_SIZE`].
    #[error("frame too large: {size} > {max}")]
    FrameTooLarge {
        /// Offending frame size.
        size: usize,
        /// Limit.
        max: usize,
    },
}

/// Message-framed duplex pipe to one remote endpoint.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Identity of the endpoint on the other side.
    fn remote_id(&self) -> &PeerId;

    /// Queue one frame for delivery.
    ///
    /// Returns once the frame is accepted; it counts toward
    /// `buffered_amount` until the transport has flushed it.
    async fn send(&self, frame: &[u8]) -> Result<(), ChannelError>;

    /// Receive the next frame.
    ///
    /// Returns `Closed` once the channel is closed and nothing is left to
    /// deliver.
    async fn recv(&self) -> Result<Vec<u8>, ChannelError>;

    /// Bytes accepted by `send` but not yet flushed.
    fn buffered_amount(&self) -> usize;

    /// Wait until `buffered_amount` drops below `threshold`.
    async fn wait_buffered_below(&self, threshold: usize) -> Result<(), ChannelError>;

    /// Check if the channel is still open.
    fn is_open(&self) -> bool;

    /// Close the channel. Idempotent.
    async fn close(&self);
}

/// Outbound byte counter with drain notification.
#[derive(Debug, Default)]
pub(crate) struct BufferGauge {
    bytes: AtomicUsize,
    drained: Notify,
}

impl BufferGauge {
    pub(crate) fn add(&self, n: usize) {
        self.bytes.fetch_add(n, Ordering::SeqCst);
    }

    pub(crate) fn sub(&self, n: usize) {
        // saturating: a racing reset must not wrap
        let _ = self
            .bytes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |b| {
                Some(b.saturating_sub(n))
            });
        self.drained.notify_waiters();
    }

    pub(crate) fn get(&self) -> usize {
        self.bytes.load(Ordering::SeqCst)
    }

    /// Wait until the gauge reads below `threshold` or `closed` flips.
    pub(crate) async fn wait_below(
        &self,
        threshold: usize,
        closed: &watch::Receiver<bool>,
    ) -> Result<(), ChannelError> {
        let mut closed = closed.clone();
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.get() < threshold {
                return Ok(());
            }
            if *closed.borrow() {
                return Err(ChannelError::Closed);
            }

            tokio::select! {
                _ = &mut notified => {}
                res = closed.changed() => {
                    if res.is_err() {
                        return Err(ChannelError::Closed);
                    }
                }
            }
        }
    }

    /// Wake every waiter so it re-checks the closed flag.
    pub(crate) fn wake_all(&self) {
        self.drained.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn gauge_wait_returns_immediately_below_threshold() {
        let gauge = BufferGauge::default();
        let (_tx, rx) = watch::channel(false);
        gauge.add(10);
        gauge.wait_below(11, &rx).await.unwrap();
    }

    #[tokio::test]
    async fn gauge_wait_wakes_on_drain() {
        let gauge = Arc::new(BufferGauge::default());
        let (_tx, rx) = watch::channel(false);
        gauge.add(100);

        let waiter = {
            let gauge = gauge.clone();
            tokio::spawn(async move { gauge.wait_below(50, &rx).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        gauge.sub(60);
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn gauge_wait_fails_on_close() {
        let gauge = Arc::new(BufferGauge::default());
        let (tx, rx) = watch::channel(false);
        gauge.add(100);

        let waiter = {
            let gauge = gauge.clone();
            tokio::spawn(async move { gauge.wait_below(50, &rx).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send_replace(true);

        assert!(matches!(
            waiter.await.unwrap(),
            Err(ChannelError::Closed)
        ));
    }

    #[test]
    fn gauge_sub_saturates() {
        let gauge = BufferGauge::default();
        gauge.add(5);
        gauge.sub(10);
        assert_eq!(gauge.get(), 0);
    }
}
