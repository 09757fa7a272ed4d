//! Mock channel for testing.
//!
//! Allows queueing inbound frames and capturing sent frames for verification.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use stream_types::{Message, PeerId};
use tokio::sync::watch;

use super::{Channel, ChannelError};

/// Mock channel for testing.
///
/// `recv` pops queued frames and reports `Closed` once the queue is empty.
/// When buffer tracking is on, `send` adds to `buffered_amount` and
/// `wait_buffered_below` drains it to zero, counting each drain. While sends
/// are held, `send` parks until they are released.
#[derive(Debug)]
pub struct MockChannel {
    remote: PeerId,
    inner: Arc<Mutex<MockChannelInner>>,
    hold: Arc<watch::Sender<bool>>,
}

#[derive(Debug)]
struct MockChannelInner {
    open: bool,
    sent_frames: Vec<Vec<u8>>,
    receive_queue: VecDeque<Vec<u8>>,
    buffered: usize,
    track_buffered: bool,
    drain_waits: usize,
    fail_next_send: Option<String>,
    fail_next_recv: Option<String>,
}

impl Default for MockChannelInner {
    fn default() -> Self {
        Self {
            open: true,
            sent_frames: Vec::new(),
            receive_queue: VecDeque::new(),
            buffered: 0,
            track_buffered: false,
            drain_waits: 0,
            fail_next_send: None,
            fail_next_recv: None,
        }
    }
}

impl MockChannel {
    /// Create an open mock channel to `remote`.
    pub fn new(remote: PeerId) -> Self {
        Self {
            remote,
            inner: Arc::default(),
            hold: Arc::new(watch::channel(false).0),
        }
    }

    /// Queue a raw frame to be returned by the next `recv()` call.
    pub fn queue_frame(&self, frame: Vec<u8>) {
        self.inner.lock().unwrap().receive_queue.push_back(frame);
    }

    /// Queue a message to be returned by the next `recv()` call.
    pub fn queue_message(&self, message: &Message) {
        let frame = message.to_bytes().expect("message encodes");
        self.queue_frame(frame);
    }

    /// Get all frames that were sent.
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.inner.lock().unwrap().sent_frames.clone()
    }

    /// Get all sent frames decoded as messages; undecodable frames are skipped.
    pub fn sent_messages(&self) -> Vec<Message> {
        self.sent_frames()
            .iter()
            .filter_map(|f| Message::from_bytes(f).ok())
            .collect()
    }

    /// Make `send` accumulate `buffered_amount` and `wait_buffered_below`
    /// drain it.
    pub fn track_buffered(&self, on: bool) {
        self.inner.lock().unwrap().track_buffered = on;
    }

    /// Force the reported buffered amount.
    pub fn set_buffered_amount(&self, bytes: usize) {
        self.inner.lock().unwrap().buffered = bytes;
    }

    /// How many times a caller had to wait for the buffer to drain.
    pub fn drain_waits(&self) -> usize {
        self.inner.lock().unwrap().drain_waits
    }

    /// Cause the next send() to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_send = Some(error.to_string());
    }

    /// Cause the next recv() to fail with the given error.
    pub fn fail_next_recv(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_recv = Some(error.to_string());
    }

    /// Park every send() until [`release_sends`](Self::release_sends).
    pub fn hold_sends(&self) {
        self.hold.send_replace(true);
    }

    /// Let held sends complete.
    pub fn release_sends(&self) {
        self.hold.send_replace(false);
    }
}

impl Clone for MockChannel {
    fn clone(&self) -> Self {
        Self {
            remote: self.remote.clone(),
            inner: Arc::clone(&self.inner),
            hold: Arc::clone(&self.hold),
        }
    }
}

#[async_trait]
impl Channel for MockChannel {
    fn remote_id(&self) -> &PeerId {
        &self.remote
    }

    async fn send(&self, frame: &[u8]) -> Result<(), ChannelError> {
        let mut held = self.hold.subscribe();
        let _ = held.wait_for(|held| !*held).await;

        let mut inner = self.inner.lock().unwrap();

        if !inner.open {
            return Err(ChannelError::Closed);
        }

        // Check for forced failure
        if let Some(error) = inner.fail_next_send.take() {
            return Err(ChannelError::SendFailed(error));
        }

        if inner.track_buffered {
            inner.buffered += frame.len();
        }
        inner.sent_frames.push(frame.to_vec());
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>, ChannelError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(error) = inner.fail_next_recv.take() {
            return Err(ChannelError::ReceiveFailed(error));
        }

        inner.receive_queue.pop_front().ok_or(ChannelError::Closed)
    }

    fn buffered_amount(&self) -> usize {
        self.inner.lock().unwrap().buffered
    }

    async fn wait_buffered_below(&self, threshold: usize) -> Result<(), ChannelError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.buffered < threshold {
            return Ok(());
        }
        if !inner.open {
            return Err(ChannelError::Closed);
        }
        inner.drain_waits += 1;
        inner.buffered = 0;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.inner.lock().unwrap().open
    }

    async fn close(&self) {
        self.inner.lock().unwrap().open = false;
    }
}
