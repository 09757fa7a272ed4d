//! TCP channel: 4-byte big-endian length prefix, then the frame.

use std::sync::Arc;

use async_trait::async_trait;
use stream_types::PeerId;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

use super::{BufferGauge, Channel, ChannelError, MAX_FRAME_SIZE};

/// Frames read off the socket but not yet taken by `recv`. When full the
/// reader stops reading and the kernel window closes on the sender.
const INBOUND_FRAMES: usize = 16;

/// Read one length-prefixed frame.
pub(crate) async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>, ChannelError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| ChannelError::ReceiveFailed(e.to_string()))?;
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > MAX_FRAME_SIZE {
        return Err(ChannelError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| ChannelError::ReceiveFailed(e.to_string()))?;
    Ok(buf)
}

/// Write one length-prefixed frame and flush.
pub(crate) async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> Result<(), ChannelError>
where
    W: AsyncWrite + Unpin,
{
    if frame.len() > MAX_FRAME_SIZE {
        return Err(ChannelError::FrameTooLarge {
            size: frame.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    let len = (frame.len() as u32).to_be_bytes();
    writer
        .write_all(&len)
        .await
        .map_err(|e| ChannelError::SendFailed(e.to_string()))?;
    writer
        .write_all(frame)
        .await
        .map_err(|e| ChannelError::SendFailed(e.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|e| ChannelError::SendFailed(e.to_string()))?;
    Ok(())
}

/// Channel over an established TCP stream.
///
/// A writer task drains the outbound queue onto the socket; `buffered_amount`
/// counts frames queued but not yet written. A reader task feeds inbound
/// frames into a bounded queue that `recv` drains.
pub struct TcpChannel {
    remote: PeerId,
    outbound_tx: mpsc::UnboundedSender<Vec<u8>>,
    inbound_rx: Mutex<mpsc::Receiver<Vec<u8>>>,
    gauge: Arc<BufferGauge>,
    closed: Arc<watch::Sender<bool>>,
    closed_rx: watch::Receiver<bool>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl TcpChannel {
    /// Wrap a stream whose identity handshake has already completed.
    pub fn from_stream(stream: TcpStream, remote: PeerId) -> Self {
        let _ = stream.set_nodelay(true);
        let (mut read_half, mut write_half) = stream.into_split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_FRAMES);
        let gauge = Arc::new(BufferGauge::default());
        let (closed, closed_rx) = watch::channel(false);
        let closed = Arc::new(closed);

        let writer = {
            let gauge = gauge.clone();
            let closed = closed.clone();
            let remote = remote.clone();
            tokio::spawn(async move {
                while let Some(frame) = outbound_rx.recv().await {
                    let len = frame.len();
                    if let Err(e) = write_frame(&mut write_half, &frame).await {
                        debug!(peer = %remote, error = %e, "tcp write failed");
                        break;
                    }
                    gauge.sub(len);
                }
                let _ = write_half.shutdown().await;
                closed.send_replace(true);
                gauge.wake_all();
            })
        };

        let reader = {
            let gauge = gauge.clone();
            let closed = closed.clone();
            let remote = remote.clone();
            tokio::spawn(async move {
                loop {
                    match read_frame(&mut read_half).await {
                        Ok(frame) => {
                            if inbound_tx.send(frame).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            debug!(peer = %remote, error = %e, "tcp read ended");
                            break;
                        }
                    }
                }
                closed.send_replace(true);
                gauge.wake_all();
            })
        };

        Self {
            remote,
            outbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
            gauge,
            closed,
            closed_rx,
            tasks: std::sync::Mutex::new(vec![writer, reader]),
        }
    }

    fn abort_tasks(&self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}

#[async_trait]
impl Channel for TcpChannel {
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

        self.gauge.add(frame.len());
        self.outbound_tx.send(frame.to_vec()).map_err(|_| {
            self.gauge.sub(frame.len());
            ChannelError::Closed
        })
    }

    async fn recv(&self) -> Result<Vec<u8>, ChannelError> {
        let mut rx = self.inbound_rx.lock().await;
        let mut closed = self.closed_rx.clone();

        tokio::select! {
            biased;

            frame = rx.recv() => frame.ok_or(ChannelError::Closed),
            _ = closed.wait_for(|c| *c) => rx.try_recv().map_err(|_| ChannelError::Closed),
        }
    }

    fn buffered_amount(&self) -> usize {
        self.gauge.get()
    }

    async fn wait_buffered_below(&self, threshold: usize) -> Result<(), ChannelError> {
        self.gauge.wait_below(threshold, &self.closed_rx).await
    }

    fn is_open(&self) -> bool {
        !*self.closed_rx.borrow()
    }

    async fn close(&self) {
        self.closed.send_replace(true);
        self.gauge.wake_all();
        self.abort_tasks();
    }
}

impl Drop for TcpChannel {
    fn drop(&mut self) {
        self.closed.send_replace(true);
        self.abort_tasks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn connected_pair() -> (TcpChannel, TcpChannel) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (client, server) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let client = client.unwrap();
        let (server, _) = server.unwrap();

        (
            TcpChannel::from_stream(client, PeerId::parse("SERVER").unwrap()),
            TcpChannel::from_stream(server, PeerId::parse("CLIENT").unwrap()),
        )
    }

    #[tokio::test]
    async fn frame_roundtrip_over_duplex() {
        let (mut a, mut b) = tokio::io::duplex(64);
        write_frame(&mut a, b"hello").await.unwrap();
        assert_eq!(read_frame(&mut b).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&((MAX_FRAME_SIZE as u32) + 1).to_be_bytes())
            .await
            .unwrap();
        assert!(matches!(
            read_frame(&mut b).await,
            Err(ChannelError::FrameTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn frames_cross_a_real_socket() {
        let (client, server) = connected_pair().await;

        client.send(b"ping from client").await.unwrap();
        server.send(b"pong from server").await.unwrap();

        assert_eq!(server.recv().await.unwrap(), b"ping from client");
        assert_eq!(client.recv().await.unwrap(), b"pong from server");

        client.wait_buffered_below(1).await.unwrap();
        assert_eq!(client.buffered_amount(), 0);
    }

    #[tokio::test]
    async fn unread_frames_hold_back_the_sender() {
        let (client, server) = connected_pair().await;
        let frame = vec![9u8; 256 * 1024];
        let count = 96;

        for _ in 0..count {
            client.send(&frame).await.unwrap();
        }
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        assert!(
            client.buffered_amount() > 0,
            "writer should stall while the far side is not reading"
        );

        for _ in 0..count {
            assert_eq!(server.recv().await.unwrap().len(), frame.len());
        }
        client.wait_buffered_below(1).await.unwrap();
        assert_eq!(client.buffered_amount(), 0);
    }

    #[tokio::test]
    async fn closing_one_side_closes_the_other() {
        let (client, server) = connected_pair().await;

        client.close().await;
        assert!(!client.is_open());
        assert!(matches!(server.recv().await, Err(ChannelError::Closed)));
        assert!(!server.is_open());
    }
}
