//! TCP rendezvous with a static directory.
//!
//! Each endpoint listens on a socket. Dialing looks the remote identity up in
//! the directory, connects, and exchanges one [`Handshake`] frame in each
//! direction before the stream is wrapped in a [`TcpChannel`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stream_types::PeerId;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{Incoming, Rendezvous, RendezvousError, INCOMING_BACKLOG};
use crate::channel::{read_frame, write_frame, Channel, TcpChannel};
use crate::config::RendezvousConfig;

/// Time an inbound connection gets to introduce itself.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// First frame on every TCP connection, in both directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    /// Identity of the endpoint writing this frame.
    pub from: PeerId,
    /// Identity the writer expects on the other side.
    pub to: PeerId,
}

impl Handshake {
    fn to_bytes(&self) -> Result<Vec<u8>, RendezvousError> {
        rmp_serde::to_vec_named(self).map_err(|e| RendezvousError::Unavailable(e.to_string()))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, RendezvousError> {
        rmp_serde::from_slice(bytes).map_err(|e| RendezvousError::Unavailable(e.to_string()))
    }
}

/// TCP rendezvous.
pub struct TcpRendezvous {
    listen: String,
    directory: RwLock<HashMap<PeerId, String>>,
    bound: Mutex<Option<SocketAddr>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl TcpRendezvous {
    /// Create a rendezvous that will listen on `listen` once registered.
    pub fn new(listen: impl Into<String>) -> Self {
        Self {
            listen: listen.into(),
            directory: RwLock::new(HashMap::new()),
            bound: Mutex::new(None),
            accept_task: Mutex::new(None),
        }
    }

    /// Build from the `[rendezvous]` config section.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if a directory key is not a valid identity.
    pub fn from_config(config: &RendezvousConfig) -> Result<Self, RendezvousError> {
        let rendezvous = Self::new(config.listen.clone());
        for (id, addr) in &config.peers {
            let id = PeerId::parse(id)
                .map_err(|e| RendezvousError::Unavailable(format!("directory entry: {e}")))?;
            rendezvous.add_peer(id, addr.clone());
        }
        Ok(rendezvous)
    }

    /// Add or replace a directory entry.
    pub fn add_peer(&self, id: PeerId, addr: impl Into<String>) {
        self.directory.write().unwrap().insert(id, addr.into());
    }

    /// Address actually bound, once registered.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.bound.lock().unwrap()
    }

    fn lookup(&self, remote: &PeerId) -> Option<String> {
        self.directory.read().unwrap().get(remote).cloned()
    }
}

async fn accept_handshake(
    mut stream: TcpStream,
    local: &PeerId,
) -> Result<TcpChannel, RendezvousError> {
    let frame = read_frame(&mut stream).await?;
    let hello = Handshake::from_bytes(&frame)?;
    if &hello.to != local {
        return Err(RendezvousError::UnknownPeer(hello.to));
    }

    let reply = Handshake {
        from: local.clone(),
        to: hello.from.clone(),
    };
    write_frame(&mut stream, &reply.to_bytes()?).await?;
    Ok(TcpChannel::from_stream(stream, hello.from))
}

async fn accept_loop(listener: TcpListener, local: PeerId, tx: mpsc::Sender<Arc<dyn Channel>>) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };
        if tx.is_closed() {
            break;
        }

        let local = local.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            match tokio::time::timeout(HANDSHAKE_TIMEOUT, accept_handshake(stream, &local)).await {
                Ok(Ok(channel)) => {
                    debug!(%addr, peer = %channel.remote_id(), "inbound handshake complete");
                    let _ = tx.send(Arc::new(channel)).await;
                }
                Ok(Err(e)) => warn!(%addr, error = %e, "inbound handshake rejected"),
                Err(_) => warn!(%addr, "inbound handshake timed out"),
            }
        });
    }
}

#[async_trait]
impl Rendezvous for TcpRendezvous {
    async fn register(&self, local: &PeerId) -> Result<Incoming, RendezvousError> {
        if self.accept_task.lock().unwrap().is_some() {
            return Err(RendezvousError::IdTaken(local.clone()));
        }

        let listener = TcpListener::bind(&self.listen).await?;
        let addr = listener.local_addr()?;
        *self.bound.lock().unwrap() = Some(addr);
        info!(peer = %local, %addr, "listening for peers");

        let (tx, rx) = mpsc::channel(INCOMING_BACKLOG);
        let task = tokio::spawn(accept_loop(listener, local.clone(), tx));
        *self.accept_task.lock().unwrap() = Some(task);
        Ok(rx)
    }

    async fn open_channel(
        &self,
        local: &PeerId,
        remote: &PeerId,
    ) -> Result<Arc<dyn Channel>, RendezvousError> {
        let addr = self
            .lookup(remote)
            .ok_or_else(|| RendezvousError::UnknownPeer(remote.clone()))?;

        let mut stream = TcpStream::connect(&addr).await?;
        let hello = Handshake {
            from: local.clone(),
            to: remote.clone(),
        };
        write_frame(&mut stream, &hello.to_bytes()?).await?;

        let reply = Handshake::from_bytes(&read_frame(&mut stream).await?)?;
        if &reply.from != remote || &reply.to != local {
            return Err(RendezvousError::Unavailable(format!(
                "{addr} answered as {}",
                reply.from
            )));
        }

        debug!(peer = %remote, %addr, "outbound handshake complete");
        Ok(Arc::new(TcpChannel::from_stream(stream, remote.clone())))
    }

    async fn unregister(&self, local: &PeerId) {
        if let Some(task) = self.accept_task.lock().unwrap().take() {
            task.abort();
            debug!(peer = %local, "stopped listening");
        }
        *self.bound.lock().unwrap() = None;
    }
}

impl Drop for TcpRendezvous {
    fn drop(&mut self) {
        if let Ok(mut task) = self.accept_task.lock() {
            if let Some(task) = task.take() {
                task.abort();
            }
        }
    }
}
