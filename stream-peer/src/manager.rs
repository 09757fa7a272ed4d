//! Connection manager: identity, the peer pool, admission and liveness.
//!
//! The manager owns every open channel. For each admitted channel it runs
//! three tasks:
//!
//! - a reader that decodes frames, answers `ping`, records `pong`, and
//!   queues everything else
//! - a dispatcher that drains that queue into the [`SessionHandler`] in
//!   arrival order
//! - a heartbeat that pings on an interval and drops the link when pongs
//!   stop arriving
//!
//! Decisions come from [`LinkState`]; this module only performs the I/O.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use stream_core::{LinkAction, LinkEvent, LinkPolicy, LinkState};
use stream_types::{Message, PeerId, Ping, Pong};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelError};
use crate::config::ConnectionConfig;
use crate::error::{ConnectionError, ConnectionResult, TransferResult};
use crate::events::{Event, EventSender, StatusKind};
use crate::rendezvous::{Incoming, Rendezvous};

/// Message sent to a channel rejected because the pool is full.
pub const ROOM_FULL: &str = "Room Full";

/// Messages queued per channel before the reader stops pulling frames.
const INBOUND_QUEUE_DEPTH: usize = 64;

/// Receives the traffic of every admitted channel.
///
/// Calls for one channel are never concurrent and arrive in order:
/// `on_open`, then `on_message` per inbound message, then `on_close`.
#[async_trait]
pub trait SessionHandler: Send + Sync {
    /// A channel was admitted.
    async fn on_open(&self, _peer: &PeerHandle) {}

    /// A non-liveness message arrived.
    async fn on_message(&self, peer: &PeerHandle, message: Message);

    /// The channel left the pool.
    async fn on_close(&self, _peer: &PeerId) {}
}

/// Cloneable handle to one admitted channel.
#[derive(Clone)]
pub struct PeerHandle {
    channel: Arc<dyn Channel>,
}

impl PeerHandle {
    /// Wrap a channel.
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        Self { channel }
    }

    /// Remote identity.
    pub fn id(&self) -> &PeerId {
        self.channel.remote_id()
    }

    /// Encode and send one message.
    pub async fn send(&self, message: &Message) -> TransferResult<()> {
        let frame = message.to_bytes()?;
        self.channel.send(&frame).await?;
        Ok(())
    }

    /// Bytes queued on the channel but not yet delivered.
    pub fn buffered_amount(&self) -> usize {
        self.channel.buffered_amount()
    }

    /// Wait until fewer than `threshold` bytes are queued.
    pub async fn wait_buffered_below(&self, threshold: usize) -> Result<(), ChannelError> {
        self.channel.wait_buffered_below(threshold).await
    }

    /// Check if the channel is still open.
    pub fn is_open(&self) -> bool {
        self.channel.is_open()
    }

    /// Close the channel. The manager notices and evicts it.
    pub async fn close(&self) {
        self.channel.close().await;
    }
}

impl std::fmt::Debug for PeerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerHandle")
            .field("id", self.id())
            .field("open", &self.is_open())
            .finish()
    }
}

/// One pool entry.
struct Link {
    channel: Arc<dyn Channel>,
    state: Mutex<LinkState>,
    last_pong: Mutex<Instant>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl Link {
    fn new(channel: Arc<dyn Channel>) -> Self {
        Self {
            channel,
            state: Mutex::new(LinkState::new()),
            last_pong: Mutex::new(Instant::now()),
            heartbeat: Mutex::new(None),
        }
    }

    fn remote(&self) -> &PeerId {
        self.channel.remote_id()
    }

    fn apply(&self, event: LinkEvent, policy: &LinkPolicy) -> Vec<LinkAction> {
        let mut state = self.state.lock().unwrap();
        let (next, actions) = state.on_event(event, policy);
        *state = next;
        actions
    }

    fn touch(&self) {
        *self.last_pong.lock().unwrap() = Instant::now();
    }

    fn silent_for(&self) -> std::time::Duration {
        self.last_pong.lock().unwrap().elapsed()
    }

    fn stop_heartbeat(&self) {
        let task = self.heartbeat.lock().unwrap().take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

struct ManagerInner {
    rendezvous: Arc<dyn Rendezvous>,
    handler: Arc<dyn SessionHandler>,
    events: EventSender,
    config: ConnectionConfig,
    policy: LinkPolicy,
    local: Mutex<Option<PeerId>>,
    pool: tokio::sync::Mutex<HashMap<PeerId, Arc<Link>>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

/// Connection manager.
///
/// Cheap to clone; clones share the same pool. Background tasks keep the
/// manager alive until [`shutdown`](Self::shutdown).
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    /// Create a manager. Nothing happens until [`register`](Self::register).
    pub fn new(
        rendezvous: Arc<dyn Rendezvous>,
        handler: Arc<dyn SessionHandler>,
        events: EventSender,
        config: ConnectionConfig,
    ) -> Self {
        let policy = config.link_policy();
        Self {
            inner: Arc::new(ManagerInner {
                rendezvous,
                handler,
                events,
                config,
                policy,
                local: Mutex::new(None),
                pool: tokio::sync::Mutex::new(HashMap::new()),
                accept_task: Mutex::new(None),
            }),
        }
    }

    /// Claim an identity and start accepting inbound channels.
    ///
    /// `preferred` is trimmed and upper-cased; without it a random
    /// 6-character identity is generated.
    pub async fn register(&self, preferred: Option<&str>) -> ConnectionResult<PeerId> {
        let id = match preferred {
            Some(preferred) => PeerId::parse(preferred)?,
            None => PeerId::generate(),
        };

        let previous = self.inner.local.lock().unwrap().take();
        if let Some(previous) = previous {
            self.stop_accepting();
            self.inner.rendezvous.unregister(&previous).await;
        }

        let incoming = self.inner.rendezvous.register(&id).await?;
        *self.inner.local.lock().unwrap() = Some(id.clone());

        let task = tokio::spawn(accept_loop(self.inner.clone(), incoming));
        *self.inner.accept_task.lock().unwrap() = Some(task);

        info!(peer = %id, "registered");
        Ok(id)
    }

    /// Open a channel to `remote` and admit it.
    ///
    /// # Errors
    ///
    /// - `SelfConnection` when `remote` is our own identity
    /// - `DuplicateConnection` when a channel to `remote` is already open
    /// - `RoomFull` when our own pool is at capacity
    /// - `ConnectTimeout` when the channel does not open in time; the
    ///   half-open attempt is dropped and nothing is retried
    pub async fn connect(&self, remote: &str) -> ConnectionResult<PeerHandle> {
        let local = self.local_id().ok_or(ConnectionError::NotRegistered)?;
        let remote = PeerId::parse(remote)?;
        if remote == local {
            return Err(ConnectionError::SelfConnection);
        }

        {
            let pool = self.inner.pool.lock().await;
            if pool.contains_key(&remote) {
                return Err(ConnectionError::DuplicateConnection(remote));
            }
            if pool.len() >= self.inner.policy.max_peers {
                return Err(ConnectionError::RoomFull);
            }
        }

        info!(peer = %remote, "connecting");
        let attempt = tokio::time::timeout(
            self.inner.config.connect_timeout(),
            self.inner.rendezvous.open_channel(&local, &remote),
        )
        .await;

        let channel = match attempt {
            Ok(Ok(channel)) => channel,
            Ok(Err(e)) => {
                warn!(peer = %remote, error = %e, "connect failed");
                self.inner
                    .events
                    .status(StatusKind::Error, format!("Error: {e}"));
                return Err(e.into());
            }
            Err(_) => {
                // the dropped future takes the half-open attempt with it
                warn!(peer = %remote, "connect timed out");
                let (_, actions) =
                    LinkState::new().on_event(LinkEvent::ConnectTimedOut, &self.inner.policy);
                for action in actions {
                    if let LinkAction::Emit(status) = action {
                        self.inner.events.emit(Event::link(status));
                    }
                }
                return Err(ConnectionError::ConnectTimeout(remote));
            }
        };

        let link = self.inner.admit(channel).await?;
        Ok(PeerHandle::new(link.channel.clone()))
    }

    /// Close the channel to `remote`.
    pub async fn disconnect(&self, remote: &PeerId) -> ConnectionResult<()> {
        let link = self.inner.pool.lock().await.get(remote).cloned();
        let link = link.ok_or_else(|| ConnectionError::UnknownPeer(remote.clone()))?;

        let actions = link.apply(LinkEvent::CloseRequested, &self.inner.policy);
        self.inner.execute(&link, actions).await;
        Ok(())
    }

    /// Our identity, once registered.
    pub fn local_id(&self) -> Option<PeerId> {
        self.inner.local.lock().unwrap().clone()
    }

    /// Identities in the pool, sorted.
    pub async fn peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.inner.pool.lock().await.keys().cloned().collect();
        peers.sort();
        peers
    }

    /// Handle to an admitted peer.
    pub async fn peer(&self, remote: &PeerId) -> Option<PeerHandle> {
        let pool = self.inner.pool.lock().await;
        pool.get(remote)
            .map(|link| PeerHandle::new(link.channel.clone()))
    }

    /// Close every channel, stop accepting, and release the identity.
    pub async fn shutdown(&self) {
        self.stop_accepting();
        let local = self.inner.local.lock().unwrap().take();
        if let Some(local) = local {
            self.inner.rendezvous.unregister(&local).await;
        }

        let links: Vec<Arc<Link>> = self.inner.pool.lock().await.values().cloned().collect();
        for link in links {
            let actions = link.apply(LinkEvent::CloseRequested, &self.inner.policy);
            self.inner.execute(&link, actions).await;
        }
        info!("connection manager shut down");
    }

    fn stop_accepting(&self) {
        let task = self.inner.accept_task.lock().unwrap().take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

impl ManagerInner {
    /// Run an opened channel through admission.
    async fn admit(self: &Arc<Self>, channel: Arc<dyn Channel>) -> ConnectionResult<Arc<Link>> {
        let link = Arc::new(Link::new(channel));
        let remote = link.remote().clone();

        let actions = {
            let mut pool = self.pool.lock().await;
            let event = LinkEvent::Opened {
                pool_size: pool.len(),
                already_connected: pool.contains_key(&remote),
            };
            let actions = link.apply(event, &self.policy);
            if actions.contains(&LinkAction::Admit) {
                pool.insert(remote.clone(), link.clone());
            }
            actions
        };

        let admitted = actions.contains(&LinkAction::Admit);
        let room_full = actions.contains(&LinkAction::RejectRoomFull);
        self.execute(&link, actions).await;

        if !admitted {
            return Err(if room_full {
                ConnectionError::RoomFull
            } else {
                ConnectionError::DuplicateConnection(remote)
            });
        }

        info!(peer = %remote, "peer admitted");
        let (queue_tx, queue_rx) = mpsc::channel(INBOUND_QUEUE_DEPTH);
        tokio::spawn(read_loop(self.clone(), link.clone(), queue_tx));
        tokio::spawn(dispatch_loop(
            self.handler.clone(),
            PeerHandle::new(link.channel.clone()),
            queue_rx,
        ));
        Ok(link)
    }

    /// Perform link actions in order.
    async fn execute(self: &Arc<Self>, link: &Arc<Link>, actions: Vec<LinkAction>) {
        for action in actions {
            match action {
                LinkAction::Admit => self.events.emit(Event::PeerJoined(link.remote().clone())),
                LinkAction::StartHeartbeat => {
                    let task = spawn_heartbeat(self.clone(), link.clone());
                    *link.heartbeat.lock().unwrap() = Some(task);
                }
                LinkAction::RejectRoomFull => {
                    warn!(peer = %link.remote(), "pool full, rejecting");
                    self.reject_room_full(link.channel.clone());
                }
                LinkAction::CloseChannel => link.channel.close().await,
                LinkAction::SendPing => send_liveness(link, Message::Ping(Ping {})).await,
                LinkAction::SendPong => send_liveness(link, Message::Pong(Pong {})).await,
                LinkAction::StopHeartbeat => link.stop_heartbeat(),
                LinkAction::Evict => self.evict(link).await,
                LinkAction::Emit(status) => self.events.emit(Event::link(status)),
            }
        }
    }

    /// Remove `link` from the pool if it is still the entry for its peer.
    async fn evict(&self, link: &Arc<Link>) {
        let remote = link.remote();
        let removed = {
            let mut pool = self.pool.lock().await;
            match pool.get(remote) {
                Some(current) if Arc::ptr_eq(current, link) => {
                    pool.remove(remote);
                    true
                }
                _ => false,
            }
        };

        if removed {
            info!(peer = %remote, "peer left");
            self.events.emit(Event::PeerLeft(remote.clone()));
        }
    }

    /// Send exactly one "Room Full" and close after the grace delay.
    fn reject_room_full(&self, channel: Arc<dyn Channel>) {
        let grace = self.config.room_full_grace();
        tokio::spawn(async move {
            match Message::error(ROOM_FULL).to_bytes() {
                Ok(frame) => {
                    if let Err(e) = channel.send(&frame).await {
                        debug!(peer = %channel.remote_id(), error = %e, "room full notice not sent");
                    }
                }
                Err(e) => warn!(error = %e, "failed to encode room full notice"),
            }
            tokio::time::sleep(grace).await;
            channel.close().await;
        });
    }
}

async fn send_liveness(link: &Link, message: Message) {
    let result = match message.to_bytes() {
        Ok(frame) => link.channel.send(&frame).await.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };
    if let Err(e) = result {
        debug!(peer = %link.remote(), kind = message.kind(), error = %e, "liveness send failed");
    }
}

async fn accept_loop(inner: Arc<ManagerInner>, mut incoming: Incoming) {
    while let Some(channel) = incoming.recv().await {
        let remote = channel.remote_id().clone();
        if let Err(e) = inner.admit(channel).await {
            warn!(peer = %remote, error = %e, "inbound channel rejected");
        }
    }
    debug!("accept loop ended");
}

async fn read_loop(inner: Arc<ManagerInner>, link: Arc<Link>, queue: mpsc::Sender<Message>) {
    loop {
        let frame = match link.channel.recv().await {
            Ok(frame) => frame,
            Err(e) => {
                debug!(peer = %link.remote(), error = %e, "channel ended");
                break;
            }
        };

        match Message::from_bytes(&frame) {
            Ok(Message::Ping(_)) => {
                let actions = link.apply(LinkEvent::PingReceived, &inner.policy);
                inner.execute(&link, actions).await;
            }
            Ok(Message::Pong(_)) => link.touch(),
            Ok(message) => {
                if queue.send(message).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(peer = %link.remote(), error = %e, "dropping malformed frame");
            }
        }
    }

    let actions = link.apply(LinkEvent::ChannelClosed, &inner.policy);
    inner.execute(&link, actions).await;
}

async fn dispatch_loop(
    handler: Arc<dyn SessionHandler>,
    peer: PeerHandle,
    mut queue: mpsc::Receiver<Message>,
) {
    handler.on_open(&peer).await;
    while let Some(message) = queue.recv().await {
        handler.on_message(&peer, message).await;
    }
    handler.on_close(peer.id()).await;
}

fn spawn_heartbeat(inner: Arc<ManagerInner>, link: Arc<Link>) -> JoinHandle<()> {
    let period = inner.config.ping_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        loop {
            ticker.tick().await;

            let event = if link.channel.is_open() {
                LinkEvent::HeartbeatTick {
                    silent_for: link.silent_for(),
                }
            } else {
                LinkEvent::ChannelClosed
            };
            let actions = link.apply(event, &inner.policy);

            if actions.contains(&LinkAction::StopHeartbeat) {
                // teardown aborts this task, so it runs on its own
                debug!(peer = %link.remote(), "heartbeat stopped");
                let inner = inner.clone();
                let link = link.clone();
                tokio::spawn(async move { inner.execute(&link, actions).await });
                break;
            }
            inner.execute(&link, actions).await;
        }
    })
}
