//! Peer link state machine.
//!
//! One [`LinkState`] tracks a single channel from the moment it is opened (or
//! dialed) until it leaves the connection pool. It is pure: events go in,
//! a new state plus a list of [`LinkAction`]s come out, and the connection
//! manager performs the I/O.
//!
//! Every path out of `Open` lands in `Closed` and carries `StopHeartbeat` and
//! `Evict` exactly once; `Closed` ignores everything afterwards.

use std::time::Duration;

/// Admission and liveness limits applied to every link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPolicy {
    /// Pool bound; a channel that opens when the pool is full is rejected.
    pub max_peers: usize,
    /// Close the link when no pong has been seen for longer than this.
    pub liveness_timeout: Duration,
}

impl Default for LinkPolicy {
    fn default() -> Self {
        Self {
            max_peers: 1,
            liveness_timeout: Duration::from_secs(10),
        }
    }
}

/// Lifecycle of one channel - NO I/O, just state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Dialed or accepted, not yet admitted to the pool.
    Pending,
    /// Admitted; heartbeat running.
    Open,
    /// Gone from the pool. Terminal.
    Closed,
}

impl LinkState {
    /// Create a new link in the Pending state.
    pub fn new() -> Self {
        Self::Pending
    }

    /// Process an event and return the new state plus actions to execute.
    pub fn on_event(self, event: LinkEvent, policy: &LinkPolicy) -> (Self, Vec<LinkAction>) {
        match (self, event) {
            // From Pending
            (
                Self::Pending,
                LinkEvent::Opened {
                    already_connected: true,
                    ..
                },
            ) => (Self::Closed, vec![LinkAction::CloseChannel]),
            (Self::Pending, LinkEvent::Opened { pool_size, .. }) if pool_size >= policy.max_peers => {
                (Self::Closed, vec![LinkAction::RejectRoomFull])
            }
            (Self::Pending, LinkEvent::Opened { .. }) => (
                Self::Open,
                vec![
                    LinkAction::Admit,
                    LinkAction::StartHeartbeat,
                    LinkAction::Emit(LinkStatus::Connected),
                ],
            ),
            (Self::Pending, LinkEvent::ConnectTimedOut) => (
                Self::Closed,
                vec![
                    LinkAction::CloseChannel,
                    LinkAction::Emit(LinkStatus::TimedOut),
                ],
            ),
            (Self::Pending, LinkEvent::ChannelClosed | LinkEvent::CloseRequested) => {
                (Self::Closed, vec![LinkAction::CloseChannel])
            }

            // From Open
            (Self::Open, LinkEvent::HeartbeatTick { silent_for })
                if silent_for > policy.liveness_timeout =>
            {
                (Self::Closed, teardown(true))
            }
            (Self::Open, LinkEvent::HeartbeatTick { .. }) => (Self::Open, vec![LinkAction::SendPing]),
            (Self::Open, LinkEvent::PingReceived) => (Self::Open, vec![LinkAction::SendPong]),
            (Self::Open, LinkEvent::ChannelClosed) => (Self::Closed, teardown(false)),
            (Self::Open, LinkEvent::CloseRequested) => (Self::Closed, teardown(true)),

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Check if the link is admitted and live.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Check if the link has reached its terminal state.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl Default for LinkState {
    fn default() -> Self {
        Self::new()
    }
}

fn teardown(close_channel: bool) -> Vec<LinkAction> {
    let mut actions = vec![LinkAction::StopHeartbeat];
    if close_channel {
        actions.push(LinkAction::CloseChannel);
    }
    actions.push(LinkAction::Evict);
    actions.push(LinkAction::Emit(LinkStatus::Disconnected));
    actions
}

/// Inputs to the link state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The channel reached the open state.
    Opened {
        /// Entries in the pool right now, this link excluded.
        pool_size: usize,
        /// The pool already holds a channel to the same remote identity.
        already_connected: bool,
    },
    /// The outbound dial did not open in time.
    ConnectTimedOut,
    /// Heartbeat interval elapsed.
    HeartbeatTick {
        /// Time since the last pong (or since admission, if none yet).
        silent_for: Duration,
    },
    /// The remote sent a ping.
    PingReceived,
    /// The channel closed underneath us.
    ChannelClosed,
    /// Local side asked to disconnect.
    CloseRequested,
}

/// Instructions for the connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAction {
    /// Insert the channel into the pool.
    Admit,
    /// Spawn the ping task.
    StartHeartbeat,
    /// Send one `error{"Room Full"}` then close after the grace delay.
    RejectRoomFull,
    /// Close the underlying channel.
    CloseChannel,
    /// Send a `ping`.
    SendPing,
    /// Answer with a `pong`.
    SendPong,
    /// Abort the ping task.
    StopHeartbeat,
    /// Remove the channel from the pool and notify the session handler.
    Evict,
    /// Surface a status change to the application.
    Emit(LinkStatus),
}

/// Link-level status changes shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// Channel admitted.
    Connected,
    /// Channel left the pool.
    Disconnected,
    /// Outbound dial timed out.
    TimedOut,
}

impl LinkStatus {
    /// User-facing wording.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Connected => "Connected",
            Self::Disconnected => "Disconnected",
            Self::TimedOut => "Connection Timed Out",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_peers: usize) -> LinkPolicy {
        LinkPolicy {
            max_peers,
            liveness_timeout: Duration::from_secs(10),
        }
    }

    fn opened(pool_size: usize) -> LinkEvent {
        LinkEvent::Opened {
            pool_size,
            already_connected: false,
        }
    }

    #[test]
    fn starts_pending() {
        assert_eq!(LinkState::new(), LinkState::Pending);
    }

    #[test]
    fn open_with_room_is_admitted() {
        let (state, actions) = LinkState::Pending.on_event(opened(0), &policy(1));

        assert!(state.is_open());
        assert_eq!(
            actions,
            vec![
                LinkAction::Admit,
                LinkAction::StartHeartbeat,
                LinkAction::Emit(LinkStatus::Connected)
            ]
        );
    }

    #[test]
    fn open_when_full_is_rejected_once() {
        let (state, actions) = LinkState::Pending.on_event(opened(3), &policy(3));

        assert!(state.is_closed());
        assert_eq!(actions, vec![LinkAction::RejectRoomFull]);
    }

    #[test]
    fn duplicate_identity_is_closed_without_room_full() {
        let (state, actions) = LinkState::Pending.on_event(
            LinkEvent::Opened {
                pool_size: 0,
                already_connected: true,
            },
            &policy(5),
        );

        assert!(state.is_closed());
        assert_eq!(actions, vec![LinkAction::CloseChannel]);
    }

    #[test]
    fn connect_timeout_drops_half_open_channel() {
        let (state, actions) = LinkState::Pending.on_event(LinkEvent::ConnectTimedOut, &policy(1));

        assert!(state.is_closed());
        assert!(actions.contains(&LinkAction::CloseChannel));
        assert!(actions.contains(&LinkAction::Emit(LinkStatus::TimedOut)));
        assert!(!actions.contains(&LinkAction::Evict));
    }

    #[test]
    fn heartbeat_pings_while_live() {
        let (state, actions) = LinkState::Open.on_event(
            LinkEvent::HeartbeatTick {
                silent_for: Duration::from_secs(4),
            },
            &policy(1),
        );

        assert!(state.is_open());
        assert_eq!(actions, vec![LinkAction::SendPing]);
    }

    #[test]
    fn silence_at_exactly_the_timeout_is_still_live() {
        let (state, _) = LinkState::Open.on_event(
            LinkEvent::HeartbeatTick {
                silent_for: Duration::from_secs(10),
            },
            &policy(1),
        );
        assert!(state.is_open());
    }

    #[test]
    fn silence_past_timeout_closes_and_evicts() {
        let (state, actions) = LinkState::Open.on_event(
            LinkEvent::HeartbeatTick {
                silent_for: Duration::from_millis(10_001),
            },
            &policy(1),
        );

        assert!(state.is_closed());
        assert_eq!(
            actions,
            vec![
                LinkAction::StopHeartbeat,
                LinkAction::CloseChannel,
                LinkAction::Evict,
                LinkAction::Emit(LinkStatus::Disconnected)
            ]
        );
    }

    #[test]
    fn remote_close_evicts_without_closing_again() {
        let (state, actions) = LinkState::Open.on_event(LinkEvent::ChannelClosed, &policy(1));

        assert!(state.is_closed());
        assert!(!actions.contains(&LinkAction::CloseChannel));
        assert!(actions.contains(&LinkAction::Evict));
        assert!(actions.contains(&LinkAction::StopHeartbeat));
    }

    #[test]
    fn ping_is_answered_with_pong() {
        let (state, actions) = LinkState::Open.on_event(LinkEvent::PingReceived, &policy(1));
        assert!(state.is_open());
        assert_eq!(actions, vec![LinkAction::SendPong]);
    }

    #[test]
    fn closed_is_terminal() {
        let events = [
            opened(0),
            LinkEvent::ConnectTimedOut,
            LinkEvent::HeartbeatTick {
                silent_for: Duration::from_secs(60),
            },
            LinkEvent::PingReceived,
            LinkEvent::ChannelClosed,
            LinkEvent::CloseRequested,
        ];
        for event in events {
            let (state, actions) = LinkState::Closed.on_event(event, &policy(1));
            assert!(state.is_closed());
            assert!(actions.is_empty());
        }
    }

    #[test]
    fn teardown_happens_exactly_once() {
        // timeout then the channel's own close notification
        let (state, first) = LinkState::Open.on_event(
            LinkEvent::HeartbeatTick {
                silent_for: Duration::from_secs(11),
            },
            &policy(1),
        );
        let (_, second) = state.on_event(LinkEvent::ChannelClosed, &policy(1));

        let evictions = first
            .iter()
            .chain(second.iter())
            .filter(|a| **a == LinkAction::Evict)
            .count();
        assert_eq!(evictions, 1);
    }

    #[test]
    fn status_wording() {
        assert_eq!(LinkStatus::Connected.message(), "Connected");
        assert_eq!(LinkStatus::Disconnected.message(), "Disconnected");
        assert_eq!(LinkStatus::TimedOut.message(), "Connection Timed Out");
    }
}
