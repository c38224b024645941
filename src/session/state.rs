//! Listener state machine and peer roster.
//!
//! ```text
//!   Disconnected --join()--> Joining --Join(self)--> Joined
//!        ^                      |                      |
//!        +------ Left(self) / Deleted / Error / leave() +
//! ```
//!
//! Events from other participants never move the state; they only update
//! the roster.

use std::collections::BTreeMap;
use std::fmt;

use uuid::Uuid;

use crate::client::{ChannelEvent, ChannelEventKind, Peer};

/// Connection state of the channel listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListenerState {
    /// No channel joined.
    #[default]
    Disconnected,
    /// `join` was called; waiting for our own `Join` event.
    Joining,
    /// Our own `Join` event arrived.
    Joined,
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Disconnected => "disconnected",
            Self::Joining => "joining",
            Self::Joined => "joined",
        };
        f.write_str(text)
    }
}

/// State plus roster, mutated only by the listener task and by
/// `join`/`leave`.
#[derive(Debug, Default)]
pub struct SessionState {
    state: ListenerState,
    self_id: Option<Uuid>,
    peers: BTreeMap<Uuid, Peer>,
    processed: u64,
}

impl SessionState {
    /// Creates a disconnected state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ListenerState {
        self.state
    }

    /// Number of events applied since creation.
    #[must_use]
    pub const fn processed(&self) -> u64 {
        self.processed
    }

    /// Other participants, ordered by user name.
    #[must_use]
    pub fn peers(&self) -> Vec<Peer> {
        let mut peers: Vec<Peer> = self.peers.values().cloned().collect();
        peers.sort_by(|a, b| a.user_name.cmp(&b.user_name).then(a.app.cmp(&b.app)));
        peers
    }

    /// Moves to [`ListenerState::Joining`] on behalf of client `self_id`.
    pub fn begin_join(&mut self, self_id: Uuid) {
        self.reset();
        self.self_id = Some(self_id);
        self.state = ListenerState::Joining;
    }

    /// Moves to [`ListenerState::Disconnected`] and clears the roster.
    pub fn reset(&mut self) {
        self.state = ListenerState::Disconnected;
        self.self_id = None;
        self.peers.clear();
    }

    /// Applies one event, returning the state before and after it.
    pub fn apply(&mut self, event: &ChannelEvent) -> (ListenerState, ListenerState) {
        let before = self.state;
        self.processed += 1;
        if before == ListenerState::Disconnected {
            tracing::debug!(kind = ?event.kind, "event after disconnect ignored");
            return (before, before);
        }

        let from_self = self.self_id == Some(event.from.client_id);
        match event.kind {
            ChannelEventKind::Join if from_self => self.state = ListenerState::Joined,
            ChannelEventKind::Left if from_self => self.reset(),
            ChannelEventKind::Hello | ChannelEventKind::Join if !from_self => {
                self.peers.insert(event.from.client_id, event.from.clone());
            }
            ChannelEventKind::Left => {
                self.peers.remove(&event.from.client_id);
            }
            ChannelEventKind::Deleted | ChannelEventKind::Error => self.reset(),
            ChannelEventKind::Hello | ChannelEventKind::Join | ChannelEventKind::Message => {}
        }
        (before, self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: ChannelEventKind, from: &Peer) -> ChannelEvent {
        ChannelEvent::new(kind, from.clone())
    }

    #[test]
    fn join_message_left_sequence() {
        let me = Peer::new("alice", "test");
        let mut session = SessionState::new();
        assert_eq!(session.state(), ListenerState::Disconnected);

        session.begin_join(me.client_id);
        assert_eq!(session.state(), ListenerState::Joining);

        let mut states = Vec::new();
        for e in [
            event(ChannelEventKind::Join, &me),
            ChannelEvent::message(me.clone(), b"x".to_vec()),
            event(ChannelEventKind::Left, &me),
        ] {
            states.push(session.apply(&e));
        }
        assert_eq!(
            states,
            [
                (ListenerState::Joining, ListenerState::Joined),
                (ListenerState::Joined, ListenerState::Joined),
                (ListenerState::Joined, ListenerState::Disconnected),
            ]
        );
        assert_eq!(session.processed(), 3);
    }

    #[test]
    fn peers_are_tracked_without_state_changes() {
        let me = Peer::new("alice", "test");
        let bob = Peer::new("bob", "test");
        let carol = Peer::new("carol", "kit");
        let mut session = SessionState::new();
        session.begin_join(me.client_id);
        session.apply(&event(ChannelEventKind::Join, &me));

        assert_eq!(
            session.apply(&event(ChannelEventKind::Hello, &bob)),
            (ListenerState::Joined, ListenerState::Joined)
        );
        session.apply(&event(ChannelEventKind::Join, &carol));
        let names: Vec<_> = session.peers().into_iter().map(|p| p.user_name).collect();
        assert_eq!(names, ["bob", "carol"]);

        session.apply(&event(ChannelEventKind::Left, &bob));
        assert_eq!(session.peers(), [carol]);
        assert_eq!(session.state(), ListenerState::Joined);
    }

    #[test]
    fn deleted_and_error_disconnect() {
        let me = Peer::new("alice", "test");
        let server = Peer::new("server", "memory");
        for kind in [ChannelEventKind::Deleted, ChannelEventKind::Error] {
            let mut session = SessionState::new();
            session.begin_join(me.client_id);
            session.apply(&event(ChannelEventKind::Join, &me));
            assert_eq!(
                session.apply(&event(kind, &server)),
                (ListenerState::Joined, ListenerState::Disconnected)
            );
            assert!(session.peers().is_empty());
        }
    }

    #[test]
    fn stale_events_after_disconnect_are_ignored() {
        let me = Peer::new("alice", "test");
        let bob = Peer::new("bob", "test");
        let mut session = SessionState::new();
        session.apply(&event(ChannelEventKind::Join, &bob));
        assert!(session.peers().is_empty());
        assert_eq!(session.state(), ListenerState::Disconnected);
        assert_eq!(session.processed(), 1);

        session.begin_join(me.client_id);
        session.reset();
        session.apply(&event(ChannelEventKind::Join, &me));
        assert_eq!(session.state(), ListenerState::Disconnected);
    }
}
