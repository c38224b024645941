//! Channel rooms of the in-process server.
//!
//! Each joined member owns a `std::sync::mpsc` queue drained by a
//! dedicated delivery thread that invokes the member's callback. Dropping
//! the member's sender ends that thread once the queue is drained.

use std::sync::mpsc;

use crate::client::{ChannelCallback, ChannelEvent, ChannelEventKind, ChannelHandle, Peer};
use crate::error::SampleError;

/// One member of a channel room.
#[derive(Debug)]
pub(super) struct Member {
    pub(super) handle: ChannelHandle,
    pub(super) peer: Peer,
    tx: mpsc::Sender<ChannelEvent>,
}

impl Member {
    /// Spawns the delivery thread and returns the member.
    pub(super) fn spawn(
        handle: ChannelHandle,
        peer: Peer,
        on_event: ChannelCallback,
    ) -> Result<Self, SampleError> {
        let (tx, rx) = mpsc::channel::<ChannelEvent>();
        std::thread::Builder::new()
            .name(format!("channel-{}", handle.as_raw()))
            .spawn(move || {
                for event in rx {
                    on_event(event);
                }
            })
            .map_err(|e| SampleError::Internal(format!("cannot start channel thread: {e}")))?;
        Ok(Self { handle, peer, tx })
    }

    /// Queues an event; a member whose thread is gone is simply skipped.
    pub(super) fn deliver(&self, event: ChannelEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!(handle = %self.handle, "channel member delivery thread gone");
        }
    }
}

/// Members of one channel URL, in join order.
#[derive(Debug, Default)]
pub(super) struct ChannelRoom {
    members: Vec<Member>,
}

impl ChannelRoom {
    /// Adds a member and performs the join handshake: existing members see
    /// `Join`, the newcomer sees its own `Join` followed by one `Hello` per
    /// existing member.
    pub(super) fn join(&mut self, member: Member) {
        for existing in &self.members {
            existing.deliver(ChannelEvent::new(ChannelEventKind::Join, member.peer.clone()));
        }
        member.deliver(ChannelEvent::new(ChannelEventKind::Join, member.peer.clone()));
        for existing in &self.members {
            member.deliver(ChannelEvent::new(ChannelEventKind::Hello, existing.peer.clone()));
        }
        self.members.push(member);
    }

    /// Removes a member. Everyone, including the leaver, sees `Left`.
    /// Returns `false` if the handle is not a member.
    pub(super) fn leave(&mut self, handle: ChannelHandle) -> bool {
        let Some(idx) = self.members.iter().position(|m| m.handle == handle) else {
            return false;
        };
        let member = self.members.remove(idx);
        let event = ChannelEvent::new(ChannelEventKind::Left, member.peer.clone());
        for other in &self.members {
            other.deliver(event.clone());
        }
        member.deliver(event);
        true
    }

    /// Publishes a payload to every member, the sender included.
    pub(super) fn broadcast(&self, from: &Peer, content: &[u8]) {
        let event = ChannelEvent::message(from.clone(), content.to_vec());
        for member in &self.members {
            member.deliver(event.clone());
        }
    }

    /// Tells every member the room is gone and drops them.
    pub(super) fn close(self, kind: ChannelEventKind, server: &Peer) {
        for member in self.members {
            member.deliver(ChannelEvent::new(kind, server.clone()));
        }
    }

    /// Returns the member with the given handle.
    pub(super) fn member(&self, handle: ChannelHandle) -> Option<&Member> {
        self.members.iter().find(|m| m.handle == handle)
    }

    pub(super) fn len(&self) -> usize {
        self.members.len()
    }

    pub(super) fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
