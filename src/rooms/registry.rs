//! Concurrency-safe room -> member-set store with join/leave/broadcast.

use dashmap::DashMap;
use std::sync::Arc;

use crate::rooms::{ConnectionId, RoomEvent};
use crate::ws::protocol::SignalMessage;
use crate::ws::{ConnectionSender, Outbound};

/// One member of a room: the connection's identity plus the sender half of
/// its outbound queue.
#[derive(Debug, Clone)]
struct Member {
    id: ConnectionId,
    tx: ConnectionSender,
}

/// State for a single room.
#[derive(Debug, Clone, Default)]
struct Room {
    members: Vec<Member>,
}

/// In-memory room membership registry.
///
/// room name -> Room, using a DashMap for concurrent access consistent with
/// the per-room exclusion discipline: membership mutation and broadcast
/// snapshotting serialize on the room's map entry, while operations on
/// different rooms proceed without a shared lock.
#[derive(Debug, Clone)]
pub struct RoomRegistry {
    rooms: Arc<DashMap<String, Room>>,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
        }
    }

    /// Add a connection to a room, creating the room entry if absent.
    ///
    /// Idempotent per (room, id): joining twice with the same id replaces
    /// the earlier member entry instead of duplicating it.
    pub fn join(&self, room_name: &str, id: ConnectionId, tx: ConnectionSender) {
        let mut entry = self.rooms.entry(room_name.to_string()).or_default();
        let room = entry.value_mut();

        room.members.retain(|m| m.id != id);
        room.members.push(Member { id, tx });

        tracing::debug!(
            room = %room_name,
            conn = %id.short(),
            members = room.members.len(),
            "joined room"
        );
    }

    /// Remove a connection from a room.
    ///
    /// A no-op if the connection was never a member or the room does not
    /// exist; the room entry is dropped once its member set is empty.
    pub fn leave(&self, room_name: &str, id: ConnectionId) {
        let mut removed = false;
        if let Some(mut entry) = self.rooms.get_mut(room_name) {
            let before = entry.value().members.len();
            entry.value_mut().members.retain(|m| m.id != id);
            removed = entry.value().members.len() < before;
        }

        // Clean up empty rooms. The emptiness check and the removal must be
        // one atomic step: a join can land between releasing the entry guard
        // above and this call, and its membership must survive.
        self.rooms
            .remove_if(room_name, |_, room| room.members.is_empty());

        if removed {
            tracing::debug!(room = %room_name, conn = %id.short(), "left room");
        } else {
            tracing::debug!(
                room = %room_name,
                conn = %id.short(),
                "leave with no membership"
            );
        }
    }

    /// Fan a message out to every member of a room except the sender.
    ///
    /// The member set is snapshotted under the room's map entry, then each
    /// recipient is delivered to independently: a failed delivery (the
    /// peer's writer task is already gone) is logged and skipped without
    /// affecting the remaining recipients or the caller. Broadcasting into
    /// a missing or empty room is a no-op.
    ///
    /// Returns the number of recipients delivered to.
    pub fn broadcast(
        &self,
        room_name: &str,
        sender: ConnectionId,
        message: SignalMessage,
    ) -> usize {
        let members: Vec<Member> = self
            .rooms
            .get(room_name)
            .map(|entry| entry.value().members.clone())
            .unwrap_or_default();

        let mut delivered = 0;
        for member in &members {
            if member.id == sender {
                continue;
            }
            let event = RoomEvent {
                sender,
                message: message.clone(),
            };
            if member.tx.send(Outbound::Event(event)).is_err() {
                // The recipient is mid-disconnect; its leave call will
                // remove the stale entry.
                tracing::warn!(
                    room = %room_name,
                    conn = %member.id.short(),
                    "delivery failed, recipient queue closed"
                );
            } else {
                delivered += 1;
            }
        }

        delivered
    }

    /// Number of members currently in a room (0 if the room does not exist).
    pub fn member_count(&self, room_name: &str) -> usize {
        self.rooms
            .get(room_name)
            .map(|entry| entry.value().members.len())
            .unwrap_or(0)
    }

    /// Number of rooms with at least one member.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn member() -> (ConnectionId, ConnectionSender, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionId::new(), tx, rx)
    }

    fn msg(kind: &str) -> SignalMessage {
        SignalMessage::parse(&format!(r#"{{"type":"{kind}"}}"#)).unwrap()
    }

    fn recv_event(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Option<RoomEvent> {
        match rx.try_recv() {
            Ok(Outbound::Event(event)) => Some(event),
            _ => None,
        }
    }

    #[test]
    fn join_is_idempotent() {
        let registry = RoomRegistry::new();
        let (id, tx, _rx) = member();

        registry.join("alpha", id, tx.clone());
        registry.join("alpha", id, tx);

        assert_eq!(registry.member_count("alpha"), 1);
    }

    #[test]
    fn leave_without_join_and_double_leave_are_noops() {
        let registry = RoomRegistry::new();
        let (id, tx, _rx) = member();

        registry.leave("alpha", id);

        registry.join("alpha", id, tx);
        registry.leave("alpha", id);
        registry.leave("alpha", id);

        assert_eq!(registry.member_count("alpha"), 0);
    }

    #[test]
    fn empty_room_is_dropped_on_last_leave() {
        let registry = RoomRegistry::new();
        let (id, tx, _rx) = member();

        registry.join("alpha", id, tx);
        assert_eq!(registry.room_count(), 1);

        registry.leave("alpha", id);
        assert_eq!(registry.room_count(), 0);
    }

    #[test]
    fn broadcast_excludes_sender() {
        let registry = RoomRegistry::new();
        let (a, a_tx, mut a_rx) = member();
        let (b, b_tx, mut b_rx) = member();
        let (c, c_tx, mut c_rx) = member();

        registry.join("alpha", a, a_tx);
        registry.join("alpha", b, b_tx);
        registry.join("alpha", c, c_tx);

        let delivered = registry.broadcast("alpha", a, msg("offer"));
        assert_eq!(delivered, 2);

        assert!(recv_event(&mut a_rx).is_none(), "sender must not receive its own message");

        let b_event = recv_event(&mut b_rx).expect("b should receive one copy");
        assert_eq!(b_event.sender, a);
        assert_eq!(b_event.message.kind(), "offer");
        assert!(recv_event(&mut b_rx).is_none(), "b should receive exactly one copy");

        assert!(recv_event(&mut c_rx).is_some(), "c should receive one copy");
    }

    #[test]
    fn rooms_are_isolated() {
        let registry = RoomRegistry::new();
        let (a, a_tx, _a_rx) = member();
        let (b, b_tx, mut b_rx) = member();

        registry.join("alpha", a, a_tx);
        registry.join("beta", b, b_tx);

        let delivered = registry.broadcast("alpha", a, msg("offer"));
        assert_eq!(delivered, 0);
        assert!(recv_event(&mut b_rx).is_none());
    }

    #[test]
    fn failed_delivery_does_not_affect_other_recipients() {
        let registry = RoomRegistry::new();
        let (a, a_tx, _a_rx) = member();
        let (b, b_tx, b_rx) = member();
        let (c, c_tx, mut c_rx) = member();

        registry.join("alpha", a, a_tx);
        registry.join("alpha", b, b_tx);
        registry.join("alpha", c, c_tx);

        // B's writer task is gone: its receiver is dropped.
        drop(b_rx);

        let delivered = registry.broadcast("alpha", a, msg("ice"));
        assert_eq!(delivered, 1);
        assert!(recv_event(&mut c_rx).is_some(), "c still receives despite b's failure");
    }

    #[test]
    fn broadcast_to_missing_room_is_noop() {
        let registry = RoomRegistry::new();
        let (a, _a_tx, _a_rx) = member();

        assert_eq!(registry.broadcast("nowhere", a, msg("offer")), 0);
    }

    #[test]
    fn concurrent_last_leave_does_not_evict_fresh_joiner() {
        let registry = RoomRegistry::new();

        // Churn the leave-of-last-member / join window: the empty-room
        // cleanup must never delete an entry that a concurrent join just
        // populated.
        for _ in 0..1000 {
            let (a, a_tx, _a_rx) = member();
            let (b, b_tx, mut b_rx) = member();

            registry.join("churn", a, a_tx);

            let reg = registry.clone();
            let leaver = std::thread::spawn(move || reg.leave("churn", a));
            registry.join("churn", b, b_tx);
            leaver.join().unwrap();

            assert_eq!(
                registry.member_count("churn"),
                1,
                "fresh joiner lost to empty-room cleanup"
            );

            // The surviving member is reachable by broadcast
            registry.broadcast("churn", a, msg("offer"));
            assert!(recv_event(&mut b_rx).is_some());

            registry.leave("churn", b);
        }
    }

    #[test]
    fn successive_broadcasts_arrive_in_order() {
        let registry = RoomRegistry::new();
        let (a, a_tx, _a_rx) = member();
        let (b, b_tx, mut b_rx) = member();

        registry.join("alpha", a, a_tx);
        registry.join("alpha", b, b_tx);

        registry.broadcast("alpha", a, msg("offer"));
        registry.broadcast("alpha", a, msg("ice"));

        assert_eq!(recv_event(&mut b_rx).unwrap().message.kind(), "offer");
        assert_eq!(recv_event(&mut b_rx).unwrap().message.kind(), "ice");
    }
}
