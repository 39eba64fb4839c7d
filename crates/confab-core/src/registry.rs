//! Live room membership.
//!
//! The registry maps each room to the participants currently connected to it
//! and their outbound handles. Rooms exist only while they have members: the
//! first join creates the entry and the last leave removes it.

use crate::member::{MemberHandle, Outbound, SessionId};
use crate::{ParticipantId, RoomId};
use confab_protocol::Notification;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Maximum room identifier length.
pub const MAX_ROOM_ID_LENGTH: usize = 256;

/// Default per-session outbound queue capacity.
const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Validate a room identifier.
///
/// # Errors
///
/// Returns an error message if the identifier is invalid.
pub fn validate_room_id(room: &str) -> Result<(), &'static str> {
    if room.is_empty() {
        return Err("Room ID cannot be empty");
    }
    if room.len() > MAX_ROOM_ID_LENGTH {
        return Err("Room ID too long");
    }
    if room.chars().any(char::is_control) {
        return Err("Room ID contains invalid characters");
    }
    Ok(())
}

/// Members of one room, by participant.
pub type Membership = HashMap<ParticipantId, MemberHandle>;

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Capacity of each session's outbound queue.
    pub outbound_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

/// Result of a fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Recipients whose queue accepted the notification.
    pub delivered: usize,
    /// Recipients whose delivery failed.
    pub failed: usize,
}

impl Delivery {
    /// Record one delivery attempt.
    pub fn record(&mut self, delivered: bool) {
        if delivered {
            self.delivered += 1;
        } else {
            self.failed += 1;
        }
    }

    /// Total recipients attempted.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed
    }
}

/// The room registry.
///
/// Each room entry is guarded by the map's lock for the duration of a single
/// map operation only; deliveries happen on a snapshot, after the lock is
/// released, and never wait on a recipient.
pub struct RoomRegistry {
    /// Members indexed by room.
    rooms: DashMap<RoomId, Membership>,
    /// Configuration.
    config: RegistryConfig,
}

impl RoomRegistry {
    /// Create a new registry with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry with custom configuration.
    #[must_use]
    pub fn with_config(config: RegistryConfig) -> Self {
        info!("Creating room registry with config: {:?}", config);
        Self {
            rooms: DashMap::new(),
            config,
        }
    }

    /// Create an outbound queue for a new session, sized per configuration.
    #[must_use]
    pub fn open_queue(
        &self,
        participant: ParticipantId,
    ) -> (MemberHandle, tokio::sync::mpsc::Receiver<Outbound>) {
        MemberHandle::channel(participant, self.config.outbound_capacity)
    }

    /// Register `handle` as the delivery target for its participant in `room`.
    ///
    /// Creates the room if needed. An existing entry for the same participant
    /// is replaced and returned; the replaced session is not notified.
    pub fn join(&self, room: &str, handle: MemberHandle) -> Option<MemberHandle> {
        let participant = handle.participant();
        let session = handle.session();

        let mut members = self.rooms.entry(room.to_string()).or_insert_with(|| {
            debug!(room = %room, "Creating room");
            Membership::new()
        });
        let replaced = members.insert(participant, handle);

        debug!(
            room = %room,
            participant,
            session = %session,
            members = members.len(),
            replaced = replaced.is_some(),
            "Joined"
        );

        replaced
    }

    /// Remove `participant` from `room`, whichever session it belongs to.
    ///
    /// Leaving a participant that is not present is a no-op.
    pub fn leave(&self, room: &str, participant: ParticipantId) -> Option<MemberHandle> {
        self.remove_member(room, participant, |_| true)
    }

    /// Remove `participant` from `room` only if the entry still belongs to
    /// `session`.
    ///
    /// A session replaced by a later join for the same participant uses this
    /// so that its own termination cannot evict its replacement.
    pub fn leave_session(
        &self,
        room: &str,
        participant: ParticipantId,
        session: SessionId,
    ) -> Option<MemberHandle> {
        self.remove_member(room, participant, |handle| handle.session() == session)
    }

    fn remove_member(
        &self,
        room: &str,
        participant: ParticipantId,
        owned: impl FnOnce(&MemberHandle) -> bool,
    ) -> Option<MemberHandle> {
        let removed = {
            let mut members = self.rooms.get_mut(room)?;
            match members.get(&participant) {
                Some(handle) if owned(handle) => members.remove(&participant),
                _ => None,
            }
        };

        if removed.is_some() {
            debug!(room = %room, participant, "Left");

            // Checked under the entry lock, so a concurrent join keeps the room.
            if self.rooms.remove_if(room, |_, members| members.is_empty()).is_some() {
                debug!(room = %room, "Deleted empty room");
            }
        }

        removed
    }

    /// Point-in-time copy of a room's members.
    ///
    /// Membership may change as soon as this returns.
    #[must_use]
    pub fn snapshot(&self, room: &str) -> Membership {
        self.rooms
            .get(room)
            .map(|members| members.clone())
            .unwrap_or_default()
    }

    /// Deliver `notification` to every member of `room` accepted by `predicate`.
    ///
    /// Each recipient is handled independently; a failure for one never
    /// affects the others.
    pub fn broadcast(
        &self,
        room: &str,
        notification: Notification,
        predicate: impl Fn(ParticipantId) -> bool,
    ) -> Delivery {
        let members = self.snapshot(room);
        let notification: Outbound = Arc::new(notification);
        let mut delivery = Delivery::default();

        for (participant, handle) in &members {
            if predicate(*participant) {
                delivery.record(handle.deliver(room, Arc::clone(&notification)));
            }
        }

        trace!(
            room = %room,
            kind = notification.type_name(),
            delivered = delivery.delivered,
            failed = delivery.failed,
            "Broadcast"
        );

        delivery
    }

    /// Deliver `notification` to every member of `room`.
    pub fn broadcast_all(&self, room: &str, notification: Notification) -> Delivery {
        self.broadcast(room, notification, |_| true)
    }

    /// Check if a room currently has an entry.
    #[must_use]
    pub fn room_exists(&self, room: &str) -> bool {
        self.rooms.contains_key(room)
    }

    /// Whether `participant` is live in `room`.
    #[must_use]
    pub fn is_member(&self, room: &str, participant: ParticipantId) -> bool {
        self.rooms
            .get(room)
            .is_some_and(|members| members.contains_key(&participant))
    }

    /// Get the member count for a room.
    #[must_use]
    pub fn member_count(&self, room: &str) -> usize {
        self.rooms.get(room).map(|m| m.len()).unwrap_or(0)
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            room_count: self.rooms.len(),
            member_count: self.rooms.iter().map(|e| e.value().len()).sum(),
        }
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of live rooms.
    pub room_count: usize,
    /// Number of live memberships across all rooms.
    pub member_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn left(n: ParticipantId) -> Notification {
        Notification::left("room", n)
    }

    #[test]
    fn test_join_and_leave_removes_empty_room() {
        let registry = RoomRegistry::new();
        let (handle, _rx) = registry.open_queue(1);

        assert!(registry.join("room", handle).is_none());
        assert!(registry.room_exists("room"));
        assert_eq!(registry.member_count("room"), 1);

        assert!(registry.leave("room", 1).is_some());
        assert!(!registry.room_exists("room"));
    }

    #[test]
    fn test_room_is_recreated_fresh() {
        let registry = RoomRegistry::new();
        let (a, _rx_a) = registry.open_queue(1);
        let (b, _rx_b) = registry.open_queue(2);

        registry.join("room", a);
        registry.leave("room", 1);
        registry.join("room", b);

        let snapshot = registry.snapshot("room");
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains_key(&2));
        assert!(!registry.is_member("room", 1));
    }

    #[test]
    fn test_leave_is_idempotent() {
        let registry = RoomRegistry::new();
        let (a, _rx_a) = registry.open_queue(1);
        let (b, _rx_b) = registry.open_queue(2);
        registry.join("room", a);
        registry.join("room", b);

        assert!(registry.leave("room", 1).is_some());
        assert!(registry.leave("room", 1).is_none());
        assert!(registry.leave("elsewhere", 1).is_none());
        assert_eq!(registry.member_count("room"), 1);
    }

    #[test]
    fn test_rejoin_replaces_only_that_participant() {
        let registry = RoomRegistry::new();
        let (first, _rx1) = registry.open_queue(1);
        let (other, _rx2) = registry.open_queue(2);
        let (second, _rx3) = registry.open_queue(1);
        let first_session = first.session();
        let other_session = other.session();
        let second_session = second.session();

        registry.join("room", first);
        registry.join("room", other);
        let replaced = registry.join("room", second).unwrap();
        assert_eq!(replaced.session(), first_session);

        let snapshot = registry.snapshot("room");
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[&1].session(), second_session);
        assert_eq!(snapshot[&2].session(), other_session);
    }

    #[test]
    fn test_orphaned_session_cannot_evict_replacement() {
        let registry = RoomRegistry::new();
        let (first, _rx1) = registry.open_queue(1);
        let (second, _rx2) = registry.open_queue(1);
        let first_session = first.session();
        let second_session = second.session();

        registry.join("room", first);
        registry.join("room", second);

        assert!(registry.leave_session("room", 1, first_session).is_none());
        assert!(registry.is_member("room", 1));

        assert!(registry.leave_session("room", 1, second_session).is_some());
        assert!(!registry.room_exists("room"));
    }

    #[test]
    fn test_broadcast_reaches_every_member() {
        let registry = RoomRegistry::new();
        let (a, mut rx_a) = registry.open_queue(1);
        let (b, mut rx_b) = registry.open_queue(2);
        registry.join("room", a);
        registry.join("room", b);

        let delivery = registry.broadcast_all("room", left(9));
        assert_eq!(delivery, Delivery { delivered: 2, failed: 0 });
        assert_eq!(*rx_a.try_recv().unwrap(), left(9));
        assert_eq!(*rx_b.try_recv().unwrap(), left(9));
    }

    #[test]
    fn test_broadcast_with_predicate() {
        let registry = RoomRegistry::new();
        let (a, mut rx_a) = registry.open_queue(1);
        let (b, mut rx_b) = registry.open_queue(2);
        registry.join("room", a);
        registry.join("room", b);

        let delivery = registry.broadcast("room", left(9), |p| p != 1);
        assert_eq!(delivery.attempted(), 1);
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn test_broadcast_isolates_failed_recipient() {
        let registry = RoomRegistry::new();
        let (gone, rx_gone) = registry.open_queue(1);
        let (live, mut rx_live) = registry.open_queue(2);
        registry.join("room", gone);
        registry.join("room", live);
        drop(rx_gone);

        let delivery = registry.broadcast_all("room", left(9));
        assert_eq!(delivery, Delivery { delivered: 1, failed: 1 });
        assert_eq!(*rx_live.try_recv().unwrap(), left(9));
    }

    #[test]
    fn test_broadcast_to_missing_room() {
        let registry = RoomRegistry::new();
        assert_eq!(registry.broadcast_all("nowhere", left(1)).attempted(), 0);
        assert!(registry.snapshot("nowhere").is_empty());
    }

    #[test]
    fn test_room_id_validation() {
        assert!(validate_room_id("0f8e7c1a-room").is_ok());
        assert!(validate_room_id("").is_err());
        assert!(validate_room_id("bad\nroom").is_err());
        assert!(validate_room_id("bad\u{7f}room").is_err());
        assert!(validate_room_id("部屋-1").is_ok());

        let long_id = "a".repeat(MAX_ROOM_ID_LENGTH + 1);
        assert!(validate_room_id(&long_id).is_err());
    }

    #[test]
    fn test_registry_stats() {
        let registry = RoomRegistry::new();
        let (a, _rx_a) = registry.open_queue(1);
        let (b, _rx_b) = registry.open_queue(2);
        let (c, _rx_c) = registry.open_queue(1);
        registry.join("room-1", a);
        registry.join("room-1", b);
        registry.join("room-2", c);

        let stats = registry.stats();
        assert_eq!(stats.room_count, 2);
        assert_eq!(stats.member_count, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_join_leave_keeps_rooms_consistent() {
        let registry = Arc::new(RoomRegistry::new());
        let mut tasks = Vec::new();

        for participant in 0..32 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                for _ in 0..50 {
                    let (handle, _rx) = registry.open_queue(participant);
                    let session = handle.session();
                    registry.join("busy", handle);
                    tokio::task::yield_now().await;
                    registry.leave_session("busy", participant, session);
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert!(!registry.room_exists("busy"));
        assert_eq!(registry.stats().member_count, 0);
    }
}
