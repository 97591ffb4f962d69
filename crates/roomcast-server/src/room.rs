//! A room: a capacity-bounded set of connections sharing one broadcast
//! domain.
//!
//! Membership changes and the recipient snapshot taken by
//! [`Room::broadcast`] happen under the same lock, so a frame reaches
//! exactly the members present at that instant. Enqueueing happens after
//! the lock is released and never waits.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use roomcast_core::{ConnectionId, ExcludeSet, Frame, RelayError, Result, RoomId};
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::websocket::connection::{Connection, Enqueue};

/// Outcome of one [`Room::broadcast`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Members selected after exclusion.
    pub recipients: usize,
    /// Frames queued.
    pub delivered: usize,
    /// Frames dropped on full queues.
    pub dropped: usize,
}

/// Serializable view of a room.
#[derive(Clone, Debug, Serialize)]
pub struct RoomInfo {
    /// Room id.
    pub id: RoomId,
    /// Capacity; `0` means unbounded.
    pub capacity: usize,
    /// Current member count.
    pub users: usize,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

struct RoomState {
    members: HashMap<ConnectionId, Arc<Connection>>,
    last_activity: Instant,
    closed: bool,
}

/// One room.
pub struct Room {
    id: RoomId,
    capacity: usize,
    created_at: DateTime<Utc>,
    state: Mutex<RoomState>,
}

impl Room {
    /// Create an empty room. `capacity == 0` means unbounded.
    pub fn new(id: RoomId, capacity: usize) -> Self {
        Self {
            id,
            capacity,
            created_at: Utc::now(),
            state: Mutex::new(RoomState {
                members: HashMap::new(),
                last_activity: Instant::now(),
                closed: false,
            }),
        }
    }

    /// Room id.
    pub fn id(&self) -> RoomId {
        self.id
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Creation time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Admit `connection`.
    ///
    /// Fails with [`RelayError::CapacityExceeded`] when the room is full and
    /// [`RelayError::RoomClosed`] once the room was evicted or torn down.
    /// The capacity check and the insert are one critical section.
    pub fn join(&self, connection: Arc<Connection>) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(RelayError::RoomClosed(self.id));
        }
        if self.capacity > 0 && state.members.len() >= self.capacity {
            return Err(RelayError::CapacityExceeded {
                room_id: self.id,
                capacity: self.capacity,
            });
        }
        let id = connection.id();
        let _ = state.members.insert(id, connection);
        state.last_activity = Instant::now();
        debug!(room_id = %self.id, connection_id = %id, users = state.members.len(), "joined room");
        Ok(())
    }

    /// Remove a member. Returns it if it was present; a second call for the
    /// same id returns `None`.
    pub fn leave(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        let mut state = self.state.lock();
        let removed = state.members.remove(id);
        if removed.is_some() {
            state.last_activity = Instant::now();
            debug!(
                room_id = %self.id,
                connection_id = %id,
                users = state.members.len(),
                "left room"
            );
        }
        removed
    }

    /// Queue `frame` for every member not in `exclude`.
    pub fn broadcast(&self, frame: &Frame, exclude: &ExcludeSet) -> BroadcastReport {
        let recipients: Vec<Arc<Connection>> = {
            let state = self.state.lock();
            state
                .members
                .iter()
                .filter(|(id, _)| !exclude.contains(id))
                .map(|(_, conn)| Arc::clone(conn))
                .collect()
        };

        let mut report = BroadcastReport {
            recipients: recipients.len(),
            ..BroadcastReport::default()
        };
        for conn in recipients {
            match conn.enqueue(frame.clone()) {
                Enqueue::Queued => report.delivered += 1,
                Enqueue::Dropped => report.dropped += 1,
                Enqueue::Closed => {}
            }
        }
        report
    }

    /// Current member count.
    pub fn len(&self) -> usize {
        self.state.lock().members.len()
    }

    /// Whether the room has no members.
    pub fn is_empty(&self) -> bool {
        self.state.lock().members.is_empty()
    }

    /// Whether `id` is a member.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.state.lock().members.contains_key(id)
    }

    /// Whether the room was evicted or torn down.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Whether the room is empty and idle for longer than `ttl` at `now`.
    pub fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        let state = self.state.lock();
        Self::expired(&state, now, ttl)
    }

    /// Close the room if it is expired. Once this returns `true` every
    /// later [`join`](Self::join) fails, so nobody joins a room that is
    /// about to disappear from the registry.
    pub(crate) fn retire_if_expired(&self, now: Instant, ttl: Duration) -> bool {
        let mut state = self.state.lock();
        if state.closed || !Self::expired(&state, now, ttl) {
            return false;
        }
        state.closed = true;
        true
    }

    /// Close the room and signal every member to disconnect.
    ///
    /// Members stay listed until their own sessions call
    /// [`leave`](Self::leave), so the usual departure notices still go out.
    pub(crate) fn close(&self) -> usize {
        let members: Vec<Arc<Connection>> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.members.values().cloned().collect()
        };
        for conn in &members {
            conn.close();
        }
        members.len()
    }

    /// Serializable snapshot.
    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            id: self.id,
            capacity: self.capacity,
            users: self.len(),
            created_at: self.created_at,
        }
    }

    fn expired(state: &RoomState, now: Instant, ttl: Duration) -> bool {
        state.members.is_empty() && now.saturating_duration_since(state.last_activity) > ttl
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("capacity", &self.capacity)
            .field("users", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn member(room: &Room, queue: usize) -> (Arc<Connection>, mpsc::Receiver<Frame>) {
        let (conn, rx) =
            Connection::new(ConnectionId::new(), room.id(), queue, CancellationToken::new());
        (Arc::new(conn), rx)
    }

    fn drain(rx: &mut mpsc::Receiver<Frame>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(frame.as_str().to_string());
        }
        out
    }

    #[test]
    fn capacity_is_enforced_and_freed_on_leave() {
        let room = Room::new(RoomId::new(), 2);
        let (a, _ra) = member(&room, 4);
        let (b, _rb) = member(&room, 4);
        let (c, _rc) = member(&room, 4);

        room.join(a.clone()).unwrap();
        room.join(b).unwrap();
        assert_matches!(
            room.join(c.clone()),
            Err(RelayError::CapacityExceeded { capacity: 2, .. })
        );
        assert!(!room.contains(&c.id()));

        assert!(room.leave(&a.id()).is_some());
        room.join(c.clone()).unwrap();
        assert_eq!(room.len(), 2);
        assert!(room.contains(&c.id()));
    }

    #[test]
    fn concurrent_joins_never_exceed_capacity() {
        let room = Arc::new(Room::new(RoomId::new(), 3));
        let barrier = Arc::new(std::sync::Barrier::new(32));
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let room = Arc::clone(&room);
                let barrier = Arc::clone(&barrier);
                let (conn, rx) = member(&room, 1);
                std::thread::spawn(move || {
                    let _rx = rx;
                    let _ = barrier.wait();
                    room.join(conn)
                })
            })
            .collect();

        let results: Vec<Result<()>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let admitted = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(admitted, 3);
        assert!(
            results
                .iter()
                .filter_map(|r| r.as_ref().err())
                .all(|e| matches!(e, RelayError::CapacityExceeded { capacity: 3, .. }))
        );
        assert_eq!(room.len(), 3);
    }

    #[test]
    fn zero_capacity_is_unbounded() {
        let room = Room::new(RoomId::new(), 0);
        let mut keep = Vec::new();
        for _ in 0..50 {
            let (conn, rx) = member(&room, 1);
            room.join(conn).unwrap();
            keep.push(rx);
        }
        assert_eq!(room.len(), 50);
    }

    #[test]
    fn leave_twice_is_noop() {
        let room = Room::new(RoomId::new(), 2);
        let (a, _ra) = member(&room, 4);
        room.join(a.clone()).unwrap();
        assert!(room.leave(&a.id()).is_some());
        assert!(room.leave(&a.id()).is_none());
        assert!(room.is_empty());
    }

    #[test]
    fn broadcast_skips_excluded_sender() {
        let room = Room::new(RoomId::new(), 8);
        let (a, mut ra) = member(&room, 4);
        let (b, mut rb) = member(&room, 4);
        let (c, mut rc) = member(&room, 4);
        for conn in [&a, &b, &c] {
            room.join(Arc::clone(conn)).unwrap();
        }

        let report = room.broadcast(&Frame::from("hi"), &ExcludeSet::only(a.id()));
        assert_eq!(
            report,
            BroadcastReport { recipients: 2, delivered: 2, dropped: 0 }
        );
        assert!(drain(&mut ra).is_empty());
        assert_eq!(drain(&mut rb), vec!["hi"]);
        assert_eq!(drain(&mut rc), vec!["hi"]);
    }

    #[test]
    fn broadcast_preserves_per_sender_order() {
        let room = Room::new(RoomId::new(), 8);
        let (a, _ra) = member(&room, 16);
        let (b, mut rb) = member(&room, 16);
        room.join(a.clone()).unwrap();
        room.join(b).unwrap();

        let exclude = ExcludeSet::only(a.id());
        for i in 0..10 {
            let _ = room.broadcast(&Frame::from(format!("{i}")), &exclude);
        }
        let expected: Vec<String> = (0..10).map(|i| i.to_string()).collect();
        assert_eq!(drain(&mut rb), expected);
    }

    #[test]
    fn slow_member_does_not_block_others() {
        let room = Room::new(RoomId::new(), 8);
        let (sender, _rs) = member(&room, 4);
        let (slow, mut slow_rx) = member(&room, 1);
        let (fast, mut fast_rx) = member(&room, 16);
        for conn in [&sender, &slow, &fast] {
            room.join(Arc::clone(conn)).unwrap();
        }

        let exclude = ExcludeSet::only(sender.id());
        let mut dropped = 0;
        for i in 0..5 {
            dropped += room.broadcast(&Frame::from(format!("{i}")), &exclude).dropped;
        }
        assert_eq!(dropped, 4);
        assert_eq!(slow.dropped_frames(), 4);
        assert_eq!(drain(&mut slow_rx), vec!["0"]);
        assert_eq!(drain(&mut fast_rx).len(), 5);
    }

    #[test]
    fn closed_member_is_skipped() {
        let room = Room::new(RoomId::new(), 8);
        let (a, _ra) = member(&room, 4);
        let (b, mut rb) = member(&room, 4);
        room.join(a).unwrap();
        room.join(b.clone()).unwrap();
        b.close();

        let report = room.broadcast(&Frame::from("x"), &ExcludeSet::none());
        assert_eq!(report.recipients, 2);
        assert_eq!(report.delivered, 1);
        assert!(drain(&mut rb).is_empty());
    }

    #[test]
    fn departed_member_receives_nothing() {
        let room = Room::new(RoomId::new(), 8);
        let (a, _ra) = member(&room, 4);
        let (b, mut rb) = member(&room, 4);
        room.join(a).unwrap();
        room.join(b.clone()).unwrap();
        let _ = room.leave(&b.id());

        let report = room.broadcast(&Frame::from("after"), &ExcludeSet::none());
        assert_eq!(report.recipients, 1);
        assert!(drain(&mut rb).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_requires_empty_and_idle() {
        let ttl = Duration::from_secs(300);
        let room = Room::new(RoomId::new(), 8);
        let (a, _ra) = member(&room, 4);
        room.join(a.clone()).unwrap();

        tokio::time::advance(Duration::from_secs(400)).await;
        assert!(!room.is_expired(Instant::now(), ttl), "occupied rooms never expire");

        let _ = room.leave(&a.id());
        assert!(!room.is_expired(Instant::now(), ttl), "leave refreshes activity");

        tokio::time::advance(Duration::from_secs(301)).await;
        assert!(room.is_expired(Instant::now(), ttl));
    }

    #[tokio::test(start_paused = true)]
    async fn retired_room_refuses_joins() {
        let ttl = Duration::from_secs(1);
        let room = Room::new(RoomId::new(), 8);
        tokio::time::advance(Duration::from_secs(2)).await;

        assert!(room.retire_if_expired(Instant::now(), ttl));
        assert!(!room.retire_if_expired(Instant::now(), ttl));
        let (a, _ra) = member(&room, 4);
        assert_matches!(room.join(a), Err(RelayError::RoomClosed(_)));
    }

    #[test]
    fn close_signals_members_and_refuses_joins() {
        let room = Room::new(RoomId::new(), 8);
        let (a, _ra) = member(&room, 4);
        let (b, _rb) = member(&room, 4);
        room.join(a.clone()).unwrap();
        room.join(b.clone()).unwrap();

        assert_eq!(room.close(), 2);
        assert!(a.is_closed() && b.is_closed());
        assert!(room.is_closed());
        let (c, _rc) = member(&room, 4);
        assert_matches!(room.join(c), Err(RelayError::RoomClosed(_)));
    }

    #[test]
    fn info_serializes() {
        let room = Room::new(RoomId::new(), 3);
        let json = serde_json::to_value(room.info()).unwrap();
        assert_eq!(json["id"], room.id().to_string());
        assert_eq!(json["capacity"], 3);
        assert_eq!(json["users"], 0);
        assert!(json["created_at"].is_string());
    }

    proptest! {
        #[test]
        fn broadcast_reaches_everyone_but_the_sender(n in 1usize..24, sender_idx in 0usize..24) {
            let room = Room::new(RoomId::new(), 0);
            let mut members = Vec::new();
            for _ in 0..n {
                let (conn, rx) = member(&room, 4);
                room.join(conn.clone()).unwrap();
                members.push((conn, rx));
            }
            let sender = members[sender_idx % n].0.id();

            let report = room.broadcast(&Frame::from("p"), &ExcludeSet::only(sender));
            prop_assert_eq!(report.delivered, n - 1);

            for (conn, rx) in &mut members {
                let got = drain(rx);
                if conn.id() == sender {
                    prop_assert!(got.is_empty());
                } else {
                    prop_assert_eq!(got, vec!["p".to_string()]);
                }
            }
        }
    }
}
