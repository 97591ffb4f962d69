//! Process-wide map from room id to live room.
//!
//! Lock order is always registry, then room. Rooms never call back into
//! the registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use parking_lot::Mutex;
use roomcast_core::RoomId;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::metrics::ROOMS_CREATED_TOTAL;
use crate::room::Room;

/// Room and user totals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// Live rooms.
    #[serde(rename = "rooms_count")]
    pub rooms: usize,
    /// Members across all rooms.
    #[serde(rename = "users_count")]
    pub users: usize,
}

/// Outcome of one eviction pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// Rooms remaining after the pass.
    pub total_rooms: usize,
    /// Rooms removed in this pass.
    pub evicted: usize,
    /// Members across the remaining rooms.
    pub total_users: usize,
}

/// Registry of live rooms.
#[derive(Debug)]
pub struct RoomRegistry {
    rooms: Mutex<HashMap<RoomId, Arc<Room>>>,
    default_capacity: usize,
}

impl RoomRegistry {
    /// Create an empty registry. Rooms created on demand get
    /// `default_capacity`.
    pub fn new(default_capacity: usize) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            default_capacity,
        }
    }

    /// Capacity given to rooms created on demand.
    pub fn default_capacity(&self) -> usize {
        self.default_capacity
    }

    /// Look up `id`, creating it with the default capacity if absent or
    /// closed. Concurrent callers for the same id all get the same room.
    pub fn get_or_create(&self, id: RoomId) -> Arc<Room> {
        let mut rooms = self.rooms.lock();
        if let Some(room) = rooms.get(&id).filter(|room| !room.is_closed()) {
            return Arc::clone(room);
        }
        let room = Arc::new(Room::new(id, self.default_capacity));
        let _ = rooms.insert(id, Arc::clone(&room));
        counter!(ROOMS_CREATED_TOTAL).increment(1);
        debug!(room_id = %id, capacity = self.default_capacity, "room created on demand");
        room
    }

    /// Create a room with a fresh id.
    pub fn create(&self, capacity: usize) -> Arc<Room> {
        let room = Arc::new(Room::new(RoomId::new(), capacity));
        let _ = self.rooms.lock().insert(room.id(), Arc::clone(&room));
        counter!(ROOMS_CREATED_TOTAL).increment(1);
        info!(room_id = %room.id(), capacity, "room created");
        room
    }

    /// Look up `id`.
    pub fn get(&self, id: &RoomId) -> Option<Arc<Room>> {
        self.rooms.lock().get(id).cloned()
    }

    /// Remove `id` and close it so that references still held elsewhere
    /// refuse new joins. Members are signalled to disconnect.
    pub fn remove(&self, id: &RoomId) -> Option<Arc<Room>> {
        let room = self.rooms.lock().remove(id)?;
        let disconnected = room.close();
        info!(room_id = %id, disconnected, "room removed");
        Some(room)
    }

    /// Remove every room that is empty and idle past `ttl` at `now`.
    pub fn evict_expired(&self, now: Instant, ttl: Duration) -> SweepSummary {
        let mut rooms = self.rooms.lock();
        let before = rooms.len();
        rooms.retain(|id, room| {
            let keep = !room.retire_if_expired(now, ttl);
            if !keep {
                debug!(room_id = %id, "evicting idle room");
            }
            keep
        });
        SweepSummary {
            total_rooms: rooms.len(),
            evicted: before - rooms.len(),
            total_users: rooms.values().map(|room| room.len()).sum(),
        }
    }

    /// Number of live rooms.
    pub fn len(&self) -> usize {
        self.rooms.lock().len()
    }

    /// Whether no rooms are live.
    pub fn is_empty(&self) -> bool {
        self.rooms.lock().is_empty()
    }

    /// Room and user totals.
    pub fn stats(&self) -> RegistryStats {
        let rooms = self.rooms.lock();
        RegistryStats {
            rooms: rooms.len(),
            users: rooms.values().map(|room| room.len()).sum(),
        }
    }
}
