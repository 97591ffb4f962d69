//! Events synthesized by the relay rather than by any client.

use serde::Serialize;

use crate::errors::{RelayError, Result};
use crate::frame::Frame;
use crate::ids::ConnectionId;

/// Which system event is being announced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemEventKind {
    /// Sent only to a newly joined connection, carrying its own id.
    Connection,
    /// Sent to the rest of the room when someone joins.
    UserJoined,
    /// Sent to the rest of the room when someone leaves.
    UserLeft,
}

impl SystemEventKind {
    /// Wire name of the event.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::UserJoined => "user_joined",
            Self::UserLeft => "user_left",
        }
    }
}

/// Payload of every system event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UserData {
    /// The connection the event is about.
    pub user_id: ConnectionId,
}

/// `{"event": ..., "data": {"user_id": ...}}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SystemEvent {
    /// Event name.
    pub event: SystemEventKind,
    /// Event payload.
    pub data: UserData,
}

impl SystemEvent {
    fn new(event: SystemEventKind, user_id: ConnectionId) -> Self {
        Self {
            event,
            data: UserData { user_id },
        }
    }

    /// Greeting for a freshly admitted connection.
    pub fn connection(user_id: ConnectionId) -> Self {
        Self::new(SystemEventKind::Connection, user_id)
    }

    /// Join announcement.
    pub fn user_joined(user_id: ConnectionId) -> Self {
        Self::new(SystemEventKind::UserJoined, user_id)
    }

    /// Departure announcement.
    pub fn user_left(user_id: ConnectionId) -> Self {
        Self::new(SystemEventKind::UserLeft, user_id)
    }

    /// Serialize into a frame ready for enqueueing.
    pub fn to_frame(&self) -> Result<Frame> {
        serde_json::to_string(self)
            .map(Frame::from)
            .map_err(|e| RelayError::Serialization {
                event: self.event.as_str(),
                message: e.to_string(),
            })
    }
}
