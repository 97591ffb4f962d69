//! Relay error types.

use thiserror::Error;

use crate::ids::RoomId;

/// Errors raised by the relay core.
///
/// Every variant is local to one request or connection; none of them is
/// fatal to the process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// An identifier could not be parsed.
    #[error("invalid {kind} id: {input:?}")]
    InvalidId {
        /// Which identifier was being parsed (`"room"`, `"connection"`).
        kind: &'static str,
        /// The rejected input.
        input: String,
    },
    /// The room already holds `capacity` members.
    #[error("room {room_id} is full ({capacity} members)")]
    CapacityExceeded {
        /// The room that rejected the join.
        room_id: RoomId,
        /// Its configured capacity.
        capacity: usize,
    },
    /// The room was evicted or torn down while the caller held a reference.
    #[error("room {0} has been closed")]
    RoomClosed(RoomId),
    /// No room with this id is registered.
    #[error("room {0} not found")]
    RoomNotFound(RoomId),
    /// A relay-synthesized event could not be serialized.
    #[error("failed to serialize {event} event: {message}")]
    Serialization {
        /// Name of the event.
        event: &'static str,
        /// Underlying serializer message.
        message: String,
    },
}

impl RelayError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidId { .. } => "invalid_id",
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::RoomClosed(_) => "room_closed",
            Self::RoomNotFound(_) => "room_not_found",
            Self::Serialization { .. } => "serialization",
        }
    }

    /// Whether the error was caused by the caller's request.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Serialization { .. })
    }
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
