//! Opaque identifiers for connections and rooms.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::RelayError;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh, time-ordered identifier.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// The underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = RelayError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self).map_err(|_| RelayError::InvalidId {
                    kind: $kind,
                    input: s.to_owned(),
                })
            }
        }
    };
}

uuid_id!(
    /// Process-unique identifier of one upgraded client connection.
    ConnectionId,
    "connection"
);

uuid_id!(
    /// Identifier of a room, supplied by the caller or generated on creation.
    RoomId,
    "room"
);

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashSet;

    #[test]
    fn connection_ids_are_unique() {
        let ids: HashSet<ConnectionId> = (0..1_000).map(|_| ConnectionId::new()).collect();
        assert_eq!(ids.len(), 1_000);
    }

    #[test]
    fn room_id_parses_uuid() {
        let raw = "0190f5a4-7f1e-7c3a-9d2b-4b1f5e6a7c8d";
        let id: RoomId = raw.parse().unwrap();
        assert_eq!(id.to_string(), raw);
    }

    #[test]
    fn room_id_rejects_garbage() {
        let err = "not-a-room".parse::<RoomId>().unwrap_err();
        assert_matches!(
            err,
            RelayError::InvalidId { kind: "room", ref input } if input == "not-a-room"
        );
    }

    #[test]
    fn empty_string_is_invalid() {
        assert!("".parse::<ConnectionId>().is_err());
    }

    #[test]
    fn serializes_as_plain_uuid_string() {
        let id = ConnectionId::new();
        let json = serde_json::to_value(id).unwrap();
        assert_eq!(json, serde_json::Value::String(id.to_string()));
    }

    #[test]
    fn deserializes_from_uuid_string() {
        let id = RoomId::new();
        let back: RoomId = serde_json::from_str(&format!("\"{id}\"")).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn from_uuid_round_trips_inner() {
        let uuid = Uuid::new_v4();
        assert_eq!(RoomId::from_uuid(uuid).as_uuid(), &uuid);
    }
}
