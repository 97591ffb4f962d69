//! Settings types.
//!
//! All structs use `#[serde(default)]` so partial JSON files only need to
//! name the keys they override.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomcastSettings {
    /// Listener settings.
    pub server: ServerSettings,
    /// Per-connection pump settings.
    pub relay: RelaySettings,
    /// Room sizing and eviction.
    pub rooms: RoomSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl RoomcastSettings {
    /// Reject values the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.relay.write_wait_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "relay.writeWaitMs must be > 0".into(),
            ));
        }
        if self.relay.pong_wait_ms < 10 {
            return Err(SettingsError::InvalidValue(
                "relay.pongWaitMs must be at least 10".into(),
            ));
        }
        if self.relay.outbound_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "relay.outboundQueueCapacity must be > 0".into(),
            ));
        }
        if self.relay.max_message_size == 0 {
            return Err(SettingsError::InvalidValue(
                "relay.maxMessageSize must be > 0".into(),
            ));
        }
        if self.rooms.reaper_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "rooms.reaperIntervalSecs must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Listener settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Per-connection pump settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Deadline for writing one frame to the peer, in milliseconds.
    pub write_wait_ms: u64,
    /// Window in which the next pong must arrive, in milliseconds.
    /// Pings go out every 90% of this window.
    pub pong_wait_ms: u64,
    /// Largest inbound message accepted, in bytes.
    pub max_message_size: usize,
    /// Frames buffered per connection before new ones are dropped.
    pub outbound_queue_capacity: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            write_wait_ms: 10_000,
            pong_wait_ms: 60_000,
            max_message_size: 512_000,
            outbound_queue_capacity: 256,
        }
    }
}

/// Room sizing and eviction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomSettings {
    /// Capacity of rooms created on demand (`0` = unbounded).
    pub default_capacity: usize,
    /// How long an empty room survives, in seconds.
    pub ttl_secs: u64,
    /// Reaper tick, in seconds.
    pub reaper_interval_secs: u64,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            default_capacity: 8,
            ttl_secs: 300,
            reaper_interval_secs: 10,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive (overridden by `RUST_LOG`).
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
