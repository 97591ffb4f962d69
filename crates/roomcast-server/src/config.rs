//! Runtime configuration for the relay server.
//!
//! Built from [`RoomcastSettings`] with durations already resolved.

use std::time::Duration;

use roomcast_settings::RoomcastSettings;

/// Per-connection pump configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PumpConfig {
    /// Deadline for a single write to the peer.
    pub write_wait: Duration,
    /// Window in which the next pong must arrive.
    pub pong_wait: Duration,
    /// Largest inbound message accepted, in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per connection.
    pub queue_capacity: usize,
}

impl PumpConfig {
    /// Interval between pings: 90% of the pong window, so a ping always
    /// lands before the peer's deadline.
    pub fn ping_period(&self) -> Duration {
        self.pong_wait * 9 / 10
    }
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            write_wait: Duration::from_secs(10),
            pong_wait: Duration::from_secs(60),
            max_message_size: 512_000,
            queue_capacity: 256,
        }
    }
}

/// Room sizing and eviction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoomConfig {
    /// Capacity of rooms created on demand. `0` means unbounded.
    pub default_capacity: usize,
    /// How long an empty room survives.
    pub ttl: Duration,
    /// Reaper tick.
    pub reaper_interval: Duration,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            default_capacity: 8,
            ttl: Duration::from_secs(300),
            reaper_interval: Duration::from_secs(10),
        }
    }
}

/// Configuration for the relay server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Pump settings applied to every connection.
    pub pump: PumpConfig,
    /// Room settings.
    pub rooms: RoomConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            pump: PumpConfig::default(),
            rooms: RoomConfig::default(),
        }
    }
}

impl From<&RoomcastSettings> for ServerConfig {
    fn from(settings: &RoomcastSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            pump: PumpConfig {
                write_wait: Duration::from_millis(settings.relay.write_wait_ms),
                pong_wait: Duration::from_millis(settings.relay.pong_wait_ms),
                max_message_size: settings.relay.max_message_size,
                queue_capacity: settings.relay.outbound_queue_capacity,
            },
            rooms: RoomConfig {
                default_capacity: settings.rooms.default_capacity,
                ttl: Duration::from_secs(settings.rooms.ttl_secs),
                reaper_interval: Duration::from_secs(settings.rooms.reaper_interval_secs),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_loopback_on_free_port() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
    }

    #[test]
    fn ping_period_is_nine_tenths_of_pong_wait() {
        let pump = PumpConfig::default();
        assert_eq!(pump.ping_period(), Duration::from_secs(54));
        assert!(pump.ping_period() < pump.pong_wait);
    }

    #[test]
    fn ping_period_short_window() {
        let pump = PumpConfig {
            pong_wait: Duration::from_millis(100),
            ..PumpConfig::default()
        };
        assert_eq!(pump.ping_period(), Duration::from_millis(90));
    }

    #[test]
    fn from_default_settings_matches_defaults() {
        let cfg = ServerConfig::from(&RoomcastSettings::default());
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.pump, PumpConfig::default());
        assert_eq!(cfg.rooms, RoomConfig::default());
    }

    #[test]
    fn from_settings_converts_units() {
        let mut settings = RoomcastSettings::default();
        settings.relay.write_wait_ms = 250;
        settings.rooms.ttl_secs = 7;
        settings.rooms.default_capacity = 2;
        let cfg = ServerConfig::from(&settings);
        assert_eq!(cfg.pump.write_wait, Duration::from_millis(250));
        assert_eq!(cfg.rooms.ttl, Duration::from_secs(7));
        assert_eq!(cfg.rooms.default_capacity, 2);
    }
}
