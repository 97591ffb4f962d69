//! # roomcast-settings
//!
//! Configuration management with layered sources for the roomcast relay.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RoomcastSettings::default()`]
//! 2. **User file**: `~/.roomcast/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `ROOMCAST_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = RoomcastSettings::default();
        let _path = settings_path();
    }

    #[test]
    fn default_settings_are_valid() {
        let settings = RoomcastSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.relay.write_wait_ms, 10_000);
        assert_eq!(settings.relay.pong_wait_ms, 60_000);
        assert_eq!(settings.relay.max_message_size, 512_000);
        assert_eq!(settings.relay.outbound_queue_capacity, 256);
        assert_eq!(settings.rooms.default_capacity, 8);
        assert_eq!(settings.rooms.ttl_secs, 300);
        assert_eq!(settings.rooms.reaper_interval_secs, 10);
    }
}
