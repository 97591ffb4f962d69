//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RoomcastSettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::RoomcastSettings;

/// Env var naming an explicit settings file.
pub const SETTINGS_PATH_ENV: &str = "ROOMCAST_SETTINGS";

/// Resolve the settings file path.
///
/// `ROOMCAST_SETTINGS` wins; otherwise `~/.roomcast/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Ok(path) = std::env::var(SETTINGS_PATH_ENV) {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".roomcast").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RoomcastSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; a malformed one is an error.
pub fn load_settings_from_path(path: &Path) -> Result<RoomcastSettings> {
    let defaults = serde_json::to_value(RoomcastSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: RoomcastSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `ROOMCAST_*` environment overrides to loaded settings.
///
/// Invalid values are logged and ignored.
pub fn apply_env_overrides(settings: &mut RoomcastSettings) {
    apply_overrides(settings, |key| std::env::var(key).ok());
}

/// Apply overrides from an arbitrary key lookup.
pub fn apply_overrides(settings: &mut RoomcastSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("ROOMCAST_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("ROOMCAST_PORT", 0, 65535) {
        settings.server.port = v;
    }

    // ── Relay ───────────────────────────────────────────────────────
    if let Some(v) = env.u64("ROOMCAST_WRITE_WAIT_MS", 1, 600_000) {
        settings.relay.write_wait_ms = v;
    }
    if let Some(v) = env.u64("ROOMCAST_PONG_WAIT_MS", 10, 3_600_000) {
        settings.relay.pong_wait_ms = v;
    }
    if let Some(v) = env.usize("ROOMCAST_MAX_MESSAGE_SIZE", 1, 64 * 1024 * 1024) {
        settings.relay.max_message_size = v;
    }
    if let Some(v) = env.usize("ROOMCAST_QUEUE_CAPACITY", 1, 1_000_000) {
        settings.relay.outbound_queue_capacity = v;
    }

    // ── Rooms ───────────────────────────────────────────────────────
    if let Some(v) = env.usize("ROOMCAST_ROOM_CAPACITY", 0, 1_000_000) {
        settings.rooms.default_capacity = v;
    }
    if let Some(v) = env.u64("ROOMCAST_ROOM_TTL_SECS", 0, 604_800) {
        settings.rooms.ttl_secs = v;
    }
    if let Some(v) = env.u64("ROOMCAST_REAPER_INTERVAL_SECS", 1, 86_400) {
        settings.rooms.reaper_interval_secs = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("ROOMCAST_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("ROOMCAST_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Parsing helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Parse a boolean: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a `u16` within `[min, max]`.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    val.parse::<u16>().ok().filter(|v| (min..=max).contains(v))
}

/// Parse a `u64` within `[min, max]`.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    val.parse::<u64>().ok().filter(|v| (min..=max).contains(v))
}

/// Parse a `usize` within `[min, max]`.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    val.parse::<usize>().ok().filter(|v| (min..=max).contains(v))
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(
        &self,
        name: &str,
        kind: &str,
        parse: impl FnOnce(&str) -> Option<T>,
    ) -> Option<T> {
        let val = (self.lookup)(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, kind, "invalid env var, ignoring");
        }
        result
    }

    fn bool(&self, name: &str) -> Option<bool> {
        self.parsed(name, "bool", parse_bool)
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        self.parsed(name, "u16", |v| parse_u16_range(v, min, max))
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.parsed(name, "u64", |v| parse_u64_range(v, min, max))
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        self.parsed(name, "usize", |v| parse_usize_range(v, min, max))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
