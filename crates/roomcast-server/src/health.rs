//! `/health` endpoint body.

use std::time::Instant;

use serde::Serialize;

use crate::registry::RegistryStats;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"`, or `"shutting_down"` once the shutdown signal fired.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Live rooms.
    pub rooms: usize,
    /// Connections across all rooms.
    pub connections: usize,
}

/// Build a health response from live counters.
pub fn health_check(
    start_time: Instant,
    stats: RegistryStats,
    shutting_down: bool,
) -> HealthResponse {
    HealthResponse {
        status: if shutting_down { "shutting_down" } else { "ok" },
        uptime_secs: start_time.elapsed().as_secs(),
        rooms: stats.rooms,
        connections: stats.users,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(rooms: usize, users: usize) -> RegistryStats {
        RegistryStats { rooms, users }
    }

    #[test]
    fn status_is_ok() {
        let resp = health_check(Instant::now(), stats(0, 0), false);
        assert_eq!(resp.status, "ok");
        assert!(resp.uptime_secs < 2);
    }

    #[test]
    fn status_reports_shutdown() {
        let resp = health_check(Instant::now(), stats(0, 0), true);
        assert_eq!(resp.status, "shutting_down");
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        let resp = health_check(start, stats(0, 0), false);
        assert!(resp.uptime_secs >= 59);
    }

    #[test]
    fn serialization() {
        let resp = health_check(Instant::now(), stats(3, 7), false);
        let parsed = serde_json::to_value(&resp).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["rooms"], 3);
        assert_eq!(parsed["connections"], 7);
        assert!(parsed["uptime_secs"].is_number());
    }
}
