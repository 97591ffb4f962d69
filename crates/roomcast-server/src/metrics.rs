//! Prometheus recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Returns the handle used by `/metrics/prometheus`. Call once at startup
/// before anything is recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

// Metric name constants.

/// WebSocket connections opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "roomcast_ws_connections_total";
/// WebSocket connections closed (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "roomcast_ws_disconnections_total";
/// Open WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "roomcast_ws_connections_active";
/// Connection lifetime in seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "roomcast_ws_connection_duration_seconds";
/// Frames queued to a recipient (counter).
pub const WS_FRAMES_RELAYED_TOTAL: &str = "roomcast_ws_frames_relayed_total";
/// Frames dropped on a full outbound queue (counter).
pub const WS_FRAMES_DROPPED_TOTAL: &str = "roomcast_ws_frames_dropped_total";
/// Join attempts refused (counter, labels: reason).
pub const ROOM_JOINS_REJECTED_TOTAL: &str = "roomcast_room_joins_rejected_total";
/// Rooms created (counter).
pub const ROOMS_CREATED_TOTAL: &str = "roomcast_rooms_created_total";
/// Rooms removed by the reaper (counter).
pub const ROOMS_EVICTED_TOTAL: &str = "roomcast_rooms_evicted_total";
/// Live rooms as of the last reaper pass (gauge).
pub const ROOMS_ACTIVE: &str = "roomcast_rooms_active";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_recorder_renders() {
        // No global install, so tests stay independent.
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!(ROOMS_CREATED_TOTAL).increment(3);
        });
        let output = handle.render();
        assert!(output.contains("roomcast_rooms_created_total 3"));
    }

    #[test]
    fn metric_names_are_prefixed_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_CONNECTION_DURATION_SECONDS,
            WS_FRAMES_RELAYED_TOTAL,
            WS_FRAMES_DROPPED_TOTAL,
            ROOM_JOINS_REJECTED_TOTAL,
            ROOMS_CREATED_TOTAL,
            ROOMS_EVICTED_TOTAL,
            ROOMS_ACTIVE,
        ];
        for name in names {
            assert!(name.starts_with("roomcast_"), "{name}");
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
