//! # roomcast-server
//!
//! Axum HTTP + `WebSocket` room relay.
//!
//! - Rooms: capacity-bounded broadcast domains held in a [`RoomRegistry`]
//! - `WebSocket` sessions: one reader and one writer pump per connection,
//!   with a bounded outbound queue and ping/pong liveness
//! - Reaper: evicts rooms that stay empty past their TTL
//! - HTTP endpoints: room creation and teardown, metrics, ping, health
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod reaper;
pub mod registry;
pub mod relay;
pub mod room;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::{PumpConfig, RoomConfig, ServerConfig};
pub use errors::ApiError;
pub use reaper::Reaper;
pub use registry::{RegistryStats, RoomRegistry, SweepSummary};
pub use relay::{Admission, RelayService, SessionOutcome};
pub use room::{BroadcastReport, Room, RoomInfo};
pub use server::{AppState, RelayServer, ServerHandle};
pub use shutdown::ShutdownCoordinator;
