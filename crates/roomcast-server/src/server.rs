//! `RelayServer`: Axum routes, shared state and the listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use roomcast_core::{RelayError, RoomId};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::errors::ApiError;
use crate::health::{self, HealthResponse};
use crate::reaper::Reaper;
use crate::registry::{RegistryStats, RoomRegistry};
use crate::relay::RelayService;
use crate::room::RoomInfo;
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Admission and session driver.
    pub relay: Arc<RelayService>,
    /// Room registry.
    pub registry: Arc<RoomRegistry>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, when the recorder is installed.
    pub prometheus: Option<PrometheusHandle>,
}

/// Response body of `POST /rooms`.
#[derive(Debug, Serialize)]
pub struct CreateRoomResponse {
    /// The new room.
    pub room: RoomInfo,
}

/// Response body of `GET /metrics`.
#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    /// Room and user totals.
    pub metrics: RegistryStats,
}

/// A bound, running server.
#[derive(Debug)]
pub struct ServerHandle {
    addr: SocketAddr,
    server: JoinHandle<()>,
    reaper: JoinHandle<()>,
}

impl ServerHandle {
    /// The bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Background tasks, for [`ShutdownCoordinator::graceful_shutdown`].
    pub fn into_tasks(self) -> Vec<JoinHandle<()>> {
        vec![self.server, self.reaper]
    }
}

/// The relay server.
pub struct RelayServer {
    config: ServerConfig,
    registry: Arc<RoomRegistry>,
    relay: Arc<RelayService>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    prometheus: Option<PrometheusHandle>,
}

impl RelayServer {
    /// Create a server with an empty registry.
    pub fn new(config: ServerConfig) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let registry = Arc::new(RoomRegistry::new(config.rooms.default_capacity));
        let relay = Arc::new(RelayService::new(
            Arc::clone(&registry),
            config.pump.clone(),
            shutdown.token(),
        ));
        Self {
            config,
            registry,
            relay,
            shutdown,
            start_time: Instant::now(),
            prometheus: None,
        }
    }

    /// Serve `/metrics/prometheus` from `handle`.
    #[must_use]
    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            relay: Arc::clone(&self.relay),
            registry: Arc::clone(&self.registry),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            prometheus: self.prometheus.clone(),
        };

        Router::new()
            .route("/rooms", post(create_room))
            .route("/rooms/{id}", get(room_socket).delete(delete_room))
            .route("/metrics", get(metrics_handler))
            .route("/metrics/prometheus", get(prometheus_handler))
            .route("/ping", get(ping_handler))
            .route("/health", get(health_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// The reaper for this server's registry.
    pub fn reaper(&self) -> Reaper {
        Reaper::new(
            Arc::clone(&self.registry),
            self.config.rooms.ttl,
            self.config.rooms.reaper_interval,
        )
    }

    /// Bind the listener, spawn the reaper and serve until shutdown.
    ///
    /// Failing to bind is the only error; everything after that is local
    /// to a request or connection.
    pub async fn listen(&self) -> std::io::Result<ServerHandle> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;

        let reaper = self.reaper().spawn(self.shutdown.token());
        let app = self.router();
        let token = self.shutdown.token();
        let server = tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(%error, "server stopped with error");
            }
        });

        info!(%addr, "roomcast listening");
        Ok(ServerHandle {
            addr,
            server,
            reaper,
        })
    }

    /// The room registry.
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// The relay service.
    pub fn relay(&self) -> &Arc<RelayService> {
        &self.relay
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// POST /rooms
async fn create_room(State(state): State<AppState>) -> Json<CreateRoomResponse> {
    let room = state.registry.create(state.registry.default_capacity());
    Json(CreateRoomResponse { room: room.info() })
}

/// GET /rooms/{id}: WebSocket upgrade into a room.
///
/// The id is validated and the slot reserved before the handshake, so bad
/// ids and full rooms get an HTTP error instead of a socket.
async fn room_socket(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError> {
    let room_id: RoomId = raw_id.parse()?;
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let admission = state.relay.admit(room_id)?;
    let connection_id = admission.connection_id();
    let rollback = admission.rollback();
    let relay = Arc::clone(&state.relay);

    Ok(upgrade
        .max_message_size(relay.pump_config().max_message_size)
        .on_failed_upgrade(move |error| {
            warn!(%error, %connection_id, %room_id, "websocket upgrade failed");
            rollback.run();
        })
        .on_upgrade(move |socket| async move {
            let _ = relay.run_ws(admission, socket).await;
        }))
}

/// DELETE /rooms/{id}
async fn delete_room(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let room_id: RoomId = raw_id.parse()?;
    let _ = state
        .registry
        .remove(&room_id)
        .ok_or(RelayError::RoomNotFound(room_id))?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        metrics: state.registry.stats(),
    })
}

/// GET /metrics/prometheus
async fn prometheus_handler(State(state): State<AppState>) -> Result<String, ApiError> {
    state
        .prometheus
        .as_ref()
        .map(PrometheusHandle::render)
        .ok_or(ApiError::MetricsDisabled)
}

/// GET /ping
async fn ping_handler() -> Json<Value> {
    Json(json!({ "message": "pong" }))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registry.stats(),
        state.shutdown.is_shutting_down(),
    ))
}
