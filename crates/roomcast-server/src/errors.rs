//! HTTP-facing errors.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use roomcast_core::RelayError;
use serde_json::json;
use thiserror::Error;

/// Errors returned by the HTTP handlers. Rendered as
/// `{"details": "<message>"}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The path segment is not a UUID.
    #[error("Room id should be uuid")]
    InvalidRoomId(#[source] RelayError),
    /// The room is at capacity.
    #[error("Room is full")]
    RoomFull(#[source] RelayError),
    /// No such room.
    #[error("Room not found")]
    RoomNotFound,
    /// The Prometheus recorder was not installed.
    #[error("Prometheus exporter is not enabled")]
    MetricsDisabled,
    /// Any other relay failure.
    #[error(transparent)]
    Relay(RelayError),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRoomId(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::RoomFull(_) => StatusCode::BAD_REQUEST,
            Self::RoomNotFound | Self::MetricsDisabled => StatusCode::NOT_FOUND,
            Self::Relay(RelayError::RoomClosed(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Relay(error) if error.is_client_error() => StatusCode::BAD_REQUEST,
            Self::Relay(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RelayError> for ApiError {
    fn from(error: RelayError) -> Self {
        match error {
            RelayError::InvalidId { .. } => Self::InvalidRoomId(error),
            RelayError::CapacityExceeded { .. } => Self::RoomFull(error),
            RelayError::RoomNotFound(_) => Self::RoomNotFound,
            other => Self::Relay(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "details": self.to_string() }))).into_response()
    }
}
