//! Signaling service error types.
//!
//! One error type serves both surfaces: the admin HTTP API maps variants to
//! status codes via the `IntoResponse` impl, and the WebSocket boundary uses
//! `client_message()` to build `error` envelopes. Internal details are logged
//! server-side and never forwarded to clients.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Signaling service error type.
///
/// Maps to HTTP status codes on the admin surface:
/// - `Database`, `Internal`: 500 Internal Server Error
/// - `Unauthorized`: 401 Unauthorized
/// - `RoomNotFound`: 404 Not Found
/// - `BadRequest`: 400 Bad Request
/// - `ShuttingDown`: 503 Service Unavailable
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Room not found: {0}")]
    RoomNotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Service is shutting down")]
    ShuttingDown,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SignalError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            SignalError::Database(_) | SignalError::Internal(_) => 500,
            SignalError::RoomNotFound(_) => 404,
            SignalError::BadRequest(_) => 400,
            SignalError::Unauthorized(_) => 401,
            SignalError::ShuttingDown => 503,
        }
    }

    /// Returns a client-safe message for `error` envelopes on the signaling
    /// channel. Internal details stay out of the wire.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            SignalError::Database(_) | SignalError::Internal(_) => {
                "An internal error occurred".to_string()
            }
            SignalError::RoomNotFound(_) => {
                "Room not found. Please check the calling address.".to_string()
            }
            SignalError::BadRequest(msg) => msg.clone(),
            SignalError::Unauthorized(_) => "Unauthorized".to_string(),
            SignalError::ShuttingDown => "Server is shutting down".to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for SignalError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            SignalError::Database(err) => {
                // Log actual error server-side, return generic message to client
                tracing::error!(target: "signal.database", error = %err, "Database operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "An internal database error occurred".to_string(),
                )
            }
            SignalError::RoomNotFound(id) => {
                tracing::debug!(target: "signal.admin", room_id = %id, "Room not found");
                (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    "Room not found".to_string(),
                )
            }
            SignalError::BadRequest(reason) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", reason.clone())
            }
            SignalError::Unauthorized(reason) => {
                tracing::debug!(target: "signal.admin", reason = %reason, "Unauthorized admin request");
                (
                    StatusCode::UNAUTHORIZED,
                    "UNAUTHORIZED",
                    "Invalid admin code".to_string(),
                )
            }
            SignalError::ShuttingDown => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SHUTTING_DOWN",
                "Service is shutting down".to_string(),
            ),
            SignalError::Internal(err) => {
                tracing::error!(target: "signal.internal", error = %err, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<sqlx::Error> for SignalError {
    fn from(err: sqlx::Error) -> Self {
        SignalError::Database(err.to_string())
    }
}
