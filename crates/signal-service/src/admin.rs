//! Administrative surface: room CRUD behind a shared-secret header.
//!
//! Authorization happens in middleware before any handler runs, so an
//! unauthorized request never reaches the registry or the session layer.
//! Deleting a room removes the durable row first (new joins start failing
//! immediately) and then invokes the session teardown hook so every live
//! member is notified and disconnected.

use crate::errors::SignalError;
use crate::registry::Room;
use crate::AppState;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::IntoResponse;
use axum::routing::{delete, get};
use axum::{Json, Router};
use common::secret::ExposeSecret;
use common::types::RoomId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

/// Header carrying the shared admin secret.
const ADMIN_CODE_HEADER: &str = "x-admin-code";

/// Routes served by this module.
pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/admin/rooms", get(list_rooms).post(create_room))
        .route("/api/admin/rooms/:id", delete(delete_room))
        .layer(middleware::from_fn_with_state(state, require_admin))
}

/// Shared-secret authentication middleware.
///
/// Compares the `X-Admin-Code` header against the configured secret in
/// constant time. Rejected requests never touch the core.
#[instrument(skip_all, name = "signal.admin.auth")]
async fn require_admin(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<impl IntoResponse, SignalError> {
    let provided = req
        .headers()
        .get(ADMIN_CODE_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| SignalError::Unauthorized("Missing X-Admin-Code header".to_string()))?;

    ring::constant_time::verify_slices_are_equal(
        provided.as_bytes(),
        state.admin_code.expose_secret().as_bytes(),
    )
    .map_err(|_| SignalError::Unauthorized("Admin code mismatch".to_string()))?;

    Ok(next.run(req).await)
}

#[derive(Serialize)]
struct RoomsResponse {
    rooms: Vec<Room>,
}

#[derive(Deserialize)]
struct CreateRoomRequest {
    name: String,
}

#[instrument(skip_all, name = "signal.admin.list_rooms")]
async fn list_rooms(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, SignalError> {
    let rooms = state.registry.list_rooms().await?;
    Ok(Json(RoomsResponse { rooms }))
}

#[instrument(skip_all, name = "signal.admin.create_room")]
async fn create_room(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateRoomRequest>,
) -> Result<impl IntoResponse, SignalError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(SignalError::BadRequest("Room name is required".to_string()));
    }

    let room = state.registry.create_room(name).await?;
    Ok((StatusCode::CREATED, Json(room)))
}

#[instrument(skip_all, name = "signal.admin.delete_room", fields(room_id = %raw_id))]
async fn delete_room(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Result<impl IntoResponse, SignalError> {
    let room_id = RoomId::parse(&raw_id)
        .map_err(|e| SignalError::BadRequest(e.to_string()))?;

    let existed = state.registry.delete_room(&room_id).await?;
    if !existed {
        return Err(SignalError::RoomNotFound(room_id.to_string()));
    }

    // Row is gone, so new joins already fail; now disconnect live members.
    state.controller.teardown_room(&room_id).await;

    info!(target: "signal.admin", room_id = %room_id, "Room deleted and session torn down");
    Ok(StatusCode::NO_CONTENT)
}
