//! Health endpoint.
//!
//! Reports process liveness plus the live session counters so operators can
//! see at a glance whether calls are flowing.

use crate::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;

/// Routes served by this module.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    rooms: u32,
    participants: u32,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.metrics.snapshot();
    Json(HealthResponse {
        status: "ok",
        rooms: snapshot.rooms,
        participants: snapshot.participants,
    })
}
