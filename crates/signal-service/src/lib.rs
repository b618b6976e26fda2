//! Parley signaling service.
//!
//! The session/signaling coordination layer for small-group calls: durable
//! room identity, live membership, negotiation-message relay, host election,
//! and the duplex WebSocket channel clients speak the wire protocol over.
//! Media never touches this service.

pub mod actors;
pub mod admin;
pub mod config;
pub mod errors;
pub mod observability;
pub mod registry;
pub mod ws;

use actors::{SessionControllerHandle, SessionMetrics};
use axum::Router;
use common::secret::SecretString;
use registry::RoomRegistry;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

/// Shared state behind every route.
pub struct AppState {
    /// Live-session layer: joins and teardown go through here.
    pub controller: SessionControllerHandle,
    /// Durable room catalog.
    pub registry: RoomRegistry,
    /// Live session counters for the health endpoint.
    pub metrics: Arc<SessionMetrics>,
    /// Shared secret for the admin API.
    pub admin_code: SecretString,
    /// Server-side ping interval for connection liveness.
    pub heartbeat_interval: Duration,
}

/// Assemble the full application router: signaling channel, admin API,
/// health endpoint.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(ws::router())
        .merge(admin::router(Arc::clone(&state)))
        .merge(observability::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
