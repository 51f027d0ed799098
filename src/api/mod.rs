//! HTTP transport adapters around the coordinator
//!
//! Thin by design: webhook ingest (HMAC-verified), health, status and a
//! handful of read endpoints. The engines never depend on this layer.

mod envelope;
mod handlers;
pub mod webhook;

pub use envelope::{ApiErrorResponse, ApiResponse};
pub use handlers::ApiState;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Build the application router.
pub fn create_app(state: ApiState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::get_health))
        .route("/api/status", get(handlers::get_status))
        .route("/api/webhook/:vendor", post(handlers::post_webhook))
        .route("/api/fusion/active", get(handlers::get_active_fusions))
        .route("/api/entities/resolved", get(handlers::get_resolved_entities))
        .route("/api/dispatch/pending", get(handlers::get_pending_dispatches))
        .route("/api/safety/:officer_id", get(handlers::get_officer_status))
        .route(
            "/api/actuators/:actuator_id/emergency_stop",
            post(handlers::post_emergency_stop),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(1024 * 1024))
        .with_state(state)
}
