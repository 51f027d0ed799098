//! API handlers - webhook ingest, health, status
//!
//! The REST surface stays thin: adapters around the coordinator. The
//! webhook path verifies the vendor HMAC before anything else touches
//! the body.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Response;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use crate::pipeline::RtccCoordinator;
use crate::types::{AuditAction, AuditSeverity, RawEvent};

use super::envelope::{ApiErrorResponse, ApiResponse};
use super::webhook;

/// Shared handler state.
#[derive(Clone)]
pub struct ApiState {
    pub coordinator: Arc<RwLock<RtccCoordinator>>,
}

/// `GET /api/health` - liveness with health-service snapshot.
pub async fn get_health(State(state): State<ApiState>) -> Response {
    let coordinator = state.coordinator.read().await;
    let snapshot = coordinator.health.snapshot();
    ApiResponse::ok(json!({
        "status": "ok",
        "overall": snapshot.overall_status,
        "healthy": snapshot.healthy_count,
        "degraded": snapshot.degraded_count,
        "unhealthy": snapshot.unhealthy_count,
        "offline": snapshot.offline_count,
        "avg_latency_ms": snapshot.avg_latency_ms,
    }))
}

/// `GET /api/status` - coordinator counters and engine metrics.
pub async fn get_status(State(state): State<ApiState>) -> Response {
    let coordinator = state.coordinator.read().await;
    ApiResponse::ok(coordinator.status())
}

/// `POST /api/webhook/:vendor` - HMAC-verified event intake.
///
/// The signature covers the raw body; verification happens before the
/// body is parsed. Failures audit and return 401.
pub async fn post_webhook(
    State(state): State<ApiState>,
    Path(vendor): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut coordinator = state.coordinator.write().await;

    let Some(secret) = crate::config::get().access.webhook_secrets.get(&vendor).cloned() else {
        warn!(vendor, "webhook from unknown vendor");
        return ApiErrorResponse::unauthorized("unknown vendor");
    };

    let presented = headers
        .get(webhook::SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let verified = presented.is_some_and(|sig| webhook::verify(&secret, &body, sig));
    if !verified {
        let _ = coordinator.audit.log(
            AuditAction::EventRejected,
            AuditSeverity::Warning,
            "webhook",
            &format!("webhook from {vendor} rejected: bad or missing signature"),
        );
        return ApiErrorResponse::unauthorized("signature verification failed");
    }

    let event: RawEvent = match serde_json::from_slice(&body) {
        Ok(ev) => ev,
        Err(e) => return ApiErrorResponse::bad_request(format!("malformed event: {e}")),
    };

    let outcome = coordinator.ingest_and_process(event).await;
    ApiResponse::ok(json!({
        "accepted": outcome.accepted,
        "duplicate": outcome.duplicate,
        "fusions": outcome.fusions.len(),
        "dispatches": outcome.dispatches.len(),
    }))
}

/// `GET /api/fusion/active` - active fused events.
pub async fn get_active_fusions(State(state): State<ApiState>) -> Response {
    let coordinator = state.coordinator.read().await;
    let fusions: Vec<_> = coordinator.fusion.active_fusions().collect();
    ApiResponse::ok(json!({ "count": fusions.len(), "fusions": fusions }))
}

/// `GET /api/entities/resolved` - clusters from the latest resolution pass.
pub async fn get_resolved_entities(State(state): State<ApiState>) -> Response {
    let coordinator = state.coordinator.read().await;
    let entities = coordinator.resolved_entities();
    ApiResponse::ok(json!({ "count": entities.len(), "entities": entities }))
}

/// `GET /api/dispatch/pending` - requests awaiting operator approval.
pub async fn get_pending_dispatches(State(state): State<ApiState>) -> Response {
    let coordinator = state.coordinator.read().await;
    let pending = coordinator.dispatch.pending_approvals();
    ApiResponse::ok(json!({ "count": pending.len(), "requests": pending }))
}

/// `GET /api/safety/:officer_id` - one officer's safety status.
pub async fn get_officer_status(
    State(state): State<ApiState>,
    Path(officer_id): Path<String>,
) -> Response {
    let coordinator = state.coordinator.read().await;
    match coordinator.safety.status(&officer_id) {
        Some(status) => ApiResponse::ok(status.clone()),
        None => ApiErrorResponse::not_found(format!("unknown officer {officer_id}")),
    }
}

/// `POST /api/actuators/:actuator_id/emergency_stop`
pub async fn post_emergency_stop(
    State(state): State<ApiState>,
    Path(actuator_id): Path<String>,
) -> Response {
    let mut coordinator = state.coordinator.write().await;
    match coordinator.emergency_stop(&actuator_id, "api").await {
        Some(command_id) => ApiResponse::ok(json!({ "command_id": command_id })),
        None => ApiErrorResponse::conflict("emergency stop refused"),
    }
}
