//! Continuity types: service health, failover, diagnostics, audit entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Health
// ============================================================================

/// Health of a monitored service, from latest probe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Offline,
}

impl ServiceStatus {
    pub fn is_failing(&self) -> bool {
        matches!(self, ServiceStatus::Unhealthy | ServiceStatus::Offline)
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServiceStatus::Healthy => "healthy",
            ServiceStatus::Degraded => "degraded",
            ServiceStatus::Unhealthy => "unhealthy",
            ServiceStatus::Offline => "offline",
        };
        write!(f, "{s}")
    }
}

/// One probe result for a monitored service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub service_id: String,
    pub status: ServiceStatus,
    pub latency_ms: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregated counts over a rolling window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub snapshot_id: String,
    pub timestamp: DateTime<Utc>,
    pub overall_status: ServiceStatus,
    pub healthy_count: usize,
    pub degraded_count: usize,
    pub unhealthy_count: usize,
    pub offline_count: usize,
    pub avg_latency_ms: f64,
}

// ============================================================================
// Failover
// ============================================================================

/// Current side a failover pair is serving from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailoverState {
    #[default]
    Normal,
    FailedOver,
}

/// Manual vs automatic failover operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailoverMode {
    #[default]
    Auto,
    Manual,
}

/// A recorded failover or recovery transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverEvent {
    pub event_id: String,
    pub service_type: String,
    pub from_target: String,
    pub to_target: String,
    pub reason: String,
    pub auto_triggered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Categories the diagnostics classifier bins events into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticCategory {
    Network,
    Database,
    Federal,
    Vendor,
    Cache,
    Queue,
    Websocket,
    Etl,
    Engine,
    Authentication,
    Configuration,
    Resource,
    Performance,
}

/// Diagnostic severities.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticSeverity {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

/// A classified diagnostic event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    pub event_id: String,
    pub category: DiagnosticCategory,
    pub severity: DiagnosticSeverity,
    pub source: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub resolved: bool,
}

/// A query exceeding the slow-query threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlowQueryEvent {
    pub query_id: String,
    pub source: String,
    pub query_type: String,
    pub duration_ms: f64,
    pub threshold_ms: f64,
    pub timestamp: DateTime<Utc>,
}

/// A predictive degradation alert from rolling-window analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictiveAlert {
    pub alert_id: String,
    pub source: String,
    pub indicators: Vec<String>,
    pub recommended_actions: Vec<String>,
    pub recent_mean_ms: f64,
    pub baseline_mean_ms: f64,
    pub timestamp: DateTime<Utc>,
    pub acknowledged: bool,
}

// ============================================================================
// Audit
// ============================================================================

/// Operations audit action kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    SystemStartup,
    SystemShutdown,
    EventIngested,
    EventRejected,
    EventDeadLettered,
    EntityResolutionCompleted,
    FusionCreated,
    FusionUpdated,
    FusionVerified,
    AnomalyDetected,
    DispatchEvaluated,
    DispatchCancelled,
    DispatchApprovalRequired,
    DispatchCompleted,
    CommandIssued,
    CommandPreempted,
    CommandFailed,
    SafetyWarningIssued,
    AmbushAlertRaised,
    FallConfirmed,
    CheckInOverdue,
    GuardrailDecision,
    BiasAnalysisBlocked,
    ApprovalRequested,
    ApprovalDecided,
    HealthCheckCompleted,
    ServiceDegraded,
    ServiceUnhealthy,
    FailoverTriggered,
    RecoveryCompleted,
    BufferedWriteDiscarded,
    PoolFailover,
    DiagnosticEvent,
    SlowQueryDetected,
    PredictiveAlert,
    AccessDecision,
    SessionCreated,
    SessionInvalidated,
    CjisQueryLogged,
    SuspiciousQueryFlagged,
    ConfigChanged,
    ManualIntervention,
    IntegrityViolation,
}

/// Audit entry severities.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
    Emergency,
}

/// A single hash-chained operations audit entry.
///
/// `entry_hash = SHA-256(canonical_fields, previous_entry_hash)`. The log
/// is append-only; chain linkage is verifiable end to end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: String,
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub severity: AuditSeverity,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub description: String,
    #[serde(default)]
    pub details: BTreeMap<String, serde_json::Value>,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_entry_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_hash: Option<String>,
}
