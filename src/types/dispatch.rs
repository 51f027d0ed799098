//! Dispatch types: triggers, priorities, request lifecycle, rules

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::GeoPoint;

// ============================================================================
// Triggers
// ============================================================================

/// Events that can initiate an automatic actuator dispatch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DispatchTrigger {
    Shotspotter,
    CrashDetection,
    DangerousKeyword911,
    OfficerDistress,
    AmbushWarning,
    PerimeterBreach,
    HotVehicleLpr,
    MissingPerson,
    Pursuit,
    StructureFire,
    HazmatIncident,
    CrowdEmergency,
    ActiveShooter,
    ManualRequest,
}

impl DispatchTrigger {
    /// Triggers that always take critical priority regardless of rule defaults.
    pub fn is_always_critical(&self) -> bool {
        matches!(
            self,
            DispatchTrigger::OfficerDistress
                | DispatchTrigger::AmbushWarning
                | DispatchTrigger::ActiveShooter
        )
    }
}

impl std::fmt::Display for DispatchTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DispatchTrigger::Shotspotter => "shotspotter",
            DispatchTrigger::CrashDetection => "crash_detection",
            DispatchTrigger::DangerousKeyword911 => "dangerous_keyword_911",
            DispatchTrigger::OfficerDistress => "officer_distress",
            DispatchTrigger::AmbushWarning => "ambush_warning",
            DispatchTrigger::PerimeterBreach => "perimeter_breach",
            DispatchTrigger::HotVehicleLpr => "hot_vehicle_lpr",
            DispatchTrigger::MissingPerson => "missing_person",
            DispatchTrigger::Pursuit => "pursuit",
            DispatchTrigger::StructureFire => "structure_fire",
            DispatchTrigger::HazmatIncident => "hazmat_incident",
            DispatchTrigger::CrowdEmergency => "crowd_emergency",
            DispatchTrigger::ActiveShooter => "active_shooter",
            DispatchTrigger::ManualRequest => "manual_request",
        };
        write!(f, "{s}")
    }
}

/// Priority tiers; `critical` never downgrades once assigned.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
    Critical,
}

impl DispatchPriority {
    /// Tier score used by dispatch evaluation.
    pub fn score(&self) -> f64 {
        match self {
            DispatchPriority::Low => 0.3,
            DispatchPriority::Normal => 0.5,
            DispatchPriority::High => 0.7,
            DispatchPriority::Urgent => 0.85,
            DispatchPriority::Critical => 1.0,
        }
    }
}

impl std::fmt::Display for DispatchPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DispatchPriority::Low => "low",
            DispatchPriority::Normal => "normal",
            DispatchPriority::High => "high",
            DispatchPriority::Urgent => "urgent",
            DispatchPriority::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// Request Lifecycle
// ============================================================================

/// Dispatch request status. States form a DAG with one terminal per path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Pending,
    Evaluating,
    Dispatching,
    Dispatched,
    EnRoute,
    OnScene,
    Completed,
    Cancelled,
    Failed,
    NoActuatorAvailable,
}

impl DispatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DispatchStatus::Completed | DispatchStatus::Cancelled | DispatchStatus::Failed
        )
    }
}

/// A trigger event entering the dispatch engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub event_id: String,
    pub trigger: DispatchTrigger,
    pub timestamp: DateTime<Utc>,
    pub location: GeoPoint,
    pub priority: DispatchPriority,
    pub source_system: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_event_id: Option<String>,
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub affected_units: Vec<String>,
    /// Threat level on a 0-10 scale when the source supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threat_level: Option<u8>,
    #[serde(default = "default_radius")]
    pub radius_m: f64,
}

fn default_radius() -> f64 {
    100.0
}

/// An auto-dispatch request and its evaluation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub request_id: String,
    pub trigger_event: TriggerEvent,
    pub status: DispatchStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_actuator_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_mission_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    pub evaluation_score: f64,
    #[serde(default)]
    pub evaluation_factors: std::collections::BTreeMap<String, f64>,
    pub operator_override: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_id: Option<String>,
    #[serde(default)]
    pub notes: Vec<String>,
}

// ============================================================================
// Rules
// ============================================================================

/// Per-trigger dispatch rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRule {
    pub rule_id: String,
    pub trigger: DispatchTrigger,
    pub enabled: bool,
    pub min_priority: DispatchPriority,
    pub auto_dispatch: bool,
    pub require_approval: bool,
    pub response_radius_km: f64,
    pub required_capabilities: Vec<String>,
    pub altitude_m: f64,
    pub orbit_on_arrival: bool,
    pub orbit_radius_m: f64,
    pub follow_target: bool,
    pub notify_dispatch: bool,
    pub notify_tactical: bool,
}

/// Rolling counters for the dispatch engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchMetrics {
    pub total_requests: u64,
    pub requests_by_trigger: std::collections::BTreeMap<String, u64>,
    pub requests_by_status: std::collections::BTreeMap<String, u64>,
    pub dispatched_count: u64,
    pub failed_count: u64,
    pub avg_response_time_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_triggers_flagged() {
        assert!(DispatchTrigger::OfficerDistress.is_always_critical());
        assert!(DispatchTrigger::ActiveShooter.is_always_critical());
        assert!(!DispatchTrigger::Shotspotter.is_always_critical());
    }

    #[test]
    fn priority_scores_follow_tiers() {
        assert!(DispatchPriority::Critical.score() > DispatchPriority::Urgent.score());
        assert!((DispatchPriority::Normal.score() - 0.5).abs() < f64::EPSILON);
    }
}
