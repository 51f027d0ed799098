//! Fusion types: CorrelationKind, CorrelationRule, FusedEvent, fusion metrics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{GeoPoint, RawEvent, Severity};

// ============================================================================
// Correlation
// ============================================================================

/// Shape of the source combination that produced a fusion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationKind {
    SensorSensor,
    SensorLpr,
    SensorDrone,
    SensorCad,
    LprDrone,
    LprCad,
    DroneCad,
    MultiSource,
}

impl std::fmt::Display for CorrelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CorrelationKind::SensorSensor => "sensor_sensor",
            CorrelationKind::SensorLpr => "sensor_lpr",
            CorrelationKind::SensorDrone => "sensor_drone",
            CorrelationKind::SensorCad => "sensor_cad",
            CorrelationKind::LprDrone => "lpr_drone",
            CorrelationKind::LprCad => "lpr_cad",
            CorrelationKind::DroneCad => "drone_cad",
            CorrelationKind::MultiSource => "multi_source",
        };
        write!(f, "{s}")
    }
}

/// Confidence band of a fused event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FusionConfidence {
    Low,
    Medium,
    High,
    Verified,
}

impl FusionConfidence {
    /// Band boundaries: verified >= 0.9, high >= 0.7, medium >= 0.4.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            FusionConfidence::Verified
        } else if score >= 0.7 {
            FusionConfidence::High
        } else if score >= 0.4 {
            FusionConfidence::Medium
        } else {
            FusionConfidence::Low
        }
    }
}

/// Rule mapping a source-type combination to a correlation window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationRule {
    pub rule_id: String,
    pub name: String,
    /// Wire names of eligible source types (see `EventSource::as_str`).
    pub source_types: Vec<String>,
    pub correlation_kind: CorrelationKind,
    pub time_window_secs: i64,
    pub distance_threshold_m: f64,
    pub min_sources: usize,
    pub confidence_boost: f64,
    pub enabled: bool,
    pub priority: i32,
    #[serde(default)]
    pub tags: Vec<String>,
}

// ============================================================================
// Fused Event
// ============================================================================

/// A single event produced from multiple correlated raw events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedEvent {
    pub fusion_id: String,
    pub correlation_kind: CorrelationKind,
    pub confidence: FusionConfidence,
    /// Graded score in [0,1]; non-decreasing as sources are added.
    pub confidence_score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub center: GeoPoint,
    pub radius_m: f64,
    pub sources: Vec<RawEvent>,
    pub event_type: String,
    pub description: String,
    pub severity: Severity,
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl FusedEvent {
    pub fn source_ids(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.event_id.as_str())
    }
}

// ============================================================================
// Metrics
// ============================================================================

/// Rolling counters for the fusion engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FusionMetrics {
    pub total_fusions: u64,
    pub fusions_by_kind: std::collections::BTreeMap<String, u64>,
    pub fusions_by_confidence: std::collections::BTreeMap<String, u64>,
    pub active_fusions: usize,
    pub verified_fusions: u64,
    pub avg_sources_per_fusion: f64,
}
