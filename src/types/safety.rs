//! Officer safety types: threat levels, warnings, check-ins, fall detection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::GeoPoint;

// ============================================================================
// Threat Grading
// ============================================================================

/// Officer threat levels, lowest to highest.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum ThreatLevel {
    Minimal,
    #[default]
    Low,
    Moderate,
    Elevated,
    High,
    Critical,
}

impl std::fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ThreatLevel::Minimal => "minimal",
            ThreatLevel::Low => "low",
            ThreatLevel::Moderate => "moderate",
            ThreatLevel::Elevated => "elevated",
            ThreatLevel::High => "high",
            ThreatLevel::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

impl ThreatLevel {
    /// Contribution of one warning at this level to the aggregate score.
    pub fn score_weight(&self) -> f64 {
        match self {
            ThreatLevel::Minimal => 0.05,
            ThreatLevel::Low => 0.1,
            ThreatLevel::Moderate => 0.2,
            ThreatLevel::Elevated => 0.35,
            ThreatLevel::High => 0.55,
            ThreatLevel::Critical => 0.8,
        }
    }
}

// ============================================================================
// Warnings
// ============================================================================

/// Kinds of proximity warnings an officer can receive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WarningType {
    Proximity,
    Ambush,
    Hotzone,
    Gunfire,
    OfficerDown,
    Hazard,
    WantedPerson,
    StolenVehicle,
    FallDetected,
}

impl std::fmt::Display for WarningType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WarningType::Proximity => "proximity",
            WarningType::Ambush => "ambush",
            WarningType::Hotzone => "hotzone",
            WarningType::Gunfire => "gunfire",
            WarningType::OfficerDown => "officer_down",
            WarningType::Hazard => "hazard",
            WarningType::WantedPerson => "wanted_person",
            WarningType::StolenVehicle => "stolen_vehicle",
            WarningType::FallDetected => "fall_detected",
        };
        write!(f, "{s}")
    }
}

/// A materialized warning in an officer's active set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProximityWarning {
    pub warning_id: String,
    pub warning_type: WarningType,
    pub title: String,
    pub description: String,
    pub threat_level: ThreatLevel,
    pub distance_m: f64,
    /// Compass direction from the officer toward the threat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub acknowledged: bool,
}

/// An ambush detection alert covering one or more officers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmbushAlert {
    pub alert_id: String,
    pub alert_level: ThreatLevel,
    pub location_description: String,
    pub location: GeoPoint,
    pub indicators: Vec<String>,
    pub recommended_actions: Vec<String>,
    pub affected_officers: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub acknowledged_by: Vec<String>,
    pub closed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_by: Option<String>,
}

impl AmbushAlert {
    /// Closed when all affected officers acknowledged or a supervisor closed it.
    pub fn is_resolved(&self) -> bool {
        self.closed
            || self
                .affected_officers
                .iter()
                .all(|o| self.acknowledged_by.contains(o))
    }
}

// ============================================================================
// Hotzones
// ============================================================================

/// A polygon zone with elevated risk metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hotzone {
    pub zone_id: String,
    pub name: String,
    pub zone_type: String,
    pub threat_level: ThreatLevel,
    pub risk_score: f64,
    /// Polygon vertices (lat, lon); boundary counts as inside.
    pub polygon: Vec<GeoPoint>,
    pub recent_incidents: u32,
    pub recent_gunfire: u32,
    #[serde(default)]
    pub hazards: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

// ============================================================================
// Check-ins
// ============================================================================

/// Check-in kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckInType {
    Routine,
    Safe,
    Emergency,
    Arrived,
    Cleared,
}

/// An officer check-in record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckIn {
    pub checkin_id: String,
    pub officer_id: String,
    pub check_in_type: CheckInType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Fall Detection
// ============================================================================

/// Fall detection lifecycle.
/// `normal -> possible_fall -> {confirmed_fall | false_alarm | acknowledged}`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FallDetectionState {
    #[default]
    Normal,
    PossibleFall,
    ConfirmedFall,
    FalseAlarm,
    Acknowledged,
}

/// A device-reported fall event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallEvent {
    pub event_id: String,
    pub officer_id: String,
    pub state: FallDetectionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub accelerometer: std::collections::BTreeMap<String, f64>,
    pub detected_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub false_alarm_reason: Option<String>,
}

// ============================================================================
// Officer Status
// ============================================================================

/// Per-officer situational state maintained by the safety engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfficerSafetyStatus {
    pub officer_id: String,
    pub threat_level: ThreatLevel,
    /// Aggregate of active warnings, in [0,1].
    pub threat_score: f64,
    pub active_warnings: Vec<String>,
    pub nearby_threats: usize,
    pub in_hotzone: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hotzone_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check_in: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_location: Option<GeoPoint>,
    pub fall_detection_state: FallDetectionState,
    pub on_duty: bool,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threat_levels_ordered() {
        assert!(ThreatLevel::Critical > ThreatLevel::High);
        assert!(ThreatLevel::Moderate > ThreatLevel::Low);
    }

    #[test]
    fn ambush_resolution_requires_all_acks() {
        let mut alert = AmbushAlert {
            alert_id: "a1".into(),
            alert_level: ThreatLevel::Critical,
            location_description: "5th & Main".into(),
            location: GeoPoint::new(26.77, -80.05),
            indicators: vec![],
            recommended_actions: vec![],
            affected_officers: vec!["o1".into(), "o2".into()],
            created_at: Utc::now(),
            acknowledged_by: vec!["o1".into()],
            closed: false,
            closed_by: None,
        };
        assert!(!alert.is_resolved());
        alert.acknowledged_by.push("o2".into());
        assert!(alert.is_resolved());
    }
}
