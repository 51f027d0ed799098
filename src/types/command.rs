//! Actuator command types: command catalog, lifecycle, parameters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::GeoPoint;

// ============================================================================
// Command Catalog
// ============================================================================

/// Commands the engine can issue to an external actuator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    Takeoff,
    Land,
    ReturnHome,
    Hover,
    Orbit,
    Patrol,
    Follow,
    Goto,
    Search,
    Track,
    SpotlightOn,
    SpotlightOff,
    Announce,
    StartRecord,
    StopRecord,
    Photo,
    Zoom,
    Gimbal,
    EmergencyStop,
    Abort,
}

impl CommandType {
    /// Whether the command produces motion and is subject to the flight
    /// envelope and geofence checks.
    pub fn is_motion(&self) -> bool {
        matches!(
            self,
            CommandType::Takeoff
                | CommandType::Orbit
                | CommandType::Patrol
                | CommandType::Follow
                | CommandType::Goto
                | CommandType::Search
                | CommandType::Track
        )
    }

    /// Non-motion commands are safe to retry automatically on transport error.
    pub fn is_retryable(&self) -> bool {
        !self.is_motion()
            && !matches!(self, CommandType::EmergencyStop | CommandType::Abort)
    }

    /// Per-type execution timeout in seconds.
    pub fn default_timeout_secs(&self) -> u64 {
        match self {
            CommandType::Takeoff | CommandType::Land => 60,
            CommandType::ReturnHome => 300,
            CommandType::Orbit | CommandType::Patrol | CommandType::Search => 1800,
            CommandType::Follow | CommandType::Track => 3600,
            CommandType::Goto | CommandType::Hover => 300,
            CommandType::Announce => 30,
            CommandType::EmergencyStop | CommandType::Abort => 10,
            _ => 15,
        }
    }
}

impl std::fmt::Display for CommandType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CommandType::Takeoff => "takeoff",
            CommandType::Land => "land",
            CommandType::ReturnHome => "return_home",
            CommandType::Hover => "hover",
            CommandType::Orbit => "orbit",
            CommandType::Patrol => "patrol",
            CommandType::Follow => "follow",
            CommandType::Goto => "goto",
            CommandType::Search => "search",
            CommandType::Track => "track",
            CommandType::SpotlightOn => "spotlight_on",
            CommandType::SpotlightOff => "spotlight_off",
            CommandType::Announce => "announce",
            CommandType::StartRecord => "start_record",
            CommandType::StopRecord => "stop_record",
            CommandType::Photo => "photo",
            CommandType::Zoom => "zoom",
            CommandType::Gimbal => "gimbal",
            CommandType::EmergencyStop => "emergency_stop",
            CommandType::Abort => "abort",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Command execution status.
/// Lifecycle: `pending -> queued -> executing -> {completed|failed|timeout|cancelled}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    Queued,
    Executing,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl CommandStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CommandStatus::Completed
                | CommandStatus::Failed
                | CommandStatus::Cancelled
                | CommandStatus::Timeout
        )
    }
}

/// Command priority. `Emergency` preempts the executing command and
/// flushes the queue.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum CommandPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
    Emergency,
}

// ============================================================================
// Parameters
// ============================================================================

/// A patrol/search waypoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Waypoint {
    pub point: GeoPoint,
    pub altitude_m: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_mps: Option<f64>,
    #[serde(default)]
    pub hover_secs: f64,
}

/// Motion / sensor parameters carried by a command.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CommandParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_altitude_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_mps: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orbit_radius_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub waypoints: Vec<Waypoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_target_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_distance_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gimbal_pitch_deg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gimbal_yaw_deg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom_level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub announcement_text: Option<String>,
}

/// A command in an actuator's queue, with full execution record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorCommand {
    pub command_id: String,
    pub actuator_id: String,
    pub command_type: CommandType,
    pub status: CommandStatus,
    pub priority: CommandPriority,
    pub parameters: CommandParameters,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mission_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Rolling counters for the command engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandMetrics {
    pub total_commands: u64,
    pub commands_by_type: std::collections::BTreeMap<String, u64>,
    pub commands_by_status: std::collections::BTreeMap<String, u64>,
    pub queued_commands: usize,
    pub executing_commands: usize,
    pub completed_commands: u64,
    pub failed_commands: u64,
}

// ============================================================================
// Actuator Fleet
// ============================================================================

/// Registered actuator and its last known state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actuator {
    pub actuator_id: String,
    pub name: String,
    pub capabilities: Vec<String>,
    pub battery_percent: f64,
    pub location: GeoPoint,
    pub available: bool,
    /// Cruise speed used for ETA ranking.
    pub cruise_speed_mps: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motion_commands_classified() {
        assert!(CommandType::Orbit.is_motion());
        assert!(CommandType::Goto.is_motion());
        assert!(!CommandType::SpotlightOn.is_motion());
        assert!(!CommandType::EmergencyStop.is_motion());
    }

    #[test]
    fn emergency_commands_never_retry() {
        assert!(!CommandType::EmergencyStop.is_retryable());
        assert!(!CommandType::Abort.is_retryable());
        assert!(CommandType::Photo.is_retryable());
        assert!(!CommandType::Orbit.is_retryable());
    }
}
