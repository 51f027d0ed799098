//! Normalized raw event types: EventSource, EventKind, payload variants, RawEvent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Geography
// ============================================================================

/// A WGS-84 point with optional altitude.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude_m: Option<f64>,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon, altitude_m: None }
    }
}

// ============================================================================
// Event Sources
// ============================================================================

/// Accepted upstream sources for normalized events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Cad,
    Lpr,
    Gunshot,
    Bwc,
    Sensor,
    Panic,
    Environmental,
    Crowd,
    Vitals,
    Transcript,
    DroneTelemetry,
}

impl EventSource {
    /// Stable wire name, used by correlation rules and audit entries.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Cad => "cad",
            EventSource::Lpr => "lpr",
            EventSource::Gunshot => "gunshot",
            EventSource::Bwc => "bwc",
            EventSource::Sensor => "sensor",
            EventSource::Panic => "panic",
            EventSource::Environmental => "environmental",
            EventSource::Crowd => "crowd",
            EventSource::Vitals => "vitals",
            EventSource::Transcript => "transcript",
            EventSource::DroneTelemetry => "drone_telemetry",
        }
    }
}

impl std::fmt::Display for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Severity
// ============================================================================

/// Severity grading shared by raw events, fused events and alerts.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

// ============================================================================
// Typed Payloads
// ============================================================================

/// Per-kind payload of a normalized event.
///
/// The `kind` tag on the wire selects the variant; consumers pattern-match
/// instead of digging through untyped maps. Opaque vendor fields ride along
/// in `attributes` on each variant, uninterpreted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    GunshotDetection {
        rounds_detected: u32,
        confidence: f64,
        #[serde(default)]
        sensor_array: Option<String>,
    },
    PlateRead {
        plate: String,
        #[serde(default)]
        plate_state: Option<String>,
        #[serde(default)]
        alert_type: Option<String>,
        #[serde(default)]
        vehicle_description: Option<String>,
        #[serde(default)]
        camera_id: Option<String>,
    },
    CadIncident {
        call_id: String,
        call_type: String,
        #[serde(default)]
        priority: Option<u8>,
        #[serde(default)]
        units_assigned: Vec<String>,
    },
    BwcActivation {
        officer_id: String,
        device_id: String,
        #[serde(default)]
        recording: bool,
    },
    PanicBeacon {
        beacon_id: String,
        #[serde(default)]
        officer_id: Option<String>,
    },
    EnvironmentalReading {
        reading_type: String,
        value: f64,
        #[serde(default)]
        unit: Option<String>,
    },
    CrowdDensity {
        zone_id: String,
        estimated_count: u32,
        density_per_sq_m: f64,
    },
    OfficerVitals {
        officer_id: String,
        heart_rate_bpm: u32,
        #[serde(default)]
        possible_fall: bool,
        #[serde(default)]
        accelerometer: BTreeMap<String, f64>,
    },
    CallTranscript {
        call_id: String,
        transcript: String,
        #[serde(default)]
        call_type: Option<String>,
    },
    DroneTelemetry {
        actuator_id: String,
        battery_percent: f64,
        #[serde(default)]
        heading_deg: Option<f64>,
        #[serde(default)]
        speed_mps: Option<f64>,
    },
    /// Generic sensor reading with no dedicated variant.
    SensorReading {
        sensor_id: String,
        #[serde(default)]
        reading: BTreeMap<String, f64>,
    },
}

impl EventPayload {
    /// Short wire name of the payload kind.
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::GunshotDetection { .. } => "gunshot_detection",
            EventPayload::PlateRead { .. } => "plate_read",
            EventPayload::CadIncident { .. } => "cad_incident",
            EventPayload::BwcActivation { .. } => "bwc_activation",
            EventPayload::PanicBeacon { .. } => "panic_beacon",
            EventPayload::EnvironmentalReading { .. } => "environmental_reading",
            EventPayload::CrowdDensity { .. } => "crowd_density",
            EventPayload::OfficerVitals { .. } => "officer_vitals",
            EventPayload::CallTranscript { .. } => "call_transcript",
            EventPayload::DroneTelemetry { .. } => "drone_telemetry",
            EventPayload::SensorReading { .. } => "sensor_reading",
        }
    }
}

// ============================================================================
// Raw Event
// ============================================================================

/// A normalized event accepted from an upstream source.
///
/// Immutable once accepted; `ingest_time` is stamped by the ingestor and
/// must not precede `event_time` by more than the configured clock-skew
/// tolerance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawEvent {
    pub event_id: String,
    pub source: EventSource,
    pub event_time: DateTime<Utc>,
    pub ingest_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    pub payload: EventPayload,
    /// Source-supplied confidence in [0,1]. Defaults to 1.0.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Upstream hints linking this event to known entities or incidents.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub correlation_hints: Vec<String>,
}

fn default_confidence() -> f64 {
    1.0
}

impl RawEvent {
    /// Correlation source-type key used by fusion rules.
    pub fn source_type(&self) -> &'static str {
        self.source.as_str()
    }
}
