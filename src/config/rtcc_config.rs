//! RTCC Configuration - engine thresholds as operator-tunable TOML values
//!
//! Every threshold the engines consult is a field in this module. Each
//! struct implements `Default` with values matching the shipped tuning,
//! ensuring zero-change behavior when no config file is present.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for an RTCC deployment.
///
/// Load with `RtccConfig::load()` which searches:
/// 1. `$RTCC_CONFIG` env var
/// 2. `./rtcc_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RtccConfig {
    /// Deployment identification
    #[serde(default)]
    pub deployment: DeploymentInfo,

    /// Event fusion pipeline tuning
    #[serde(default)]
    pub fusion: FusionConfig,

    /// Auto-dispatch engine tuning
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Officer safety engine tuning
    #[serde(default)]
    pub safety: SafetyConfig,

    /// Guardrail and risk pipeline tuning
    #[serde(default)]
    pub guardrail: GuardrailConfig,

    /// Operational continuity tuning
    #[serde(default)]
    pub continuity: ContinuityConfig,

    /// Zero-trust gateway tuning
    #[serde(default)]
    pub access: AccessConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
}

impl RtccConfig {
    /// Load configuration using the standard search order:
    /// 1. `$RTCC_CONFIG` environment variable
    /// 2. `./rtcc_config.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("RTCC_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), deployment = %config.deployment.name, "Loaded config from RTCC_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from RTCC_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "RTCC_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from("rtcc_config.toml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(deployment = %config.deployment.name, "Loaded config from ./rtcc_config.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./rtcc_config.toml, using defaults");
                }
            }
        }

        info!("No rtcc_config.toml found — using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Sanity-check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let f = &self.fusion;
        if !(0.0..=1.0).contains(&f.similarity_threshold) {
            return Err(ConfigError::Invalid(
                "fusion.similarity_threshold must be in [0,1]".into(),
            ));
        }
        if f.medium_confidence_threshold > f.high_confidence_threshold {
            return Err(ConfigError::Invalid(
                "fusion.medium_confidence_threshold must not exceed high_confidence_threshold"
                    .into(),
            ));
        }
        if self.dispatch.min_battery_percent > 100.0 {
            return Err(ConfigError::Invalid(
                "dispatch.min_battery_percent must not exceed 100".into(),
            ));
        }
        if self.dispatch.min_altitude_m >= self.dispatch.max_altitude_m {
            return Err(ConfigError::Invalid(
                "dispatch.min_altitude_m must be below max_altitude_m".into(),
            ));
        }
        if self.continuity.failover_consecutive_failures == 0
            || self.continuity.recovery_consecutive_successes == 0
        {
            return Err(ConfigError::Invalid(
                "continuity failover/recovery counts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {0}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error("failed to parse config {0}: {1}")]
    Parse(PathBuf, toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// Deployment
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentInfo {
    /// Deployment name shown in logs and reports
    #[serde(default = "default_deployment_name")]
    pub name: String,
    /// Primary jurisdiction label for audit records
    #[serde(default = "default_jurisdiction")]
    pub jurisdiction: String,
}

fn default_deployment_name() -> String {
    "rtcc-default".to_string()
}

fn default_jurisdiction() -> String {
    "UNSET".to_string()
}

impl Default for DeploymentInfo {
    fn default() -> Self {
        Self {
            name: default_deployment_name(),
            jurisdiction: default_jurisdiction(),
        }
    }
}

// ============================================================================
// Fusion
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Pairwise similarity at or above this is a match candidate
    pub similarity_threshold: f64,
    /// Similarity band: high confidence
    pub high_confidence_threshold: f64,
    /// Similarity band: medium confidence
    pub medium_confidence_threshold: f64,
    /// Default correlation window when a rule does not override (seconds)
    pub correlation_window_secs: i64,
    /// Default correlation radius when a rule does not override (meters)
    pub correlation_radius_m: f64,
    /// Fusions at or above this score are auto-verified
    pub auto_verify_threshold: f64,
    /// Fusions below this score are not materialized
    pub min_confidence: f64,
    /// Accepted clock skew between event_time and ingest_time (seconds)
    pub clock_skew_tolerance_secs: i64,
    /// Hot-store retention for raw events (hours)
    pub retention_recent_hours: i64,
    /// Anomaly detection sigma multiplier (k in mean + k*sigma)
    pub anomaly_sigma: f64,
    /// Max pending sources scanned for correlation
    pub max_pending_sources: usize,
    /// Retry budget per source before dead-lettering (seconds)
    pub ingest_retry_deadline_secs: u64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.75,
            high_confidence_threshold: 0.9,
            medium_confidence_threshold: 0.8,
            correlation_window_secs: 60,
            correlation_radius_m: 500.0,
            auto_verify_threshold: 0.9,
            min_confidence: 0.3,
            clock_skew_tolerance_secs: 300,
            retention_recent_hours: 72,
            anomaly_sigma: 3.0,
            max_pending_sources: 10_000,
            ingest_retry_deadline_secs: 60,
        }
    }
}

// ============================================================================
// Dispatch
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub enabled: bool,
    pub max_concurrent_dispatches: usize,
    /// Minimum battery for an actuator to be dispatchable (percent)
    pub min_battery_percent: f64,
    /// Force operator approval for every dispatch
    pub require_operator_approval: bool,
    /// 911-transcript keywords that trigger dispatch evaluation
    pub dangerous_keywords: Vec<String>,
    /// Keywords that escalate straight to critical priority
    pub critical_keywords: Vec<String>,
    pub default_response_radius_km: f64,
    pub command_default_timeout_secs: u64,
    pub min_altitude_m: f64,
    pub max_altitude_m: f64,
    pub max_speed_mps: f64,
    pub geofence_enabled: bool,
    /// Geofence polygon vertices as (lat, lon) pairs; empty disables the check
    pub geofence_polygon: Vec<(f64, f64)>,
    /// How long an unassignable request is retained for manual assignment (seconds)
    pub retry_window_secs: i64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_concurrent_dispatches: 10,
            min_battery_percent: 30.0,
            require_operator_approval: false,
            dangerous_keywords: [
                "gun", "shot", "shooting", "weapon", "knife", "stabbing", "hostage", "bomb",
                "explosive", "active shooter", "officer down", "ambush", "pursuit",
                "shots fired", "armed", "robbery",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            critical_keywords: ["active shooter", "officer down", "hostage", "bomb"]
                .into_iter()
                .map(String::from)
                .collect(),
            default_response_radius_km: 5.0,
            command_default_timeout_secs: 300,
            min_altitude_m: 10.0,
            max_altitude_m: 120.0,
            max_speed_mps: 20.0,
            geofence_enabled: true,
            geofence_polygon: Vec::new(),
            retry_window_secs: 900,
        }
    }
}

// ============================================================================
// Safety
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Default proximity radius when a threat type has no override (meters)
    pub proximity_radius_m: f64,
    /// Per-threat-type radius overrides, keyed by warning type wire name
    pub proximity_radius_overrides: BTreeMap<String, f64>,
    /// Warning time-to-live (minutes)
    pub warning_ttl_minutes: i64,
    /// Check-in interval before an officer is flagged overdue (minutes)
    pub checkin_interval_minutes: i64,
    /// Unacknowledged possible-fall escalates after this (seconds)
    pub fall_confirm_timeout_secs: i64,
    /// Ambush clustering time window (seconds)
    pub ambush_time_window_secs: i64,
    /// Ambush clustering distance window (meters)
    pub ambush_distance_window_m: f64,
    /// Unrelated calls within the windows to flag a possible ambush
    pub ambush_min_calls: usize,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            proximity_radius_m: 500.0,
            proximity_radius_overrides: BTreeMap::new(),
            warning_ttl_minutes: 30,
            checkin_interval_minutes: 30,
            fall_confirm_timeout_secs: 120,
            ambush_time_window_secs: 600,
            ambush_distance_window_m: 400.0,
            ambush_min_calls: 3,
        }
    }
}

// ============================================================================
// Guardrail
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailConfig {
    /// Risk score at or above which approval is forced (0-100)
    pub approval_threshold: f64,
    /// Risk factor weights; normalized at evaluation time
    pub risk_weights: RiskWeights,
    /// Fairness thresholds
    pub disparate_impact_threshold: f64,
    pub demographic_parity_threshold: f64,
    pub equal_opportunity_threshold: f64,
    pub predictive_equality_threshold: f64,
    pub calibration_threshold: f64,
    /// Approval request expiry (minutes)
    pub approval_expiry_minutes: i64,
    /// Require a fresh MFA assertion to approve
    pub approval_require_mfa: bool,
    /// MFA assertion validity window (minutes)
    pub mfa_validity_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskWeights {
    pub legal_exposure: f64,
    pub civil_rights_impact: f64,
    pub jurisdictional_authority: f64,
    pub operational_consequence: f64,
    pub political_public_risk: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            legal_exposure: 0.3,
            civil_rights_impact: 0.3,
            jurisdictional_authority: 0.15,
            operational_consequence: 0.15,
            political_public_risk: 0.1,
        }
    }
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            approval_threshold: 75.0,
            risk_weights: RiskWeights::default(),
            disparate_impact_threshold: 0.8,
            demographic_parity_threshold: 0.1,
            equal_opportunity_threshold: 0.1,
            predictive_equality_threshold: 0.1,
            calibration_threshold: 0.1,
            approval_expiry_minutes: 30,
            approval_require_mfa: true,
            mfa_validity_minutes: 10,
        }
    }
}

// ============================================================================
// Continuity
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinuityConfig {
    /// Default probe interval (seconds)
    pub probe_interval_secs: u64,
    /// Per-service probe interval overrides, keyed by service id
    pub probe_interval_overrides: BTreeMap<String, u64>,
    /// Latency above which a healthy probe is graded degraded (ms)
    pub degraded_latency_ms: f64,
    /// Consecutive failing probes before auto failover
    pub failover_consecutive_failures: u32,
    /// Consecutive healthy probes on primary before auto recovery
    pub recovery_consecutive_successes: u32,
    /// Buffered writes retained during failover
    pub failover_buffer_limit: usize,
    /// Deadline for buffered writes before discard (seconds)
    pub failover_buffer_deadline_secs: i64,
    /// Slow query threshold (ms)
    pub slow_query_threshold_ms: f64,
    /// Predictive analysis window (minutes)
    pub predictive_window_minutes: i64,
    /// Recent-window mean above k x older-window mean raises an alert
    pub predictive_degradation_factor: f64,
    /// Error-rate alert threshold within the predictive window
    pub predictive_error_threshold: usize,
    /// Audit retention (days); CJIS default is 7 years
    pub audit_retention_days: i64,
    /// Audit segment roll size (entries per segment file)
    pub audit_segment_max_entries: usize,
}

impl Default for ContinuityConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: 30,
            probe_interval_overrides: BTreeMap::new(),
            degraded_latency_ms: 1500.0,
            failover_consecutive_failures: 3,
            recovery_consecutive_successes: 3,
            failover_buffer_limit: 1000,
            failover_buffer_deadline_secs: 300,
            slow_query_threshold_ms: 1000.0,
            predictive_window_minutes: 30,
            predictive_degradation_factor: 2.0,
            predictive_error_threshold: 10,
            audit_retention_days: 2555,
            audit_segment_max_entries: 4096,
        }
    }
}

// ============================================================================
// Access
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    pub allowed_countries: Vec<String>,
    pub allowed_states: Vec<String>,
    /// CIDR blocks accepted by the IP allowlist check
    pub allowed_networks: Vec<String>,
    /// Higher-trust department network CIDRs
    pub pd_networks: Vec<String>,
    /// Suspicious-query heuristics: queries per minute per user
    pub query_rate_burst_threshold: usize,
    /// Webhook HMAC shared secrets, keyed by vendor name
    pub webhook_secrets: BTreeMap<String, String>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            allowed_countries: vec!["US".to_string()],
            allowed_states: vec!["FL".to_string()],
            allowed_networks: vec![
                "10.0.0.0/8".to_string(),
                "172.16.0.0/12".to_string(),
                "192.168.0.0/16".to_string(),
            ],
            pd_networks: vec!["10.100.0.0/16".to_string(), "192.168.100.0/24".to_string()],
            query_rate_burst_threshold: 30,
            webhook_secrets: BTreeMap::new(),
        }
    }
}

// ============================================================================
// Server
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub port: u16,
    /// Data directory for sled stores and audit segments
    pub data_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            port: 8080,
            data_dir: "./rtcc_data".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RtccConfig::default();
        assert!(config.validate().is_ok());
        assert!((config.fusion.similarity_threshold - 0.75).abs() < f64::EPSILON);
        assert_eq!(config.continuity.audit_retention_days, 2555);
    }

    #[test]
    fn invalid_altitude_bounds_rejected() {
        let mut config = RtccConfig::default();
        config.dispatch.min_altitude_m = 200.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_roundtrip_preserves_sections() {
        let config = RtccConfig::default();
        let text = toml::to_string(&config).unwrap();
        let back: RtccConfig = toml::from_str(&text).unwrap();
        assert!((back.guardrail.approval_threshold - 75.0).abs() < f64::EPSILON);
        assert_eq!(back.access.allowed_countries, vec!["US".to_string()]);
    }
}
