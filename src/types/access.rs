//! Zero-trust access types: decisions, roles, sessions, CJIS query records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Decisions
// ============================================================================

/// Per-request access decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccessDecision {
    Allow,
    Deny,
    Challenge,
    RequireMfa,
}

impl std::fmt::Display for AccessDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AccessDecision::Allow => "allow",
            AccessDecision::Deny => "deny",
            AccessDecision::Challenge => "challenge",
            AccessDecision::RequireMfa => "require_mfa",
        };
        write!(f, "{s}")
    }
}

/// Trust levels a role confers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    Untrusted,
    Low,
    Medium,
    High,
    Verified,
}

/// Device identity presented with a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceFingerprint {
    pub fingerprint_id: String,
    pub device_type: String,
    pub is_managed: bool,
    pub is_compliant: bool,
    pub registered_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Geographic claim attached to a request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeoClaim {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub county: Option<String>,
}

/// An inbound access request, normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRequest {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    pub source_ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceFingerprint>,
    pub requested_resource: String,
    pub http_method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo: Option<GeoClaim>,
    /// True when the request carried a verified client certificate.
    #[serde(default)]
    pub mtls_presented: bool,
    /// True when a valid MFA assertion accompanied the request.
    #[serde(default)]
    pub mfa_verified: bool,
}

/// Result of zero-trust evaluation, logged for CJIS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessResult {
    pub request_id: String,
    pub decision: AccessDecision,
    pub reason: String,
    pub trust_score: f64,
    pub checks_passed: Vec<String>,
    pub checks_failed: Vec<String>,
    pub required_actions: Vec<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Roles and Sessions
// ============================================================================

/// Per-role access policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolePolicy {
    pub trust_level: TrustLevel,
    /// Glob patterns (`*`, `/api/*`) over resource paths.
    pub allowed_resources: Vec<String>,
    pub require_mfa: bool,
    pub require_managed_device: bool,
    pub session_timeout_minutes: i64,
}

/// An active session bound to user, role, IP, and device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub role: String,
    pub source_ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_fingerprint: Option<String>,
    pub trust_score: f64,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

// ============================================================================
// CJIS Query Logging
// ============================================================================

/// Audit record for every query over regulated data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CjisQueryRecord {
    pub transaction_id: String,
    pub user_id: String,
    pub purpose: String,
    pub query_type: String,
    /// Parameters with sensitive fields already masked.
    pub parameters: BTreeMap<String, String>,
    pub response_summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_number: Option<String>,
    pub sensitive: bool,
    pub timestamp: DateTime<Utc>,
    pub flagged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag_reason: Option<String>,
}
