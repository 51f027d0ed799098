//! Zero-Trust Gateway - per-request access evaluation
//!
//! Each request yields five contributing scores (IP allowlist 0.15, geo
//! 0.15, token 0.25, role permissions 0.20, device 0.15) plus mTLS 0.10.
//! Hard failures (blocked IP, invalid token, disallowed country/state,
//! role resource mismatch) short-circuit to deny. Otherwise:
//! allow >= 0.70, challenge in [0.50, 0.70) with outstanding actions,
//! require_mfa in [0.40, 0.50), deny below.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use tracing::{info, warn};

use crate::config::AccessConfig;
use crate::types::{
    AccessDecision, AccessRequest, AccessResult, DeviceFingerprint, RolePolicy,
};

use super::roles::{default_roles, resource_matches};
use super::session::SessionRegistry;

/// A parsed IPv4 CIDR block.
#[derive(Debug, Clone, Copy)]
struct Cidr {
    base: u32,
    mask: u32,
}

impl Cidr {
    fn parse(s: &str) -> Option<Self> {
        let (addr, bits) = s.split_once('/')?;
        let addr: Ipv4Addr = addr.parse().ok()?;
        let bits: u32 = bits.parse().ok()?;
        if bits > 32 {
            return None;
        }
        let mask = if bits == 0 { 0 } else { u32::MAX << (32 - bits) };
        Some(Self {
            base: u32::from(addr) & mask,
            mask,
        })
    }

    fn contains(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) & self.mask == self.base
    }
}

/// The zero-trust gateway.
pub struct ZeroTrustGateway {
    config: AccessConfig,
    allowed_networks: Vec<Cidr>,
    pd_networks: Vec<Cidr>,
    roles: HashMap<String, RolePolicy>,
    registered_devices: HashMap<String, DeviceFingerprint>,
    blocked_ips: HashSet<String>,
    blocked_devices: HashSet<String>,
    pub sessions: SessionRegistry,
    access_log: Vec<AccessResult>,
}

impl ZeroTrustGateway {
    pub fn new(config: AccessConfig) -> Self {
        let allowed_networks = config
            .allowed_networks
            .iter()
            .filter_map(|s| Cidr::parse(s))
            .collect();
        let pd_networks = config
            .pd_networks
            .iter()
            .filter_map(|s| Cidr::parse(s))
            .collect();
        Self {
            config,
            allowed_networks,
            pd_networks,
            roles: default_roles(),
            registered_devices: HashMap::new(),
            blocked_ips: HashSet::new(),
            blocked_devices: HashSet::new(),
            sessions: SessionRegistry::new(),
            access_log: Vec::new(),
        }
    }

    pub fn role(&self, name: &str) -> Option<&RolePolicy> {
        self.roles.get(name)
    }

    pub fn set_role(&mut self, name: &str, policy: RolePolicy) {
        self.roles.insert(name.to_string(), policy);
    }

    /// Evaluate one request through the zero-trust checks.
    pub fn validate_access(&mut self, request: &AccessRequest) -> AccessResult {
        let mut checks_passed = Vec::new();
        let mut checks_failed = Vec::new();
        let mut required_actions = Vec::new();
        let mut trust_score = 0.0_f64;

        // Blocked IP: immediate deny.
        if self.blocked_ips.contains(&request.source_ip) {
            return self.finish(
                request,
                AccessDecision::Deny,
                "IP address is blocked".into(),
                0.0,
                vec![],
                vec!["ip_not_blocked".into()],
                vec![],
            );
        }

        // IP allowlist (0.15).
        if self.check_ip(&request.source_ip) {
            checks_passed.push("ip_allowlist".to_string());
            trust_score += 0.15;
        } else {
            checks_failed.push("ip_allowlist".to_string());
        }

        // Geo restriction (0.15); disallowed country/state hard-fails.
        match self.check_geo(request) {
            GeoCheck::Pass => {
                checks_passed.push("geo_restriction".to_string());
                trust_score += 0.15;
            }
            GeoCheck::SoftFail => {
                checks_failed.push("geo_restriction".to_string());
            }
            GeoCheck::HardFail(reason) => {
                checks_failed.push("geo_restriction".to_string());
                return self.finish(
                    request,
                    AccessDecision::Deny,
                    format!("Geographic restriction violation: {reason}"),
                    trust_score,
                    checks_passed,
                    checks_failed,
                    vec![],
                );
            }
        }

        // Token validity (0.25); invalid token hard-fails.
        match &request.token {
            Some(token) if token.len() >= 20 => {
                checks_passed.push("token_validation".to_string());
                trust_score += 0.25;
            }
            Some(_) => {
                checks_failed.push("token_validation".to_string());
                return self.finish(
                    request,
                    AccessDecision::Deny,
                    "Token validation failed: invalid token format".into(),
                    trust_score,
                    checks_passed,
                    checks_failed,
                    vec![],
                );
            }
            None => {
                checks_failed.push("token_validation".to_string());
                return self.finish(
                    request,
                    AccessDecision::Deny,
                    "Token validation failed: no token provided".into(),
                    trust_score,
                    checks_passed,
                    checks_failed,
                    vec![],
                );
            }
        }

        // Role permissions (0.20); mismatch hard-fails.
        let role_policy = match self.check_role(request) {
            Ok(policy) => {
                checks_passed.push("role_permissions".to_string());
                trust_score += 0.20;
                policy
            }
            Err(reason) => {
                checks_failed.push("role_permissions".to_string());
                return self.finish(
                    request,
                    AccessDecision::Deny,
                    format!("Role permission denied: {reason}"),
                    trust_score,
                    checks_passed,
                    checks_failed,
                    vec![],
                );
            }
        };

        // Device fingerprint (0.15).
        match self.check_device(request, &role_policy) {
            DeviceCheck::Pass => {
                checks_passed.push("device_fingerprint".to_string());
                trust_score += 0.15;
            }
            DeviceCheck::Fail { needs_verification } => {
                checks_failed.push("device_fingerprint".to_string());
                if needs_verification {
                    required_actions.push("device_verification".to_string());
                }
            }
        }

        // mTLS (0.10).
        if request.mtls_presented {
            checks_passed.push("mtls".to_string());
            trust_score += 0.10;
        } else {
            checks_failed.push("mtls".to_string());
        }

        // Role-specific MFA.
        if role_policy.require_mfa && !request.mfa_verified {
            required_actions.push("mfa_verification".to_string());
        }

        let (decision, reason) = if trust_score >= 0.70 {
            (
                AccessDecision::Allow,
                "Access granted - all critical checks passed".to_string(),
            )
        } else if trust_score >= 0.50 && !required_actions.is_empty() {
            (
                AccessDecision::Challenge,
                format!("Additional verification required: {}", required_actions.join(", ")),
            )
        } else if trust_score >= 0.40 {
            (
                AccessDecision::RequireMfa,
                "MFA verification required due to low trust score".to_string(),
            )
        } else {
            (
                AccessDecision::Deny,
                format!("Access denied - trust score too low ({trust_score:.2})"),
            )
        };

        let mut result = self.finish(
            request,
            decision,
            reason,
            trust_score,
            checks_passed,
            checks_failed,
            required_actions,
        );

        // Session creation on allow.
        if decision == AccessDecision::Allow {
            if let (Some(user_id), Some(role)) = (&request.user_id, &request.role) {
                let session = self.sessions.create(
                    user_id,
                    role,
                    &request.source_ip,
                    request.device.as_ref().map(|d| d.fingerprint_id.clone()),
                    trust_score,
                );
                result.session_token = Some(session.token.clone());
                result.expires_at = Some(
                    Utc::now() + chrono::Duration::minutes(role_policy.session_timeout_minutes),
                );
                if let Some(last) = self.access_log.last_mut() {
                    last.session_token = result.session_token.clone();
                    last.expires_at = result.expires_at;
                }
            }
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &mut self,
        request: &AccessRequest,
        decision: AccessDecision,
        reason: String,
        trust_score: f64,
        checks_passed: Vec<String>,
        checks_failed: Vec<String>,
        required_actions: Vec<String>,
    ) -> AccessResult {
        let result = AccessResult {
            request_id: request.request_id.clone(),
            decision,
            reason,
            trust_score,
            checks_passed,
            checks_failed,
            required_actions,
            timestamp: Utc::now(),
            session_token: None,
            expires_at: None,
        };
        match decision {
            AccessDecision::Allow => info!(
                request_id = %result.request_id,
                user = request.user_id.as_deref().unwrap_or("-"),
                trust = trust_score,
                "Access allowed"
            ),
            _ => warn!(
                request_id = %result.request_id,
                user = request.user_id.as_deref().unwrap_or("-"),
                decision = %decision,
                reason = %result.reason,
                "Access not allowed"
            ),
        }
        self.access_log.push(result.clone());
        result
    }

    fn check_ip(&self, ip: &str) -> bool {
        let Ok(addr) = ip.parse::<Ipv4Addr>() else {
            return false;
        };
        self.pd_networks.iter().any(|n| n.contains(addr))
            || self.allowed_networks.iter().any(|n| n.contains(addr))
    }

    fn check_geo(&self, request: &AccessRequest) -> GeoCheck {
        let Some(geo) = &request.geo else {
            return GeoCheck::SoftFail;
        };
        if let Some(country) = &geo.country {
            if !self.config.allowed_countries.iter().any(|c| c == country) {
                return GeoCheck::HardFail(format!("country {country} not allowed"));
            }
        } else {
            return GeoCheck::SoftFail;
        }
        if let Some(state) = &geo.state {
            if !self.config.allowed_states.iter().any(|s| s == state) {
                return GeoCheck::HardFail(format!("state {state} not allowed"));
            }
        }
        GeoCheck::Pass
    }

    fn check_role(&self, request: &AccessRequest) -> Result<RolePolicy, String> {
        let Some(role) = &request.role else {
            return Err("no role specified".into());
        };
        let Some(policy) = self.roles.get(role) else {
            return Err(format!("unknown role: {role}"));
        };
        if resource_matches(&policy.allowed_resources, &request.requested_resource) {
            Ok(policy.clone())
        } else {
            Err(format!(
                "resource {} not allowed for role {role}",
                request.requested_resource
            ))
        }
    }

    fn check_device(&self, request: &AccessRequest, policy: &RolePolicy) -> DeviceCheck {
        let Some(device) = &request.device else {
            if policy.require_managed_device {
                return DeviceCheck::Fail {
                    needs_verification: true,
                };
            }
            return DeviceCheck::Pass;
        };
        if self.blocked_devices.contains(&device.fingerprint_id) {
            return DeviceCheck::Fail {
                needs_verification: false,
            };
        }
        let Some(registered) = self.registered_devices.get(&device.fingerprint_id) else {
            if policy.require_managed_device {
                return DeviceCheck::Fail {
                    needs_verification: true,
                };
            }
            return DeviceCheck::Pass;
        };
        if policy.require_managed_device && !registered.is_managed {
            return DeviceCheck::Fail {
                needs_verification: true,
            };
        }
        if !registered.is_compliant {
            return DeviceCheck::Fail {
                needs_verification: true,
            };
        }
        DeviceCheck::Pass
    }

    // ------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------

    pub fn register_device(&mut self, device: DeviceFingerprint) {
        self.registered_devices
            .insert(device.fingerprint_id.clone(), device);
    }

    pub fn block_ip(&mut self, ip: &str) {
        self.blocked_ips.insert(ip.to_string());
    }

    pub fn unblock_ip(&mut self, ip: &str) {
        self.blocked_ips.remove(ip);
    }

    pub fn block_device(&mut self, fingerprint_id: &str) {
        self.blocked_devices.insert(fingerprint_id.to_string());
    }

    pub fn access_log(&self, decision: Option<AccessDecision>, limit: usize) -> Vec<&AccessResult> {
        self.access_log
            .iter()
            .rev()
            .filter(|r| decision.is_none_or(|d| r.decision == d))
            .take(limit)
            .collect()
    }

    /// Per-role session timeout used by the expiry sweep.
    pub fn session_timeout_minutes(&self, role: &str) -> i64 {
        self.roles
            .get(role)
            .map_or(60, |p| p.session_timeout_minutes)
    }
}

enum GeoCheck {
    Pass,
    SoftFail,
    HardFail(String),
}

enum DeviceCheck {
    Pass,
    Fail { needs_verification: bool },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoClaim;

    fn gateway() -> ZeroTrustGateway {
        ZeroTrustGateway::new(AccessConfig::default())
    }

    fn base_request() -> AccessRequest {
        AccessRequest {
            request_id: "req-1".into(),
            timestamp: Utc::now(),
            source_ip: "10.100.4.20".into(),
            user_id: Some("u1".into()),
            role: Some("RTCC_COMMANDER".into()),
            token: Some("tok-0123456789abcdef0123456789".into()),
            device: None,
            requested_resource: "/api/fusion/active".into(),
            http_method: "GET".into(),
            geo: Some(GeoClaim {
                country: Some("US".into()),
                state: Some("FL".into()),
                county: None,
            }),
            mtls_presented: true,
            mfa_verified: true,
        }
    }

    #[test]
    fn full_trust_request_is_allowed_with_session() {
        let mut gw = gateway();
        let result = gw.validate_access(&base_request());
        assert_eq!(result.decision, AccessDecision::Allow);
        assert!(result.trust_score >= 0.70);
        assert!(result.session_token.is_some());
        assert!(result.expires_at.is_some());
    }

    #[test]
    fn disallowed_country_hard_fails() {
        let mut gw = gateway();
        let mut req = base_request();
        req.geo = Some(GeoClaim {
            country: Some("XX".into()),
            state: None,
            county: None,
        });
        let result = gw.validate_access(&req);
        assert_eq!(result.decision, AccessDecision::Deny);
        assert!(result.reason.contains("country XX"));
        // Decision logged for CJIS.
        assert_eq!(gw.access_log(Some(AccessDecision::Deny), 10).len(), 1);
    }

    #[test]
    fn missing_token_denies() {
        let mut gw = gateway();
        let mut req = base_request();
        req.token = None;
        let result = gw.validate_access(&req);
        assert_eq!(result.decision, AccessDecision::Deny);
        assert!(result.checks_failed.contains(&"token_validation".to_string()));
    }

    #[test]
    fn resource_outside_role_denies() {
        let mut gw = gateway();
        let mut req = base_request();
        req.role = Some("READ_ONLY".into());
        let result = gw.validate_access(&req);
        assert_eq!(result.decision, AccessDecision::Deny);
        assert!(result.reason.contains("not allowed for role"));
    }

    #[test]
    fn blocked_ip_short_circuits() {
        let mut gw = gateway();
        gw.block_ip("10.100.4.20");
        let result = gw.validate_access(&base_request());
        assert_eq!(result.decision, AccessDecision::Deny);
        assert_eq!(result.trust_score, 0.0);
    }

    #[test]
    fn exact_seventy_allows_and_below_challenges() {
        let mut gw = gateway();
        // No mTLS (0.10 lost), managed device not provided for commander
        // (0.15 lost): ip .15 + geo .15 + token .25 + role .20 = 0.75 - still allow.
        let mut req = base_request();
        req.mtls_presented = false;
        // Commander requires managed device: device missing fails that
        // check and queues device_verification.
        let result = gw.validate_access(&req);
        // ip .15 + geo .15 + token .25 + role .20 = 0.75 >= 0.70 => allow
        assert_eq!(result.decision, AccessDecision::Allow);

        // Drop the IP allowlist too: 0.60 with outstanding actions => challenge.
        let mut req2 = base_request();
        req2.mtls_presented = false;
        req2.source_ip = "8.8.8.8".into();
        req2.mfa_verified = false;
        let result = gw.validate_access(&req2);
        assert_eq!(result.decision, AccessDecision::Challenge);
        assert!(result
            .required_actions
            .contains(&"mfa_verification".to_string()));
    }
}
