//! Zero-trust gateway: geo hard fail, trust bands, sessions, CJIS log.

use chrono::Utc;
use std::collections::BTreeMap;

use rtcc_core::access::{CjisQueryLog, ZeroTrustGateway};
use rtcc_core::config::AccessConfig;
use rtcc_core::types::{AccessDecision, AccessRequest, GeoClaim};

fn request(resource: &str) -> AccessRequest {
    AccessRequest {
        request_id: "req-1".into(),
        timestamp: Utc::now(),
        source_ip: "10.100.7.31".into(),
        user_id: Some("cmdr-1".into()),
        role: Some("RTCC_COMMANDER".into()),
        token: Some("tok-abcdef0123456789abcdef01".into()),
        device: None,
        requested_resource: resource.to_string(),
        http_method: "GET".into(),
        geo: Some(GeoClaim {
            country: Some("US".into()),
            state: Some("FL".into()),
            county: Some("Palm Beach".into()),
        }),
        mtls_presented: true,
        mfa_verified: true,
    }
}

#[test]
fn foreign_country_hard_fails_with_reason_and_log() {
    let mut gateway = ZeroTrustGateway::new(AccessConfig::default());
    let mut req = request("/api/fusion/active");
    req.geo = Some(GeoClaim {
        country: Some("XX".into()),
        state: None,
        county: None,
    });

    let result = gateway.validate_access(&req);
    assert_eq!(result.decision, AccessDecision::Deny);
    assert!(result.reason.contains("country XX"), "{}", result.reason);
    assert!(result.session_token.is_none());

    // Every decision lands in the access log for CJIS review.
    let denied = gateway.access_log(Some(AccessDecision::Deny), 10);
    assert_eq!(denied.len(), 1);
    assert_eq!(denied[0].request_id, "req-1");
}

#[test]
fn valid_commander_request_allows_and_creates_session() {
    let mut gateway = ZeroTrustGateway::new(AccessConfig::default());
    let result = gateway.validate_access(&request("/api/fusion/active"));
    assert_eq!(result.decision, AccessDecision::Allow);
    assert!(result.trust_score >= 0.70);

    let token = result.session_token.unwrap();
    // Session binds to the source IP.
    assert!(gateway.sessions.touch(&token, "10.100.7.31", 60).is_some());
    assert!(gateway.sessions.touch(&token, "203.0.113.9", 60).is_none());
}

#[test]
fn trust_score_bands_are_exclusive_at_the_boundaries() {
    let mut gateway = ZeroTrustGateway::new(AccessConfig::default());

    // All checks pass except mTLS and device: .15+.15+.25+.20 = 0.75 -> allow.
    let mut req = request("/api/fusion/active");
    req.mtls_presented = false;
    let result = gateway.validate_access(&req);
    assert_eq!(result.decision, AccessDecision::Allow);

    // Additionally off the allowlist: 0.60 with outstanding MFA -> challenge.
    let mut req = request("/api/fusion/active");
    req.mtls_presented = false;
    req.source_ip = "198.51.100.7".into();
    req.mfa_verified = false;
    let result = gateway.validate_access(&req);
    assert_eq!(result.decision, AccessDecision::Challenge);
}

#[test]
fn analyst_cannot_reach_dispatch_surface() {
    let mut gateway = ZeroTrustGateway::new(AccessConfig::default());
    let mut req = request("/api/dispatch/requests");
    req.role = Some("ANALYST".into());
    let result = gateway.validate_access(&req);
    assert_eq!(result.decision, AccessDecision::Deny);
    assert!(result.reason.contains("not allowed for role"));
}

#[test]
fn cjis_log_masks_and_flags() {
    let mut log = CjisQueryLog::new(30);

    let mut params = BTreeMap::new();
    params.insert("dl_number".to_string(), "D123-456-78-900".to_string());
    params.insert("plate".to_string(), "ABC123".to_string());
    let record = log.log_query(
        "cmdr-1",
        "active investigation",
        "ncic_query",
        params,
        "1 record",
        None,
    );
    // Sensitive parameter masked; sensitive query without case number flagged.
    assert_eq!(record.parameters["dl_number"], "***MASKED***");
    assert_eq!(record.parameters["plate"], "ABC123");
    assert!(record.flagged);
    assert_eq!(log.flagged().len(), 1);
}
