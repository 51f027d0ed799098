//! Role policy table and resource glob matching

use std::collections::HashMap;

use crate::types::{RolePolicy, TrustLevel};

/// Built-in role table; deployments override via configuration.
pub fn default_roles() -> HashMap<String, RolePolicy> {
    let mut roles = HashMap::new();
    roles.insert(
        "SYSTEM_ADMIN".to_string(),
        RolePolicy {
            trust_level: TrustLevel::Verified,
            allowed_resources: vec!["*".into()],
            require_mfa: true,
            require_managed_device: true,
            session_timeout_minutes: 30,
        },
    );
    roles.insert(
        "RTCC_COMMANDER".to_string(),
        RolePolicy {
            trust_level: TrustLevel::High,
            allowed_resources: vec!["/api/*".into(), "/ws/*".into(), "/dashboard/*".into()],
            require_mfa: true,
            require_managed_device: true,
            session_timeout_minutes: 60,
        },
    );
    roles.insert(
        "ANALYST".to_string(),
        RolePolicy {
            trust_level: TrustLevel::Medium,
            allowed_resources: vec![
                "/api/analytics/*".into(),
                "/api/investigations/*".into(),
                "/api/intel/*".into(),
                "/dashboard/*".into(),
            ],
            require_mfa: true,
            require_managed_device: false,
            session_timeout_minutes: 120,
        },
    );
    roles.insert(
        "PATROL_OFFICER".to_string(),
        RolePolicy {
            trust_level: TrustLevel::Medium,
            allowed_resources: vec![
                "/api/mdt/*".into(),
                "/api/dispatch/*".into(),
                "/api/alerts/*".into(),
                "/mobile/*".into(),
            ],
            require_mfa: false,
            require_managed_device: true,
            session_timeout_minutes: 480,
        },
    );
    roles.insert(
        "DISPATCHER".to_string(),
        RolePolicy {
            trust_level: TrustLevel::Medium,
            allowed_resources: vec![
                "/api/dispatch/*".into(),
                "/api/units/*".into(),
                "/api/alerts/*".into(),
            ],
            require_mfa: true,
            require_managed_device: true,
            session_timeout_minutes: 240,
        },
    );
    roles.insert(
        "AUDITOR".to_string(),
        RolePolicy {
            trust_level: TrustLevel::Medium,
            allowed_resources: vec![
                "/api/audit/*".into(),
                "/api/compliance/*".into(),
                "/api/logs/*".into(),
            ],
            require_mfa: true,
            require_managed_device: true,
            session_timeout_minutes: 120,
        },
    );
    roles.insert(
        "READ_ONLY".to_string(),
        RolePolicy {
            trust_level: TrustLevel::Low,
            allowed_resources: vec!["/api/public/*".into()],
            require_mfa: false,
            require_managed_device: false,
            session_timeout_minutes: 60,
        },
    );
    roles
}

/// A resource matches when any pattern in the role's list matches the
/// path: `*` matches everything, a trailing `/*` matches the prefix,
/// otherwise exact match.
pub fn resource_matches(patterns: &[String], resource: &str) -> bool {
    patterns.iter().any(|pattern| {
        if pattern == "*" {
            true
        } else if let Some(prefix) = pattern.strip_suffix("/*") {
            resource == prefix || resource.starts_with(&format!("{prefix}/"))
        } else {
            pattern == resource
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_everything() {
        assert!(resource_matches(&["*".to_string()], "/anything/at/all"));
    }

    #[test]
    fn prefix_glob_matches_subpaths_only() {
        let patterns = vec!["/api/dispatch/*".to_string()];
        assert!(resource_matches(&patterns, "/api/dispatch/requests"));
        assert!(resource_matches(&patterns, "/api/dispatch"));
        assert!(!resource_matches(&patterns, "/api/dispatcher"));
        assert!(!resource_matches(&patterns, "/api/intel/x"));
    }

    #[test]
    fn exact_pattern_requires_exact_path() {
        let patterns = vec!["/api/health".to_string()];
        assert!(resource_matches(&patterns, "/api/health"));
        assert!(!resource_matches(&patterns, "/api/health/deep"));
    }

    #[test]
    fn default_roles_cover_commander() {
        let roles = default_roles();
        let commander = &roles["RTCC_COMMANDER"];
        assert!(resource_matches(&commander.allowed_resources, "/api/fusion/active"));
        assert!(!resource_matches(&commander.allowed_resources, "/admin/secrets"));
    }
}
