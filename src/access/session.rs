//! Session lifecycle - tokens bound to user, role, IP and device

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{debug, info};

use crate::types::Session;

/// Concurrent session registry with per-role idle expiry.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn new_token() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(43)
            .map(char::from)
            .collect()
    }

    /// Create a session bound to the request identity.
    pub fn create(
        &self,
        user_id: &str,
        role: &str,
        source_ip: &str,
        device_fingerprint: Option<String>,
        trust_score: f64,
    ) -> Session {
        let now = Utc::now();
        let session = Session {
            token: Self::new_token(),
            user_id: user_id.to_string(),
            role: role.to_string(),
            source_ip: source_ip.to_string(),
            device_fingerprint,
            trust_score,
            created_at: now,
            last_activity: now,
        };
        debug!(user_id, role, "Session created");
        self.sessions.insert(session.token.clone(), session.clone());
        session
    }

    /// Validate and touch a session; the binding to source IP is
    /// re-checked on every use.
    pub fn touch(&self, token: &str, source_ip: &str, timeout_minutes: i64) -> Option<Session> {
        let mut entry = self.sessions.get_mut(token)?;
        if entry.source_ip != source_ip {
            return None;
        }
        let now = Utc::now();
        if now - entry.last_activity > Duration::minutes(timeout_minutes) {
            drop(entry);
            self.sessions.remove(token);
            return None;
        }
        entry.last_activity = now;
        Some(entry.clone())
    }

    pub fn get(&self, token: &str) -> Option<Session> {
        self.sessions.get(token).map(|s| s.clone())
    }

    pub fn invalidate(&self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    /// Remove sessions idle past their role's timeout.
    ///
    /// `timeout_for` maps a role name to its timeout in minutes.
    pub fn sweep_expired(
        &self,
        now: DateTime<Utc>,
        timeout_for: impl Fn(&str) -> i64,
    ) -> usize {
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|s| now - s.last_activity > Duration::minutes(timeout_for(&s.role)))
            .map(|s| s.token.clone())
            .collect();
        for token in &expired {
            self.sessions.remove(token);
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "Expired sessions swept");
        }
        expired.len()
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_touch() {
        let reg = SessionRegistry::new();
        let session = reg.create("u1", "ANALYST", "10.0.0.5", None, 0.8);
        assert!(reg.touch(&session.token, "10.0.0.5", 120).is_some());
        // IP binding enforced.
        assert!(reg.touch(&session.token, "10.9.9.9", 120).is_none());
    }

    #[test]
    fn idle_sessions_expire_on_touch() {
        let reg = SessionRegistry::new();
        let session = reg.create("u1", "ANALYST", "10.0.0.5", None, 0.8);
        // Zero-minute timeout expires immediately on next touch.
        assert!(reg.touch(&session.token, "10.0.0.5", 0).is_none());
        assert_eq!(reg.active_count(), 0);
    }

    #[test]
    fn sweep_uses_per_role_timeouts() {
        let reg = SessionRegistry::new();
        reg.create("u1", "SHORT", "10.0.0.5", None, 0.8);
        reg.create("u2", "LONG", "10.0.0.6", None, 0.8);
        let removed = reg.sweep_expired(Utc::now() + Duration::minutes(10), |role| {
            if role == "SHORT" {
                5
            } else {
                480
            }
        });
        assert_eq!(removed, 1);
        assert_eq!(reg.active_count(), 1);
    }

    #[test]
    fn tokens_are_unique() {
        let reg = SessionRegistry::new();
        let a = reg.create("u1", "ANALYST", "10.0.0.5", None, 0.8);
        let b = reg.create("u1", "ANALYST", "10.0.0.5", None, 0.8);
        assert_ne!(a.token, b.token);
    }
}
