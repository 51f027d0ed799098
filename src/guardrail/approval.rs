//! Human-in-the-loop approval flow
//!
//! An approval request carries the gated action, its risk score, the
//! required approval tier and an expiry. Valid terminal transitions from
//! `pending`: approved, denied, escalated, expired. Approval requires a
//! role meeting the required tier and, when configured, an MFA assertion
//! within its validity window.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::GuardrailConfig;
use crate::types::{ApprovalRequest, ApprovalState, ApprovalTier};

/// Why an approval action was refused.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ApprovalError {
    #[error("approval request not found: {0}")]
    NotFound(String),

    #[error("request is not pending (state {0:?})")]
    NotPending(ApprovalState),

    #[error("approver tier {actual:?} below required {required:?}")]
    InsufficientTier {
        required: ApprovalTier,
        actual: ApprovalTier,
    },

    #[error("valid MFA assertion required")]
    MfaRequired,

    #[error("request expired at {0}")]
    Expired(DateTime<Utc>),
}

/// An approver identity presented with a decision.
#[derive(Debug, Clone)]
pub struct Approver {
    pub user_id: String,
    pub tier: ApprovalTier,
    /// When the approver last passed MFA, if at all.
    pub mfa_verified_at: Option<DateTime<Utc>>,
}

/// Queue of pending approval requests.
pub struct ApprovalQueue {
    expiry: Duration,
    require_mfa: bool,
    mfa_validity: Duration,
    requests: HashMap<String, ApprovalRequest>,
}

impl ApprovalQueue {
    pub fn from_config(cfg: &GuardrailConfig) -> Self {
        Self {
            expiry: Duration::minutes(cfg.approval_expiry_minutes),
            require_mfa: cfg.approval_require_mfa,
            mfa_validity: Duration::minutes(cfg.mfa_validity_minutes),
            requests: HashMap::new(),
        }
    }

    /// Open a request for a decision that needs review.
    ///
    /// The tier scales with risk: critical risk needs command staff,
    /// high risk a commander, everything else a supervisor.
    pub fn open(&mut self, action_id: &str, decision_id: &str, risk_score: f64) -> ApprovalRequest {
        let required_tier = if risk_score > 75.0 {
            ApprovalTier::CommandStaff
        } else if risk_score > 50.0 {
            ApprovalTier::Commander
        } else {
            ApprovalTier::Supervisor
        };

        let now = Utc::now();
        let request = ApprovalRequest {
            request_id: format!("appr-{}", Uuid::new_v4().simple()),
            action_id: action_id.to_string(),
            decision_id: decision_id.to_string(),
            risk_score,
            required_tier,
            state: ApprovalState::Pending,
            created_at: now,
            expires_at: now + self.expiry,
            approval_chain: Vec::new(),
            decided_by: None,
            decided_at: None,
        };
        info!(
            request_id = %request.request_id,
            action_id,
            risk_score,
            tier = ?required_tier,
            "Approval requested"
        );
        self.requests.insert(request.request_id.clone(), request.clone());
        request
    }

    fn validate(
        &self,
        request: &ApprovalRequest,
        approver: &Approver,
        now: DateTime<Utc>,
    ) -> Result<(), ApprovalError> {
        if request.state != ApprovalState::Pending {
            return Err(ApprovalError::NotPending(request.state));
        }
        if now >= request.expires_at {
            return Err(ApprovalError::Expired(request.expires_at));
        }
        if approver.tier < request.required_tier {
            return Err(ApprovalError::InsufficientTier {
                required: request.required_tier,
                actual: approver.tier,
            });
        }
        if self.require_mfa {
            let valid = approver
                .mfa_verified_at
                .is_some_and(|t| now - t <= self.mfa_validity);
            if !valid {
                return Err(ApprovalError::MfaRequired);
            }
        }
        Ok(())
    }

    fn decide(
        &mut self,
        request_id: &str,
        approver: &Approver,
        state: ApprovalState,
        now: DateTime<Utc>,
    ) -> Result<ApprovalRequest, ApprovalError> {
        let current = self
            .requests
            .get(request_id)
            .cloned()
            .ok_or_else(|| ApprovalError::NotFound(request_id.to_string()))?;

        // Expiry observed at decision time settles the request.
        if current.state == ApprovalState::Pending && now >= current.expires_at {
            if let Some(r) = self.requests.get_mut(request_id) {
                r.state = ApprovalState::Expired;
            }
            return Err(ApprovalError::Expired(current.expires_at));
        }

        self.validate(&current, approver, now)?;

        let request = self
            .requests
            .get_mut(request_id)
            .ok_or_else(|| ApprovalError::NotFound(request_id.to_string()))?;

        request.state = state;
        request.decided_by = Some(approver.user_id.clone());
        request.decided_at = Some(now);
        request
            .approval_chain
            .push(format!("{:?}:{}", state, approver.user_id));
        info!(request_id, state = ?state, by = %approver.user_id, "Approval decided");
        Ok(request.clone())
    }

    pub fn approve(
        &mut self,
        request_id: &str,
        approver: &Approver,
    ) -> Result<ApprovalRequest, ApprovalError> {
        self.decide(request_id, approver, ApprovalState::Approved, Utc::now())
    }

    pub fn deny(
        &mut self,
        request_id: &str,
        approver: &Approver,
    ) -> Result<ApprovalRequest, ApprovalError> {
        self.decide(request_id, approver, ApprovalState::Denied, Utc::now())
    }

    /// Escalate to the next tier without deciding.
    pub fn escalate(
        &mut self,
        request_id: &str,
        approver: &Approver,
    ) -> Result<ApprovalRequest, ApprovalError> {
        let next_tier = {
            let request = self
                .requests
                .get(request_id)
                .ok_or_else(|| ApprovalError::NotFound(request_id.to_string()))?;
            match request.required_tier {
                ApprovalTier::Supervisor => ApprovalTier::Commander,
                ApprovalTier::Commander => ApprovalTier::CommandStaff,
                _ => ApprovalTier::Chief,
            }
        };
        let decided = self.decide(request_id, approver, ApprovalState::Escalated, Utc::now())?;

        // Escalation opens a fresh pending request at the higher tier.
        let reopened = ApprovalRequest {
            request_id: format!("appr-{}", Uuid::new_v4().simple()),
            required_tier: next_tier,
            state: ApprovalState::Pending,
            created_at: Utc::now(),
            expires_at: Utc::now() + self.expiry,
            decided_by: None,
            decided_at: None,
            ..decided
        };
        self.requests
            .insert(reopened.request_id.clone(), reopened.clone());
        Ok(reopened)
    }

    /// Expiry sweep: pending requests past their deadline expire.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Vec<ApprovalRequest> {
        let mut expired = Vec::new();
        for request in self.requests.values_mut() {
            if request.state == ApprovalState::Pending && now >= request.expires_at {
                request.state = ApprovalState::Expired;
                warn!(request_id = %request.request_id, "Approval request expired");
                expired.push(request.clone());
            }
        }
        expired
    }

    pub fn get(&self, request_id: &str) -> Option<&ApprovalRequest> {
        self.requests.get(request_id)
    }

    pub fn pending(&self) -> Vec<&ApprovalRequest> {
        self.requests
            .values()
            .filter(|r| r.state == ApprovalState::Pending)
            .collect()
    }

    /// Pending request gating a given action, if any.
    pub fn pending_for_action(&self, action_id: &str) -> Option<&ApprovalRequest> {
        self.requests
            .values()
            .find(|r| r.action_id == action_id && r.state == ApprovalState::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> ApprovalQueue {
        ApprovalQueue::from_config(&GuardrailConfig::default())
    }

    fn supervisor() -> Approver {
        Approver {
            user_id: "sup-1".into(),
            tier: ApprovalTier::Supervisor,
            mfa_verified_at: Some(Utc::now()),
        }
    }

    #[test]
    fn approve_happy_path() {
        let mut q = queue();
        let request = q.open("act-1", "grd-1", 40.0);
        assert_eq!(request.required_tier, ApprovalTier::Supervisor);

        let decided = q.approve(&request.request_id, &supervisor()).unwrap();
        assert_eq!(decided.state, ApprovalState::Approved);
        assert_eq!(decided.decided_by.as_deref(), Some("sup-1"));
        assert_eq!(decided.approval_chain.len(), 1);
    }

    #[test]
    fn tier_too_low_is_rejected() {
        let mut q = queue();
        let request = q.open("act-1", "grd-1", 80.0);
        assert_eq!(request.required_tier, ApprovalTier::CommandStaff);

        let err = q.approve(&request.request_id, &supervisor()).unwrap_err();
        assert!(matches!(err, ApprovalError::InsufficientTier { .. }));
        // Still pending after the failed attempt.
        assert_eq!(
            q.get(&request.request_id).unwrap().state,
            ApprovalState::Pending
        );
    }

    #[test]
    fn stale_mfa_is_rejected() {
        let mut q = queue();
        let request = q.open("act-1", "grd-1", 30.0);
        let mut approver = supervisor();
        approver.mfa_verified_at = Some(Utc::now() - Duration::minutes(60));
        assert_eq!(
            q.approve(&request.request_id, &approver).unwrap_err(),
            ApprovalError::MfaRequired
        );
    }

    #[test]
    fn sweep_expires_pending_requests() {
        let mut q = queue();
        let request = q.open("act-1", "grd-1", 30.0);
        let expired = q.sweep(Utc::now() + Duration::minutes(31));
        assert_eq!(expired.len(), 1);
        assert_eq!(
            q.get(&request.request_id).unwrap().state,
            ApprovalState::Expired
        );
        // Deciding an expired request fails.
        assert!(matches!(
            q.approve(&request.request_id, &supervisor()).unwrap_err(),
            ApprovalError::NotPending(_)
        ));
    }

    #[test]
    fn escalation_reopens_at_higher_tier() {
        let mut q = queue();
        let request = q.open("act-1", "grd-1", 30.0);
        let reopened = q.escalate(&request.request_id, &supervisor()).unwrap();
        assert_eq!(reopened.state, ApprovalState::Pending);
        assert_eq!(reopened.required_tier, ApprovalTier::Commander);
        assert_eq!(
            q.get(&request.request_id).unwrap().state,
            ApprovalState::Escalated
        );
        assert!(q.pending_for_action("act-1").is_some());
    }
}
