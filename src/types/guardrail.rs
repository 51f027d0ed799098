//! Guardrail types: rule layers, action context, decisions, risk, fairness

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Rule Layers
// ============================================================================

/// Rule layers in strict precedence order, highest authority first.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum RuleLayer {
    FederalConstitutional,
    FederalStatute,
    StateStatute,
    LocalOrdinance,
    AgencySop,
    ModelConstraint,
}

impl RuleLayer {
    /// All layers in precedence order.
    pub const ORDERED: [RuleLayer; 6] = [
        RuleLayer::FederalConstitutional,
        RuleLayer::FederalStatute,
        RuleLayer::StateStatute,
        RuleLayer::LocalOrdinance,
        RuleLayer::AgencySop,
        RuleLayer::ModelConstraint,
    ];
}

impl std::fmt::Display for RuleLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RuleLayer::FederalConstitutional => "federal_constitutional",
            RuleLayer::FederalStatute => "federal_statute",
            RuleLayer::StateStatute => "state_statute",
            RuleLayer::LocalOrdinance => "local_ordinance",
            RuleLayer::AgencySop => "agency_sop",
            RuleLayer::ModelConstraint => "model_constraint",
        };
        write!(f, "{s}")
    }
}

/// Outcome a matched rule prescribes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Allow,
    Deny,
    RequireApproval,
}

// ============================================================================
// Action Context
// ============================================================================

/// Kinds of proposed actions the pipeline gates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Surveillance,
    Search,
    UseOfForce,
    DataQuery,
    DroneSortie,
    Pursuit,
    Detention,
    EnforcementRecommendation,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionKind::Surveillance => "surveillance",
            ActionKind::Search => "search",
            ActionKind::UseOfForce => "use_of_force",
            ActionKind::DataQuery => "data_query",
            ActionKind::DroneSortie => "drone_sortie",
            ActionKind::Pursuit => "pursuit",
            ActionKind::Detention => "detention",
            ActionKind::EnforcementRecommendation => "enforcement_recommendation",
        };
        write!(f, "{s}")
    }
}

/// Context a proposed action is evaluated against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionContext {
    pub action_id: String,
    pub action_kind: Option<ActionKind>,
    #[serde(default)]
    pub probable_cause: bool,
    #[serde(default)]
    pub warrant_obtained: bool,
    #[serde(default)]
    pub consent_given: bool,
    #[serde(default)]
    pub miranda_given: bool,
    /// Force level on a 0-5 escalation scale when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_level: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pursuit_speed_mph: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_contacts: Option<u32>,
    /// Subject demographics when supplied (group labels only, no PII).
    #[serde(default)]
    pub subject_demographics: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requesting_user: Option<String>,
}

impl ActionContext {
    pub fn new(action_id: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            action_id: action_id.into(),
            action_kind: Some(kind),
            ..Self::default()
        }
    }
}

// ============================================================================
// Decisions
// ============================================================================

/// Final result of guardrail evaluation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailResult {
    Allowed,
    AllowedWithReview,
    Denied,
}

/// An applied rule as recorded in the precedence chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedRule {
    pub rule_id: String,
    pub layer: RuleLayer,
    pub action: RuleAction,
    pub priority: i32,
    pub matched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation: Option<String>,
}

/// Append-only decision record gating an action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailDecision {
    pub decision_id: String,
    pub action_id: String,
    pub result: GuardrailResult,
    pub rules_applied: Vec<String>,
    /// Ordered list of every rule consulted, highest layer first.
    pub precedence_chain: Vec<AppliedRule>,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub reason: String,
    pub constitutional_issues: Vec<String>,
    pub policy_issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub supervisor_alert_required: bool,
    pub command_staff_alert_required: bool,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Risk
// ============================================================================

/// Risk bands over the 0-100 composite score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Elevated,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskLevel::Low => "low",
            RiskLevel::Elevated => "elevated",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

/// Per-factor risk assessment, each factor 0-100.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskFactors {
    pub legal_exposure: f64,
    pub civil_rights_impact: f64,
    pub jurisdictional_authority: f64,
    pub operational_consequence: f64,
    pub political_public_risk: f64,
}

// ============================================================================
// Fairness
// ============================================================================

/// Overall fairness verdict for one analysis.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BiasStatus {
    NoBias,
    PossibleBiasReview,
    BiasDetectedBlocked,
}

/// Observed outcome rates for one demographic group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupOutcomes {
    pub positive_rate: f64,
    pub true_positive_rate: f64,
    pub false_positive_rate: f64,
    pub calibration_score: f64,
    pub sample_size: u32,
}

/// One computed fairness metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FairnessMetric {
    pub name: String,
    pub value: f64,
    pub threshold: f64,
    pub passing: bool,
    pub protected_group: String,
    pub reference_group: String,
}

/// Result of one bias analysis over grouped outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiasAnalysis {
    pub analysis_id: String,
    pub status: BiasStatus,
    pub metrics: Vec<FairnessMetric>,
    pub affected_groups: Vec<String>,
    pub recommendations: Vec<String>,
    pub blocked: bool,
    pub requires_review: bool,
    pub explanation: String,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Human-in-the-loop
// ============================================================================

/// Approval request lifecycle; terminal states only from `pending`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalState {
    Pending,
    Approved,
    Denied,
    Escalated,
    Expired,
}

/// Role tiers able to approve gated actions, lowest to highest authority.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalTier {
    Supervisor,
    Commander,
    CommandStaff,
    Chief,
}

/// A pending human approval request for a gated action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub request_id: String,
    pub action_id: String,
    pub decision_id: String,
    pub risk_score: f64,
    pub required_tier: ApprovalTier,
    pub state: ApprovalState,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Ordered record of who acted on the request.
    pub approval_chain: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_order_is_constitutional_first() {
        assert_eq!(RuleLayer::ORDERED[0], RuleLayer::FederalConstitutional);
        assert_eq!(RuleLayer::ORDERED[5], RuleLayer::ModelConstraint);
        assert!(RuleLayer::FederalConstitutional < RuleLayer::AgencySop);
    }

    #[test]
    fn approval_tiers_ordered_by_authority() {
        assert!(ApprovalTier::Chief > ApprovalTier::Supervisor);
    }
}
