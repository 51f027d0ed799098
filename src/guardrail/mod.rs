//! Guardrail & Risk Pipeline
//!
//! Decides whether a proposed action is allowed, requires human approval,
//! or is blocked, and measures whether AI outputs exceed fairness
//! thresholds against protected groups.

pub mod approval;
pub mod bias;
pub mod risk;
pub mod rules;

pub use approval::{ApprovalError, ApprovalQueue, Approver};
pub use bias::BiasAnalyzer;
pub use risk::{RiskAssessment, RiskScorer};
pub use rules::{default_rules, GuardrailRule, RuleCondition, RuleEngine};

use std::collections::BTreeMap;
use tracing::info;

use crate::config::GuardrailConfig;
use crate::types::{
    ActionContext, ApprovalRequest, BiasAnalysis, GuardrailDecision, GuardrailResult,
    GroupOutcomes,
};

/// The composed pipeline: layered rules, risk scoring, fairness gating
/// and the human-in-the-loop approval queue.
pub struct GuardrailPipeline {
    config: GuardrailConfig,
    pub rules: RuleEngine,
    pub risk: RiskScorer,
    pub bias: BiasAnalyzer,
    pub approvals: ApprovalQueue,
    decisions: Vec<GuardrailDecision>,
}

impl GuardrailPipeline {
    pub fn new(config: GuardrailConfig) -> Self {
        let risk = RiskScorer::new(config.risk_weights.clone());
        let bias = BiasAnalyzer::from_config(&config);
        let approvals = ApprovalQueue::from_config(&config);
        Self {
            config,
            rules: RuleEngine::with_defaults(),
            risk,
            bias,
            approvals,
            decisions: Vec::new(),
        }
    }

    /// Evaluate a proposed action end to end.
    ///
    /// Risk at or above the approval threshold forces review regardless
    /// of rule outcome. Every `allowed_with_review` decision opens an
    /// approval request carrying the same `action_id`.
    pub fn evaluate(&mut self, ctx: &ActionContext) -> (GuardrailDecision, Option<ApprovalRequest>) {
        let mut decision = self.rules.evaluate(ctx);

        let assessment = self.risk.assess(ctx);
        decision.risk_score = assessment.score;
        decision.risk_level = assessment.level;

        if assessment.score >= self.config.approval_threshold
            && decision.result == GuardrailResult::Allowed
        {
            decision.result = GuardrailResult::AllowedWithReview;
            decision.reason = format!(
                "{}; risk score {:.0} at or above approval threshold {:.0}",
                decision.reason, assessment.score, self.config.approval_threshold
            );
        }

        decision.supervisor_alert_required = decision.result != GuardrailResult::Allowed;
        decision.command_staff_alert_required =
            decision.result == GuardrailResult::Denied || assessment.score > 75.0;

        if decision.result != GuardrailResult::Allowed {
            decision
                .recommendations
                .push("Document justification before resubmitting".into());
        }

        let approval = if decision.result == GuardrailResult::AllowedWithReview {
            Some(
                self.approvals
                    .open(&ctx.action_id, &decision.decision_id, decision.risk_score),
            )
        } else {
            None
        };

        info!(
            decision_id = %decision.decision_id,
            action_id = %decision.action_id,
            result = ?decision.result,
            risk = decision.risk_score,
            risk_level = %decision.risk_level,
            "Guardrail decision"
        );

        // Decisions are append-only and referenced by the actions they gate.
        self.decisions.push(decision.clone());
        (decision, approval)
    }

    /// Gate an AI output on fairness; a blocked analysis must stop the
    /// gated action and route to civil-rights review.
    pub fn analyze_bias(
        &mut self,
        outcomes: &BTreeMap<String, GroupOutcomes>,
        reference_group: &str,
    ) -> BiasAnalysis {
        self.bias.analyze(outcomes, reference_group)
    }

    pub fn decisions(&self) -> &[GuardrailDecision] {
        &self.decisions
    }

    pub fn decision_for_action(&self, action_id: &str) -> Option<&GuardrailDecision> {
        self.decisions.iter().rev().find(|d| d.action_id == action_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActionKind;

    #[test]
    fn review_decisions_always_have_matching_approval() {
        let mut pipeline = GuardrailPipeline::new(GuardrailConfig::default());
        let mut ctx = ActionContext::new("act-1", ActionKind::UseOfForce);
        ctx.force_level = Some(3);
        ctx.probable_cause = true;

        let (decision, approval) = pipeline.evaluate(&ctx);
        assert_eq!(decision.result, GuardrailResult::AllowedWithReview);
        let approval = approval.expect("review requires approval request");
        assert_eq!(approval.action_id, "act-1");
        assert!(pipeline.approvals.pending_for_action("act-1").is_some());
    }

    #[test]
    fn high_risk_forces_review_despite_allow() {
        let mut config = GuardrailConfig::default();
        config.approval_threshold = 10.0; // force the override path
        let mut pipeline = GuardrailPipeline::new(config);

        let mut ctx = ActionContext::new("act-2", ActionKind::DroneSortie);
        ctx.probable_cause = true;
        ctx.prior_contacts = Some(4);
        let (decision, approval) = pipeline.evaluate(&ctx);
        assert_eq!(decision.result, GuardrailResult::AllowedWithReview);
        assert!(approval.is_some());
    }

    #[test]
    fn denied_actions_do_not_open_approvals() {
        let mut pipeline = GuardrailPipeline::new(GuardrailConfig::default());
        let ctx = ActionContext::new("act-3", ActionKind::Search);
        let (decision, approval) = pipeline.evaluate(&ctx);
        assert_eq!(decision.result, GuardrailResult::Denied);
        assert!(approval.is_none());
        assert!(decision.supervisor_alert_required);
        assert!(decision.command_staff_alert_required);
    }

    #[test]
    fn decisions_are_append_only_and_queryable() {
        let mut pipeline = GuardrailPipeline::new(GuardrailConfig::default());
        let ctx = ActionContext::new("act-4", ActionKind::DataQuery);
        pipeline.evaluate(&ctx);
        pipeline.evaluate(&ctx);
        assert_eq!(pipeline.decisions().len(), 2);
        assert!(pipeline.decision_for_action("act-4").is_some());
    }
}
