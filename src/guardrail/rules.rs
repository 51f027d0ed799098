//! Layered guardrail rules with strict precedence
//!
//! Rules belong to layers (federal constitutional -> federal statute ->
//! state statute -> local ordinance -> agency SOP -> model constraint).
//! For each action the engine collects applicable rules across all
//! layers; the first layer containing a non-neutral decision wins. Ties
//! within a layer break by higher priority. The full ordered list of
//! consulted rules becomes the decision's precedence chain.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::types::{
    ActionContext, ActionKind, AppliedRule, GuardrailDecision, GuardrailResult, RiskLevel,
    RuleAction, RuleLayer,
};

/// Predicate a rule evaluates against the action context.
///
/// Conditions are data, not code, so rule sets can be loaded from
/// configuration and audited.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleCondition {
    /// Matches a specific action kind.
    ActionIs { action: ActionKind },
    /// Matches any listed action kind.
    ActionIn { actions: Vec<ActionKind> },
    /// Search/surveillance without probable cause, a warrant, or consent.
    LacksLegalBasis,
    /// Custodial questioning without Miranda.
    MirandaNotGiven,
    /// Force level at or above a bound.
    ForceLevelAtLeast { level: u8 },
    /// Pursuit speed above a bound (mph).
    PursuitSpeedOver { mph: f64 },
    /// Action duration above a bound (hours).
    DurationOver { hours: f64 },
    /// Demographics were supplied for the subject.
    DemographicsPresent,
    /// Always matches; used for layer-wide defaults.
    Always,
}

impl RuleCondition {
    pub fn matches(&self, ctx: &ActionContext) -> bool {
        match self {
            RuleCondition::ActionIs { action } => ctx.action_kind == Some(*action),
            RuleCondition::ActionIn { actions } => {
                ctx.action_kind.is_some_and(|k| actions.contains(&k))
            }
            RuleCondition::LacksLegalBasis => {
                matches!(
                    ctx.action_kind,
                    Some(ActionKind::Search) | Some(ActionKind::Surveillance)
                ) && !ctx.probable_cause
                    && !ctx.warrant_obtained
                    && !ctx.consent_given
            }
            RuleCondition::MirandaNotGiven => {
                ctx.action_kind == Some(ActionKind::Detention) && !ctx.miranda_given
            }
            RuleCondition::ForceLevelAtLeast { level } => {
                ctx.force_level.is_some_and(|f| f >= *level)
            }
            RuleCondition::PursuitSpeedOver { mph } => {
                ctx.pursuit_speed_mph.is_some_and(|s| s > *mph)
            }
            RuleCondition::DurationOver { hours } => {
                ctx.duration_hours.is_some_and(|d| d > *hours)
            }
            RuleCondition::DemographicsPresent => !ctx.subject_demographics.is_empty(),
            RuleCondition::Always => true,
        }
    }
}

/// One guardrail rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailRule {
    pub rule_id: String,
    pub layer: RuleLayer,
    pub condition: RuleCondition,
    pub action: RuleAction,
    pub category: String,
    pub priority: i32,
    #[serde(default)]
    pub citation: Option<String>,
    pub active: bool,
    /// Reason surfaced when the rule decides against the action.
    pub message: String,
}

/// Default rule set covering the constitutional and policy floor.
pub fn default_rules() -> Vec<GuardrailRule> {
    vec![
        GuardrailRule {
            rule_id: "const-4th-search".into(),
            layer: RuleLayer::FederalConstitutional,
            condition: RuleCondition::LacksLegalBasis,
            action: RuleAction::Deny,
            category: "fourth_amendment".into(),
            priority: 100,
            citation: Some("U.S. Const. amend. IV".into()),
            active: true,
            message: "Search or surveillance without probable cause, warrant, or consent".into(),
        },
        GuardrailRule {
            rule_id: "const-5th-miranda".into(),
            layer: RuleLayer::FederalConstitutional,
            condition: RuleCondition::MirandaNotGiven,
            action: RuleAction::Deny,
            category: "fifth_amendment".into(),
            priority: 90,
            citation: Some("Miranda v. Arizona, 384 U.S. 436".into()),
            active: true,
            message: "Custodial action without Miranda advisement".into(),
        },
        GuardrailRule {
            rule_id: "state-pursuit-speed".into(),
            layer: RuleLayer::StateStatute,
            condition: RuleCondition::PursuitSpeedOver { mph: 100.0 },
            action: RuleAction::RequireApproval,
            category: "pursuit_policy".into(),
            priority: 50,
            citation: Some("Fla. Stat. § 316.072".into()),
            active: true,
            message: "Pursuit speed exceeds statutory review threshold".into(),
        },
        GuardrailRule {
            rule_id: "sop-force-review".into(),
            layer: RuleLayer::AgencySop,
            condition: RuleCondition::ForceLevelAtLeast { level: 3 },
            action: RuleAction::RequireApproval,
            category: "use_of_force".into(),
            priority: 60,
            citation: Some("Agency SOP 4.2".into()),
            active: true,
            message: "Force at or above level 3 requires supervisor review".into(),
        },
        GuardrailRule {
            rule_id: "sop-surveillance-duration".into(),
            layer: RuleLayer::AgencySop,
            condition: RuleCondition::DurationOver { hours: 72.0 },
            action: RuleAction::RequireApproval,
            category: "surveillance_policy".into(),
            priority: 40,
            citation: Some("Agency SOP 7.1".into()),
            active: true,
            message: "Sustained surveillance beyond 72 hours requires command review".into(),
        },
        GuardrailRule {
            rule_id: "model-demographic-guard".into(),
            layer: RuleLayer::ModelConstraint,
            condition: RuleCondition::DemographicsPresent,
            action: RuleAction::RequireApproval,
            category: "model_fairness".into(),
            priority: 30,
            citation: None,
            active: true,
            message: "Model output keyed on subject demographics requires human review".into(),
        },
        GuardrailRule {
            rule_id: "sop-drone-allow".into(),
            layer: RuleLayer::AgencySop,
            condition: RuleCondition::ActionIs {
                action: ActionKind::DroneSortie,
            },
            action: RuleAction::Allow,
            category: "drone_operations".into(),
            priority: 10,
            citation: Some("Agency SOP 9.3".into()),
            active: true,
            message: "Drone sortie within standing operating procedure".into(),
        },
    ]
}

/// Layered rule engine producing `GuardrailDecision`s.
pub struct RuleEngine {
    rules: Vec<GuardrailRule>,
}

impl RuleEngine {
    pub fn new(rules: Vec<GuardrailRule>) -> Self {
        Self { rules }
    }

    pub fn with_defaults() -> Self {
        Self::new(default_rules())
    }

    pub fn add_rule(&mut self, rule: GuardrailRule) {
        self.rules.retain(|r| r.rule_id != rule.rule_id);
        self.rules.push(rule);
    }

    /// Evaluate the layered chain for an action.
    ///
    /// Risk scoring and approval wiring happen in the pipeline; this
    /// returns the rule-only decision with its precedence chain.
    pub fn evaluate(&self, ctx: &ActionContext) -> GuardrailDecision {
        let mut chain: Vec<AppliedRule> = Vec::new();
        let mut outcome: Option<(&GuardrailRule, RuleAction)> = None;
        let mut constitutional_issues = Vec::new();
        let mut policy_issues = Vec::new();

        for layer in RuleLayer::ORDERED {
            // Collect this layer's applicable rules, highest priority first.
            let mut layer_rules: Vec<&GuardrailRule> = self
                .rules
                .iter()
                .filter(|r| r.active && r.layer == layer)
                .collect();
            layer_rules.sort_by_key(|r| std::cmp::Reverse(r.priority));

            let mut layer_decision: Option<(&GuardrailRule, RuleAction)> = None;
            for rule in layer_rules {
                let matched = rule.condition.matches(ctx);
                chain.push(AppliedRule {
                    rule_id: rule.rule_id.clone(),
                    layer: rule.layer,
                    action: rule.action,
                    priority: rule.priority,
                    matched,
                    citation: rule.citation.clone(),
                });
                if matched {
                    if matches!(rule.action, RuleAction::Deny | RuleAction::RequireApproval) {
                        match rule.layer {
                            RuleLayer::FederalConstitutional => {
                                constitutional_issues.push(rule.message.clone());
                            }
                            _ => policy_issues.push(rule.message.clone()),
                        }
                    }
                    // Highest-priority match in the layer wins the layer.
                    if layer_decision.is_none() {
                        layer_decision = Some((rule, rule.action));
                    }
                }
            }

            if outcome.is_none() {
                if let Some(decision) = layer_decision {
                    debug!(
                        layer = %layer,
                        rule_id = %decision.0.rule_id,
                        action = ?decision.1,
                        "Layer produced the binding decision"
                    );
                    outcome = Some(decision);
                }
            }
        }

        let (result, reason, rules_applied) = match outcome {
            Some((rule, RuleAction::Deny)) => (
                GuardrailResult::Denied,
                format!("Denied by {} ({}): {}", rule.rule_id, rule.layer, rule.message),
                vec![rule.rule_id.clone()],
            ),
            Some((rule, RuleAction::RequireApproval)) => (
                GuardrailResult::AllowedWithReview,
                format!(
                    "Requires approval per {} ({}): {}",
                    rule.rule_id, rule.layer, rule.message
                ),
                vec![rule.rule_id.clone()],
            ),
            Some((rule, RuleAction::Allow)) => (
                GuardrailResult::Allowed,
                format!("Allowed by {} ({})", rule.rule_id, rule.layer),
                vec![rule.rule_id.clone()],
            ),
            None => (
                GuardrailResult::Allowed,
                "No rule matched; default allow with audit".to_string(),
                Vec::new(),
            ),
        };

        let decision = GuardrailDecision {
            decision_id: format!("grd-{}", Uuid::new_v4().simple()),
            action_id: ctx.action_id.clone(),
            result,
            rules_applied,
            precedence_chain: chain,
            risk_score: 0.0,
            risk_level: RiskLevel::Low,
            reason,
            constitutional_issues,
            policy_issues,
            recommendations: Vec::new(),
            supervisor_alert_required: false,
            command_staff_alert_required: false,
            timestamp: chrono::Utc::now(),
        };

        info!(
            decision_id = %decision.decision_id,
            action_id = %decision.action_id,
            result = ?decision.result,
            consulted = decision.precedence_chain.len(),
            "Guardrail rule evaluation"
        );
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warrantless_search_denied_by_constitutional_layer() {
        let engine = RuleEngine::with_defaults();
        let ctx = ActionContext::new("a1", ActionKind::Search);
        let decision = engine.evaluate(&ctx);
        assert_eq!(decision.result, GuardrailResult::Denied);
        assert_eq!(decision.rules_applied, vec!["const-4th-search".to_string()]);
        assert!(!decision.constitutional_issues.is_empty());
    }

    #[test]
    fn search_with_probable_cause_passes_constitutional_layer() {
        let engine = RuleEngine::with_defaults();
        let mut ctx = ActionContext::new("a1", ActionKind::Search);
        ctx.probable_cause = true;
        let decision = engine.evaluate(&ctx);
        assert_ne!(decision.result, GuardrailResult::Denied);
    }

    #[test]
    fn higher_layer_wins_over_lower() {
        let engine = RuleEngine::with_defaults();
        // Warrantless surveillance that would also hit the SOP duration
        // rule: the constitutional denial binds, the SOP rule still
        // appears in the chain.
        let mut ctx = ActionContext::new("a1", ActionKind::Surveillance);
        ctx.duration_hours = Some(100.0);
        let decision = engine.evaluate(&ctx);
        assert_eq!(decision.result, GuardrailResult::Denied);
        assert!(decision
            .precedence_chain
            .iter()
            .any(|r| r.rule_id == "sop-surveillance-duration" && r.matched));
    }

    #[test]
    fn precedence_chain_is_layer_ordered() {
        let engine = RuleEngine::with_defaults();
        let ctx = ActionContext::new("a1", ActionKind::Search);
        let chain = engine.evaluate(&ctx).precedence_chain;
        for pair in chain.windows(2) {
            assert!(pair[0].layer <= pair[1].layer);
        }
    }

    #[test]
    fn intra_layer_ties_break_by_priority() {
        let mut engine = RuleEngine::new(vec![
            GuardrailRule {
                rule_id: "sop-low".into(),
                layer: RuleLayer::AgencySop,
                condition: RuleCondition::Always,
                action: RuleAction::Allow,
                category: "test".into(),
                priority: 10,
                citation: None,
                active: true,
                message: "low".into(),
            },
            GuardrailRule {
                rule_id: "sop-high".into(),
                layer: RuleLayer::AgencySop,
                condition: RuleCondition::Always,
                action: RuleAction::Deny,
                category: "test".into(),
                priority: 99,
                citation: None,
                active: true,
                message: "high".into(),
            },
        ]);
        let ctx = ActionContext::new("a1", ActionKind::DataQuery);
        let decision = engine.evaluate(&ctx);
        assert_eq!(decision.result, GuardrailResult::Denied);
        assert_eq!(decision.rules_applied, vec!["sop-high".to_string()]);

        // Deactivating the high-priority rule flips the layer outcome.
        engine.add_rule(GuardrailRule {
            rule_id: "sop-high".into(),
            layer: RuleLayer::AgencySop,
            condition: RuleCondition::Always,
            action: RuleAction::Deny,
            category: "test".into(),
            priority: 99,
            citation: None,
            active: false,
            message: "high".into(),
        });
        let decision = engine.evaluate(&ctx);
        assert_eq!(decision.result, GuardrailResult::Allowed);
    }

    #[test]
    fn force_review_required_at_level_three() {
        let engine = RuleEngine::with_defaults();
        let mut ctx = ActionContext::new("a1", ActionKind::UseOfForce);
        ctx.force_level = Some(3);
        let decision = engine.evaluate(&ctx);
        assert_eq!(decision.result, GuardrailResult::AllowedWithReview);
    }

    #[test]
    fn unmatched_context_defaults_to_allow() {
        let engine = RuleEngine::with_defaults();
        let ctx = ActionContext::new("a1", ActionKind::DataQuery);
        let decision = engine.evaluate(&ctx);
        assert_eq!(decision.result, GuardrailResult::Allowed);
        assert!(decision.rules_applied.is_empty());
    }
}
