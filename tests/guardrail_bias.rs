//! Guardrail pipeline: bias blocking, layered denial, approval flow.

use std::collections::BTreeMap;

use chrono::Utc;
use rtcc_core::config::GuardrailConfig;
use rtcc_core::guardrail::{Approver, GuardrailPipeline};
use rtcc_core::types::{
    ActionContext, ActionKind, ApprovalState, ApprovalTier, BiasStatus, GroupOutcomes,
    GuardrailResult,
};

fn group(pos: f64, tpr: f64, fpr: f64, cal: f64) -> GroupOutcomes {
    GroupOutcomes {
        positive_rate: pos,
        true_positive_rate: tpr,
        false_positive_rate: fpr,
        calibration_score: cal,
        sample_size: 250,
    }
}

#[test]
fn skewed_outcomes_block_with_all_five_metrics_failing() {
    let mut pipeline = GuardrailPipeline::new(GuardrailConfig::default());

    let mut outcomes = BTreeMap::new();
    outcomes.insert("Ref".to_string(), group(0.5, 0.8, 0.05, 0.9));
    outcomes.insert("Protected".to_string(), group(0.3, 0.6, 0.2, 0.7));

    let analysis = pipeline.analyze_bias(&outcomes, "Ref");

    assert_eq!(analysis.status, BiasStatus::BiasDetectedBlocked);
    assert!(analysis.blocked);
    assert!(analysis.requires_review);
    assert_eq!(analysis.metrics.iter().filter(|m| !m.passing).count(), 5);

    // Expected metric values from the outcome table.
    let value_of = |name: &str| {
        analysis
            .metrics
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.value)
            .unwrap()
    };
    assert!((value_of("Disparate Impact Ratio") - 0.6).abs() < 1e-9);
    assert!((value_of("Demographic Parity") - 0.2).abs() < 1e-9);
    assert!((value_of("Equal Opportunity Difference") - 0.2).abs() < 1e-9);
    assert!((value_of("Predictive Equality") - 0.15).abs() < 1e-9);
    assert!((value_of("Calibration Fairness") - 0.2).abs() < 1e-9);

    assert!(analysis
        .recommendations
        .iter()
        .any(|r| r.contains("Civil Rights")));
}

#[test]
fn constitutional_denial_beats_lower_layers() {
    let mut pipeline = GuardrailPipeline::new(GuardrailConfig::default());
    let ctx = ActionContext::new("act-search", ActionKind::Search);
    let (decision, approval) = pipeline.evaluate(&ctx);

    assert_eq!(decision.result, GuardrailResult::Denied);
    assert!(decision.reason.contains("federal_constitutional"));
    assert!(!decision.constitutional_issues.is_empty());
    assert!(approval.is_none());

    // Precedence chain runs highest layer first.
    let layers: Vec<_> = decision.precedence_chain.iter().map(|r| r.layer).collect();
    let mut sorted = layers.clone();
    sorted.sort();
    assert_eq!(layers, sorted);
}

#[test]
fn review_flow_resolves_through_approval_queue() {
    let mut pipeline = GuardrailPipeline::new(GuardrailConfig::default());
    let mut ctx = ActionContext::new("act-force", ActionKind::UseOfForce);
    ctx.probable_cause = true;
    ctx.force_level = Some(3);

    let (decision, approval) = pipeline.evaluate(&ctx);
    assert_eq!(decision.result, GuardrailResult::AllowedWithReview);
    let approval = approval.unwrap();
    assert_eq!(approval.action_id, "act-force");
    assert_eq!(approval.state, ApprovalState::Pending);

    let approver = Approver {
        user_id: "sup-9".into(),
        tier: ApprovalTier::CommandStaff,
        mfa_verified_at: Some(Utc::now()),
    };
    let decided = pipeline
        .approvals
        .approve(&approval.request_id, &approver)
        .unwrap();
    assert_eq!(decided.state, ApprovalState::Approved);
    assert_eq!(decided.decided_by.as_deref(), Some("sup-9"));
}

#[test]
fn mfa_is_mandatory_for_approval_when_configured() {
    let mut pipeline = GuardrailPipeline::new(GuardrailConfig::default());
    let mut ctx = ActionContext::new("act-1", ActionKind::UseOfForce);
    ctx.probable_cause = true;
    ctx.force_level = Some(4);
    let (_, approval) = pipeline.evaluate(&ctx);
    let approval = approval.unwrap();

    let no_mfa = Approver {
        user_id: "sup-1".into(),
        tier: ApprovalTier::Chief,
        mfa_verified_at: None,
    };
    assert!(pipeline
        .approvals
        .approve(&approval.request_id, &no_mfa)
        .is_err());
}

#[test]
fn balanced_outcomes_pass_cleanly() {
    let mut pipeline = GuardrailPipeline::new(GuardrailConfig::default());
    let mut outcomes = BTreeMap::new();
    outcomes.insert("Ref".to_string(), group(0.5, 0.8, 0.1, 0.9));
    outcomes.insert("GroupA".to_string(), group(0.47, 0.78, 0.12, 0.87));
    outcomes.insert("GroupB".to_string(), group(0.52, 0.82, 0.09, 0.91));

    let analysis = pipeline.analyze_bias(&outcomes, "Ref");
    assert_eq!(analysis.status, BiasStatus::NoBias);
    assert!(!analysis.blocked);
    assert!(analysis.affected_groups.is_empty());
}
