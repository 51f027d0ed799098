//! Risk scoring - five weighted factors on a 0-100 scale
//!
//! Factors: legal exposure, civil-rights impact, jurisdictional authority,
//! operational consequence, political/public risk. Weights come from
//! configuration and are normalized at evaluation time. Band boundaries:
//! low <= 25 < elevated <= 50 < high <= 75 < critical.

use crate::config::RiskWeights;
use crate::types::{ActionContext, ActionKind, RiskFactors, RiskLevel};

/// Composite risk assessment for one action.
#[derive(Debug, Clone)]
pub struct RiskAssessment {
    pub factors: RiskFactors,
    pub score: f64,
    pub level: RiskLevel,
}

/// Weighted risk scorer.
pub struct RiskScorer {
    weights: RiskWeights,
}

impl RiskScorer {
    pub fn new(weights: RiskWeights) -> Self {
        Self { weights }
    }

    /// Derive per-factor scores from the action context, then combine.
    pub fn assess(&self, ctx: &ActionContext) -> RiskAssessment {
        let factors = Self::derive_factors(ctx);
        let score = self.combine(&factors);
        RiskAssessment {
            factors,
            score,
            level: Self::band(score),
        }
    }

    /// Combine externally-supplied factor scores.
    pub fn assess_factors(&self, factors: RiskFactors) -> RiskAssessment {
        let score = self.combine(&factors);
        RiskAssessment {
            factors,
            score,
            level: Self::band(score),
        }
    }

    fn combine(&self, f: &RiskFactors) -> f64 {
        let w = &self.weights;
        let total_weight = w.legal_exposure
            + w.civil_rights_impact
            + w.jurisdictional_authority
            + w.operational_consequence
            + w.political_public_risk;
        if total_weight <= 0.0 {
            return 0.0;
        }
        let weighted = f.legal_exposure * w.legal_exposure
            + f.civil_rights_impact * w.civil_rights_impact
            + f.jurisdictional_authority * w.jurisdictional_authority
            + f.operational_consequence * w.operational_consequence
            + f.political_public_risk * w.political_public_risk;
        (weighted / total_weight).clamp(0.0, 100.0)
    }

    /// Band boundaries: low <= 25 < elevated <= 50 < high <= 75 < critical.
    pub fn band(score: f64) -> RiskLevel {
        if score > 75.0 {
            RiskLevel::Critical
        } else if score > 50.0 {
            RiskLevel::High
        } else if score > 25.0 {
            RiskLevel::Elevated
        } else {
            RiskLevel::Low
        }
    }

    fn derive_factors(ctx: &ActionContext) -> RiskFactors {
        let mut f = RiskFactors::default();

        // Legal exposure tracks missing legal basis and custodial gaps.
        if !ctx.probable_cause && !ctx.warrant_obtained && !ctx.consent_given {
            f.legal_exposure += 45.0;
        }
        if ctx.action_kind == Some(ActionKind::Detention) && !ctx.miranda_given {
            f.legal_exposure += 35.0;
        }

        // Civil-rights impact scales with intrusiveness.
        f.civil_rights_impact += match ctx.action_kind {
            Some(ActionKind::UseOfForce) => 60.0,
            Some(ActionKind::Detention) => 50.0,
            Some(ActionKind::Search) | Some(ActionKind::Surveillance) => 40.0,
            Some(ActionKind::EnforcementRecommendation) => 30.0,
            Some(ActionKind::Pursuit) => 25.0,
            Some(ActionKind::DroneSortie) | Some(ActionKind::DataQuery) => 15.0,
            None => 10.0,
        };
        if !ctx.subject_demographics.is_empty() {
            f.civil_rights_impact += 15.0;
        }
        if let Some(force) = ctx.force_level {
            f.civil_rights_impact += f64::from(force) * 8.0;
        }

        // Jurisdictional authority: prior contacts suggest an established
        // case footing; a cold subject raises the question.
        f.jurisdictional_authority = match ctx.prior_contacts {
            Some(0) | None => 40.0,
            Some(1..=2) => 25.0,
            Some(_) => 10.0,
        };

        // Operational consequence tracks pursuit speed and duration.
        if let Some(speed) = ctx.pursuit_speed_mph {
            f.operational_consequence += (speed / 2.0).min(70.0);
        }
        if let Some(hours) = ctx.duration_hours {
            f.operational_consequence += (hours / 2.0).min(30.0);
        }

        // Political/public exposure follows the visible action kinds.
        f.political_public_risk = match ctx.action_kind {
            Some(ActionKind::UseOfForce) | Some(ActionKind::Pursuit) => 50.0,
            Some(ActionKind::Surveillance) | Some(ActionKind::DroneSortie) => 35.0,
            _ => 15.0,
        };

        f.legal_exposure = f.legal_exposure.clamp(0.0, 100.0);
        f.civil_rights_impact = f.civil_rights_impact.clamp(0.0, 100.0);
        f.jurisdictional_authority = f.jurisdictional_authority.clamp(0.0, 100.0);
        f.operational_consequence = f.operational_consequence.clamp(0.0, 100.0);
        f.political_public_risk = f.political_public_risk.clamp(0.0, 100.0);
        f
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bands_have_exclusive_boundaries() {
        assert_eq!(RiskScorer::band(25.0), RiskLevel::Low);
        assert_eq!(RiskScorer::band(25.1), RiskLevel::Elevated);
        assert_eq!(RiskScorer::band(50.0), RiskLevel::Elevated);
        assert_eq!(RiskScorer::band(75.0), RiskLevel::High);
        assert_eq!(RiskScorer::band(75.1), RiskLevel::Critical);
    }

    #[test]
    fn warrantless_force_scores_high() {
        let scorer = RiskScorer::new(RiskWeights::default());
        let mut ctx = ActionContext::new("a1", ActionKind::UseOfForce);
        ctx.force_level = Some(4);
        let assessment = scorer.assess(&ctx);
        assert!(assessment.score > 40.0, "got {}", assessment.score);
        assert!(assessment.factors.civil_rights_impact > 80.0);
    }

    #[test]
    fn routine_query_scores_low() {
        let scorer = RiskScorer::new(RiskWeights::default());
        let mut ctx = ActionContext::new("a1", ActionKind::DataQuery);
        ctx.probable_cause = true;
        ctx.prior_contacts = Some(5);
        let assessment = scorer.assess(&ctx);
        assert_eq!(assessment.level, RiskLevel::Low);
    }

    #[test]
    fn zero_weights_do_not_divide_by_zero() {
        let scorer = RiskScorer::new(RiskWeights {
            legal_exposure: 0.0,
            civil_rights_impact: 0.0,
            jurisdictional_authority: 0.0,
            operational_consequence: 0.0,
            political_public_risk: 0.0,
        });
        let ctx = ActionContext::new("a1", ActionKind::Search);
        assert!((scorer.assess(&ctx).score).abs() < f64::EPSILON);
    }
}
