//! Fairness metrics over demographic group outcomes
//!
//! Five metrics against an explicit reference group:
//! - disparate impact ratio (worst group rate / reference rate, pass >= 0.8)
//! - demographic parity (max absolute rate difference, pass <= 0.1)
//! - equal opportunity difference (TPR parity, pass <= 0.1)
//! - predictive equality (FPR parity, pass <= 0.1)
//! - calibration fairness (calibration difference, pass <= 0.1)
//!
//! Overall: 0 failing -> no_bias; 1-2 -> possible_bias_review;
//! >= 3 -> bias_detected_blocked. A blocked status prevents the gated
//! action from proceeding and requires civil-rights officer review.

use chrono::Utc;
use std::collections::BTreeMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::GuardrailConfig;
use crate::types::{BiasAnalysis, BiasStatus, FairnessMetric, GroupOutcomes};

/// Bias analyzer with configured thresholds and analysis history.
pub struct BiasAnalyzer {
    disparate_impact_threshold: f64,
    demographic_parity_threshold: f64,
    equal_opportunity_threshold: f64,
    predictive_equality_threshold: f64,
    calibration_threshold: f64,
    history: Vec<BiasAnalysis>,
}

impl BiasAnalyzer {
    pub fn from_config(cfg: &GuardrailConfig) -> Self {
        Self {
            disparate_impact_threshold: cfg.disparate_impact_threshold,
            demographic_parity_threshold: cfg.demographic_parity_threshold,
            equal_opportunity_threshold: cfg.equal_opportunity_threshold,
            predictive_equality_threshold: cfg.predictive_equality_threshold,
            calibration_threshold: cfg.calibration_threshold,
            history: Vec::new(),
        }
    }

    /// Analyze grouped outcomes against the reference group.
    pub fn analyze(
        &mut self,
        outcomes: &BTreeMap<String, GroupOutcomes>,
        reference_group: &str,
    ) -> BiasAnalysis {
        let mut metrics = Vec::new();
        let mut affected = Vec::new();

        metrics.push(self.disparate_impact(outcomes, reference_group));
        metrics.push(self.worst_difference(
            outcomes,
            reference_group,
            "Demographic Parity",
            self.demographic_parity_threshold,
            |g| g.positive_rate,
        ));
        metrics.push(self.worst_difference(
            outcomes,
            reference_group,
            "Equal Opportunity Difference",
            self.equal_opportunity_threshold,
            |g| g.true_positive_rate,
        ));
        metrics.push(self.worst_difference(
            outcomes,
            reference_group,
            "Predictive Equality",
            self.predictive_equality_threshold,
            |g| g.false_positive_rate,
        ));
        metrics.push(self.worst_difference(
            outcomes,
            reference_group,
            "Calibration Fairness",
            self.calibration_threshold,
            |g| g.calibration_score,
        ));

        for m in &metrics {
            if !m.passing && !affected.contains(&m.protected_group) {
                affected.push(m.protected_group.clone());
            }
        }

        let failing = metrics.iter().filter(|m| !m.passing).count();
        let (status, blocked, requires_review) = match failing {
            0 => (BiasStatus::NoBias, false, false),
            1 | 2 => (BiasStatus::PossibleBiasReview, false, true),
            _ => (BiasStatus::BiasDetectedBlocked, true, true),
        };

        let recommendations = Self::recommendations(status, &metrics);
        let explanation = Self::explanation(status, &metrics, &affected);

        let analysis = BiasAnalysis {
            analysis_id: format!("bias-{}", Uuid::new_v4().simple()),
            status,
            metrics,
            affected_groups: affected,
            recommendations,
            blocked,
            requires_review,
            explanation,
            timestamp: Utc::now(),
        };

        if blocked {
            warn!(
                analysis_id = %analysis.analysis_id,
                failing,
                groups = ?analysis.affected_groups,
                "BIAS DETECTED - gated action blocked"
            );
        } else {
            info!(
                analysis_id = %analysis.analysis_id,
                status = ?analysis.status,
                failing,
                "Bias analysis complete"
            );
        }

        self.history.push(analysis.clone());
        analysis
    }

    /// Worst `group_positive_rate / ref_positive_rate`; pass >= threshold.
    fn disparate_impact(
        &self,
        outcomes: &BTreeMap<String, GroupOutcomes>,
        reference_group: &str,
    ) -> FairnessMetric {
        let ref_rate = outcomes
            .get(reference_group)
            .map_or(0.5, |g| g.positive_rate);

        let mut worst_ratio = 1.0;
        let mut worst_group = reference_group.to_string();
        for (group, data) in outcomes {
            if group == reference_group || ref_rate <= 0.0 {
                continue;
            }
            let ratio = data.positive_rate / ref_rate;
            if ratio < worst_ratio {
                worst_ratio = ratio;
                worst_group = group.clone();
            }
        }

        FairnessMetric {
            name: "Disparate Impact Ratio".into(),
            value: worst_ratio,
            threshold: self.disparate_impact_threshold,
            passing: worst_ratio >= self.disparate_impact_threshold,
            protected_group: worst_group,
            reference_group: reference_group.to_string(),
        }
    }

    /// Max absolute difference of `field` vs the reference; pass <= threshold.
    fn worst_difference(
        &self,
        outcomes: &BTreeMap<String, GroupOutcomes>,
        reference_group: &str,
        name: &str,
        threshold: f64,
        field: impl Fn(&GroupOutcomes) -> f64,
    ) -> FairnessMetric {
        let ref_value = outcomes.get(reference_group).map_or(0.5, &field);

        let mut worst_diff = 0.0;
        let mut worst_group = reference_group.to_string();
        for (group, data) in outcomes {
            if group == reference_group {
                continue;
            }
            let diff = (field(data) - ref_value).abs();
            if diff > worst_diff {
                worst_diff = diff;
                worst_group = group.clone();
            }
        }

        FairnessMetric {
            name: name.to_string(),
            value: worst_diff,
            threshold,
            passing: worst_diff <= threshold,
            protected_group: worst_group,
            reference_group: reference_group.to_string(),
        }
    }

    fn recommendations(status: BiasStatus, metrics: &[FairnessMetric]) -> Vec<String> {
        if status == BiasStatus::NoBias {
            return vec![
                "Continue monitoring for bias drift".into(),
                "Schedule quarterly fairness audit".into(),
            ];
        }
        let mut out = Vec::new();
        for m in metrics.iter().filter(|m| !m.passing) {
            out.push(match m.name.as_str() {
                "Disparate Impact Ratio" => format!(
                    "Review model for disparate impact on {}; consider retraining with a balanced dataset",
                    m.protected_group
                ),
                "Demographic Parity" => format!(
                    "Investigate outcome rate differences for {}",
                    m.protected_group
                ),
                "Equal Opportunity Difference" => format!(
                    "Review true positive rate disparities for {}",
                    m.protected_group
                ),
                "Predictive Equality" => format!(
                    "Address false positive rate imbalance for {}",
                    m.protected_group
                ),
                _ => format!("Recalibrate model predictions for {}", m.protected_group),
            });
        }
        if status == BiasStatus::BiasDetectedBlocked {
            out.push("IMMEDIATE: Suspend automated decisions pending review".into());
            out.push("Escalate to Civil Rights Compliance Officer".into());
        }
        out
    }

    fn explanation(status: BiasStatus, metrics: &[FairnessMetric], affected: &[String]) -> String {
        let failing: Vec<&str> = metrics
            .iter()
            .filter(|m| !m.passing)
            .map(|m| m.name.as_str())
            .collect();
        match status {
            BiasStatus::NoBias => {
                "All fairness metrics are within acceptable thresholds. No bias detected.".into()
            }
            BiasStatus::PossibleBiasReview => format!(
                "Possible bias detected. {} metric(s) failed: {}. Affected groups: {}. Human review required before proceeding.",
                failing.len(),
                failing.join(", "),
                affected.join(", ")
            ),
            BiasStatus::BiasDetectedBlocked => format!(
                "BIAS DETECTED - ACTION BLOCKED. {} metric(s) failed: {}. Affected groups: {}. This action is blocked pending civil rights review.",
                failing.len(),
                failing.join(", "),
                affected.join(", ")
            ),
        }
    }

    pub fn history(&self, limit: usize) -> Vec<&BiasAnalysis> {
        self.history.iter().rev().take(limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> BiasAnalyzer {
        BiasAnalyzer::from_config(&GuardrailConfig::default())
    }

    fn group(pos: f64, tpr: f64, fpr: f64, cal: f64) -> GroupOutcomes {
        GroupOutcomes {
            positive_rate: pos,
            true_positive_rate: tpr,
            false_positive_rate: fpr,
            calibration_score: cal,
            sample_size: 200,
        }
    }

    #[test]
    fn balanced_outcomes_show_no_bias() {
        let mut analyzer = analyzer();
        let mut outcomes = BTreeMap::new();
        outcomes.insert("Ref".to_string(), group(0.5, 0.8, 0.1, 0.9));
        outcomes.insert("GroupA".to_string(), group(0.48, 0.79, 0.11, 0.88));
        let result = analyzer.analyze(&outcomes, "Ref");
        assert_eq!(result.status, BiasStatus::NoBias);
        assert!(!result.blocked);
        assert_eq!(result.metrics.len(), 5);
    }

    #[test]
    fn five_failing_metrics_block_the_action() {
        let mut analyzer = analyzer();
        let mut outcomes = BTreeMap::new();
        outcomes.insert("Ref".to_string(), group(0.5, 0.8, 0.05, 0.9));
        outcomes.insert("Protected".to_string(), group(0.3, 0.6, 0.2, 0.7));
        let result = analyzer.analyze(&outcomes, "Ref");

        let by_name: BTreeMap<&str, &FairnessMetric> = result
            .metrics
            .iter()
            .map(|m| (m.name.as_str(), m))
            .collect();
        let dir = by_name["Disparate Impact Ratio"];
        assert!((dir.value - 0.6).abs() < 1e-9);
        assert!(!dir.passing);
        let dp = by_name["Demographic Parity"];
        assert!((dp.value - 0.2).abs() < 1e-9);
        assert!(!dp.passing);
        let eod = by_name["Equal Opportunity Difference"];
        assert!((eod.value - 0.2).abs() < 1e-9);
        assert!(!eod.passing);
        let pe = by_name["Predictive Equality"];
        assert!((pe.value - 0.15).abs() < 1e-9);
        assert!(!pe.passing);
        let cf = by_name["Calibration Fairness"];
        assert!((cf.value - 0.2).abs() < 1e-9);
        assert!(!cf.passing);

        assert_eq!(result.status, BiasStatus::BiasDetectedBlocked);
        assert!(result.blocked);
        assert!(result.requires_review);
        assert_eq!(result.affected_groups, vec!["Protected".to_string()]);
    }

    #[test]
    fn one_failing_metric_flags_review() {
        let mut analyzer = analyzer();
        let mut outcomes = BTreeMap::new();
        outcomes.insert("Ref".to_string(), group(0.5, 0.8, 0.1, 0.9));
        // Only demographic parity + disparate impact borderline: make a
        // single failure via calibration.
        outcomes.insert("GroupA".to_string(), group(0.48, 0.79, 0.1, 0.7));
        let result = analyzer.analyze(&outcomes, "Ref");
        assert_eq!(result.status, BiasStatus::PossibleBiasReview);
        assert!(!result.blocked);
        assert!(result.requires_review);
    }

    #[test]
    fn disparate_impact_boundary_is_inclusive() {
        let mut analyzer = analyzer();
        let mut outcomes = BTreeMap::new();
        outcomes.insert("Ref".to_string(), group(0.5, 0.8, 0.1, 0.9));
        outcomes.insert("GroupA".to_string(), group(0.4, 0.8, 0.1, 0.9));
        let result = analyzer.analyze(&outcomes, "Ref");
        let dir = result
            .metrics
            .iter()
            .find(|m| m.name == "Disparate Impact Ratio")
            .unwrap();
        // 0.4 / 0.5 = 0.8 passes exactly at the threshold.
        assert!(dir.passing);
    }
}
