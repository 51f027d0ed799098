//! Anomaly Detection - rolling per-zone baselines with z-score exceedance
//!
//! A baseline is kept per `(zone, hour-of-week)` cell and updated online
//! with Welford's method, so detection quality does not depend on batch
//! sizes. An observation exceeding `mean + k*sigma` emits an anomaly
//! graded by magnitude. Baselines persist through the baseline store so
//! detection stays well-defined across restarts.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::storage::BaselineStore;
use crate::types::Severity;

/// Minimum samples before a cell participates in detection.
pub const MIN_SAMPLES_FOR_DETECTION: u64 = 12;

/// Floor on sigma to avoid zero-variance cells flagging everything.
const MIN_STD_FLOOR: f64 = 0.5;

/// One `(zone, hour-of-week)` baseline cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineCell {
    pub zone_id: String,
    /// 0..168, Monday 00:00 == 0.
    pub hour_of_week: u16,
    pub count: u64,
    pub mean: f64,
    /// Welford running sum of squared deviations.
    pub m2: f64,
    pub peak: f64,
}

impl BaselineCell {
    fn new(zone_id: &str, hour_of_week: u16) -> Self {
        Self {
            zone_id: zone_id.to_string(),
            hour_of_week,
            count: 0,
            mean: 0.0,
            m2: 0.0,
            peak: 0.0,
        }
    }

    /// Welford online update.
    pub fn update(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
        if value > self.peak {
            self.peak = value;
        }
    }

    pub fn std_dev(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        (self.m2 / (self.count - 1) as f64).sqrt()
    }

    fn effective_std(&self) -> f64 {
        self.std_dev().max(MIN_STD_FLOOR)
    }

    pub fn z_score(&self, value: f64) -> f64 {
        (value - self.mean) / self.effective_std()
    }
}

/// A flagged observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub zone_id: String,
    pub hour_of_week: u16,
    pub observed: f64,
    pub baseline_mean: f64,
    pub baseline_std: f64,
    pub z_score: f64,
    /// Upper-tail probability of the observation under the baseline.
    pub tail_probability: f64,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

/// Hour-of-week index for a timestamp (Monday 00:00 == 0).
pub fn hour_of_week(ts: DateTime<Utc>) -> u16 {
    let dow = ts.weekday().num_days_from_monday() as u16;
    dow * 24 + ts.hour() as u16
}

/// Per-zone anomaly detector over hour-of-week baselines.
pub struct AnomalyDetector {
    sigma: f64,
    cells: HashMap<(String, u16), BaselineCell>,
}

impl AnomalyDetector {
    pub fn new(sigma: f64) -> Self {
        Self {
            sigma,
            cells: HashMap::new(),
        }
    }

    /// Rehydrate baselines from the store at startup.
    pub fn load(sigma: f64, store: &BaselineStore) -> Self {
        let cells: HashMap<(String, u16), BaselineCell> = store
            .load_all()
            .into_iter()
            .map(|c| ((c.zone_id.clone(), c.hour_of_week), c))
            .collect();
        info!(cells = cells.len(), "Anomaly baselines loaded");
        Self { sigma, cells }
    }

    /// Score an observation, then fold it into the baseline.
    ///
    /// Scoring happens before the update so an outlier is compared against
    /// history it is not yet part of.
    pub fn observe(
        &mut self,
        zone_id: &str,
        timestamp: DateTime<Utc>,
        value: f64,
    ) -> Option<AnomalyResult> {
        let how = hour_of_week(timestamp);
        let cell = self
            .cells
            .entry((zone_id.to_string(), how))
            .or_insert_with(|| BaselineCell::new(zone_id, how));

        let result = if cell.count >= MIN_SAMPLES_FOR_DETECTION {
            let z = cell.z_score(value);
            if z >= self.sigma {
                let tail = Normal::new(0.0, 1.0)
                    .map(|n| 1.0 - n.cdf(z))
                    .unwrap_or(0.0);
                Some(AnomalyResult {
                    zone_id: zone_id.to_string(),
                    hour_of_week: how,
                    observed: value,
                    baseline_mean: cell.mean,
                    baseline_std: cell.std_dev(),
                    z_score: z,
                    tail_probability: tail,
                    severity: Self::grade(z, self.sigma),
                    timestamp,
                })
            } else {
                None
            }
        } else {
            debug!(
                zone_id,
                hour_of_week = how,
                samples = cell.count,
                "baseline still learning"
            );
            None
        };

        cell.update(value);
        result
    }

    /// Severity graded by exceedance magnitude over the configured sigma.
    fn grade(z: f64, sigma: f64) -> Severity {
        if z >= sigma * 2.0 {
            Severity::Critical
        } else if z >= sigma * 1.5 {
            Severity::High
        } else {
            Severity::Medium
        }
    }

    /// Batch scoring, preserving input order of flagged results.
    pub fn observe_batch(
        &mut self,
        zone_id: &str,
        observations: &[(DateTime<Utc>, f64)],
    ) -> Vec<AnomalyResult> {
        observations
            .iter()
            .filter_map(|(ts, v)| self.observe(zone_id, *ts, *v))
            .collect()
    }

    pub fn cell(&self, zone_id: &str, hour: u16) -> Option<&BaselineCell> {
        self.cells.get(&(zone_id.to_string(), hour))
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Persist every cell to the baseline store.
    pub fn persist(&self, store: &BaselineStore) -> Result<(), crate::storage::StorageError> {
        for cell in self.cells.values() {
            store.save(cell)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(hour: u32) -> DateTime<Utc> {
        // 2026-06-01 is a Monday.
        Utc.with_ymd_and_hms(2026, 6, 1, hour, 0, 0).single().unwrap()
    }

    #[test]
    fn hour_of_week_monday_midnight_is_zero() {
        assert_eq!(hour_of_week(ts(0)), 0);
        assert_eq!(hour_of_week(ts(23)), 23);
        let tue = Utc.with_ymd_and_hms(2026, 6, 2, 1, 0, 0).single().unwrap();
        assert_eq!(hour_of_week(tue), 25);
    }

    #[test]
    fn welford_matches_batch_statistics() {
        let mut cell = BaselineCell::new("z1", 0);
        let values = [4.0, 7.0, 13.0, 16.0];
        for v in values {
            cell.update(v);
        }
        assert!((cell.mean - 10.0).abs() < 1e-9);
        // Sample std dev of [4,7,13,16] = sqrt(30) ≈ 5.477
        assert!((cell.std_dev() - 30.0_f64.sqrt()).abs() < 1e-9);
        assert!((cell.peak - 16.0).abs() < f64::EPSILON);
    }

    #[test]
    fn no_detection_while_learning() {
        let mut det = AnomalyDetector::new(3.0);
        assert!(det.observe("z1", ts(10), 100.0).is_none());
    }

    #[test]
    fn spike_is_flagged_after_learning() {
        let mut det = AnomalyDetector::new(3.0);
        for i in 0..20 {
            let v = 10.0 + (i % 3) as f64;
            assert!(det.observe("z1", ts(10), v).is_none());
        }
        let result = det.observe("z1", ts(10), 60.0);
        let r = result.expect("spike should flag");
        assert!(r.z_score >= 3.0);
        assert_eq!(r.severity, Severity::Critical);
        assert!(r.tail_probability < 0.01);
    }

    #[test]
    fn separate_hours_have_separate_baselines() {
        let mut det = AnomalyDetector::new(3.0);
        for _ in 0..20 {
            det.observe("z1", ts(10), 10.0);
        }
        // Different hour-of-week cell is still learning, no flag.
        assert!(det.observe("z1", ts(11), 60.0).is_none());
        assert_eq!(det.cell_count(), 2);
    }

    #[test]
    fn baselines_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let store = BaselineStore::open(dir.path().join("baselines")).unwrap();

        let mut det = AnomalyDetector::new(3.0);
        for i in 0..20 {
            det.observe("z1", ts(10), 10.0 + (i % 3) as f64);
        }
        det.persist(&store).unwrap();

        let mut reloaded = AnomalyDetector::load(3.0, &store);
        assert_eq!(reloaded.cell_count(), 1);
        assert!(reloaded.observe("z1", ts(10), 60.0).is_some());
    }
}
