//! Ambush detection
//!
//! An ambush alert is raised when any of:
//! - multiple unrelated calls cluster within the time and distance
//!   windows around the same officer area
//! - sudden silence on a unit known to be active
//! - explicit detector input
//!
//! Acknowledgment is per-officer; the alert closes when all affected
//! officers acknowledge or a supervisor closes it.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::warn;
use uuid::Uuid;

use crate::geo;
use crate::types::{AmbushAlert, GeoPoint, ThreatLevel};

/// A call-for-service observation fed into the clustering window.
#[derive(Debug, Clone)]
struct CallObservation {
    call_id: String,
    location: GeoPoint,
    timestamp: DateTime<Utc>,
}

/// Ambush detector over clustered calls and unit-silence signals.
pub struct AmbushDetector {
    time_window: Duration,
    distance_window_m: f64,
    min_calls: usize,
    recent_calls: Vec<CallObservation>,
    alerts: HashMap<String, AmbushAlert>,
}

impl AmbushDetector {
    pub fn new(time_window_secs: i64, distance_window_m: f64, min_calls: usize) -> Self {
        Self {
            time_window: Duration::seconds(time_window_secs),
            distance_window_m,
            min_calls,
            recent_calls: Vec::new(),
            alerts: HashMap::new(),
        }
    }

    /// Observe an incoming call near officers. Returns an alert when the
    /// clustering criterion fires for the given officer area.
    pub fn observe_call(
        &mut self,
        call_id: &str,
        location: GeoPoint,
        timestamp: DateTime<Utc>,
        nearby_officers: &[String],
    ) -> Option<AmbushAlert> {
        self.recent_calls.retain(|c| timestamp - c.timestamp <= self.time_window);
        self.recent_calls.push(CallObservation {
            call_id: call_id.to_string(),
            location,
            timestamp,
        });

        let clustered: Vec<&CallObservation> = self
            .recent_calls
            .iter()
            .filter(|c| geo::distance_m(c.location, location) <= self.distance_window_m)
            .collect();

        if clustered.len() < self.min_calls || nearby_officers.is_empty() {
            return None;
        }

        let indicators: Vec<String> = clustered
            .iter()
            .map(|c| format!("call {} at ({:.4}, {:.4})", c.call_id, c.location.lat, c.location.lon))
            .collect();

        Some(self.raise(
            location,
            format!("{} unrelated calls clustered in the area", clustered.len()),
            indicators,
            nearby_officers.to_vec(),
        ))
    }

    /// A unit known to be active went silent.
    pub fn observe_unit_silence(
        &mut self,
        officer_id: &str,
        last_known: GeoPoint,
        silent_for_secs: i64,
    ) -> AmbushAlert {
        self.raise(
            last_known,
            format!("unit silent for {silent_for_secs}s while marked active"),
            vec![format!("sudden silence on unit {officer_id}")],
            vec![officer_id.to_string()],
        )
    }

    /// Explicit detector input (external model or operator).
    pub fn raise_explicit(
        &mut self,
        location: GeoPoint,
        indicators: Vec<String>,
        affected_officers: Vec<String>,
    ) -> AmbushAlert {
        self.raise(location, "explicit ambush indicator".into(), indicators, affected_officers)
    }

    fn raise(
        &mut self,
        location: GeoPoint,
        cause: String,
        mut indicators: Vec<String>,
        affected_officers: Vec<String>,
    ) -> AmbushAlert {
        indicators.insert(0, cause);
        let alert = AmbushAlert {
            alert_id: Uuid::new_v4().to_string(),
            alert_level: ThreatLevel::Critical,
            location_description: format!("({:.4}, {:.4})", location.lat, location.lon),
            location,
            indicators,
            recommended_actions: vec![
                "Do not approach alone - stage and wait for backup".into(),
                "Approach from an alternate route".into(),
                "Request aerial overwatch".into(),
            ],
            affected_officers,
            created_at: Utc::now(),
            acknowledged_by: Vec::new(),
            closed: false,
            closed_by: None,
        };
        warn!(
            alert_id = %alert.alert_id,
            officers = alert.affected_officers.len(),
            "AMBUSH alert raised"
        );
        self.alerts.insert(alert.alert_id.clone(), alert.clone());
        alert
    }

    /// Per-officer acknowledgment.
    pub fn acknowledge(&mut self, alert_id: &str, officer_id: &str) -> bool {
        let Some(alert) = self.alerts.get_mut(alert_id) else {
            return false;
        };
        if !alert.acknowledged_by.iter().any(|o| o == officer_id) {
            alert.acknowledged_by.push(officer_id.to_string());
        }
        true
    }

    /// Supervisor close.
    pub fn close(&mut self, alert_id: &str, supervisor_id: &str) -> bool {
        let Some(alert) = self.alerts.get_mut(alert_id) else {
            return false;
        };
        alert.closed = true;
        alert.closed_by = Some(supervisor_id.to_string());
        true
    }

    pub fn get(&self, alert_id: &str) -> Option<&AmbushAlert> {
        self.alerts.get(alert_id)
    }

    /// Alerts not yet resolved (all-acknowledged or supervisor-closed).
    pub fn open_alerts(&self) -> Vec<&AmbushAlert> {
        self.alerts.values().filter(|a| !a.is_resolved()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point() -> GeoPoint {
        GeoPoint::new(26.70, -80.05)
    }

    #[test]
    fn clustered_calls_raise_alert() {
        let mut det = AmbushDetector::new(600, 400.0, 3);
        let now = Utc::now();
        let officers = vec!["o1".to_string()];

        assert!(det.observe_call("c1", point(), now, &officers).is_none());
        assert!(det
            .observe_call("c2", GeoPoint::new(26.7005, -80.0505), now + Duration::seconds(60), &officers)
            .is_none());
        let alert = det
            .observe_call("c3", GeoPoint::new(26.7002, -80.0498), now + Duration::seconds(120), &officers)
            .expect("third clustered call should fire");
        assert_eq!(alert.alert_level, ThreatLevel::Critical);
        assert_eq!(alert.affected_officers, officers);
        assert!(alert.indicators.len() >= 3);
    }

    #[test]
    fn calls_outside_window_do_not_cluster() {
        let mut det = AmbushDetector::new(600, 400.0, 3);
        let now = Utc::now();
        let officers = vec!["o1".to_string()];

        det.observe_call("c1", point(), now, &officers);
        det.observe_call("c2", point(), now + Duration::seconds(60), &officers);
        // Third call arrives after the window has flushed the first two.
        let late = now + Duration::seconds(1300);
        assert!(det.observe_call("c3", point(), late, &officers).is_none());
    }

    #[test]
    fn alert_closes_when_all_acknowledge() {
        let mut det = AmbushDetector::new(600, 400.0, 3);
        let alert = det.raise_explicit(point(), vec!["spotter".into()], vec!["o1".into(), "o2".into()]);
        assert_eq!(det.open_alerts().len(), 1);

        det.acknowledge(&alert.alert_id, "o1");
        assert_eq!(det.open_alerts().len(), 1);
        det.acknowledge(&alert.alert_id, "o2");
        assert!(det.open_alerts().is_empty());
    }

    #[test]
    fn supervisor_close_resolves_immediately() {
        let mut det = AmbushDetector::new(600, 400.0, 3);
        let alert = det.raise_explicit(point(), vec![], vec!["o1".into(), "o2".into()]);
        det.close(&alert.alert_id, "sup-1");
        assert!(det.open_alerts().is_empty());
        assert_eq!(
            det.get(&alert.alert_id).unwrap().closed_by.as_deref(),
            Some("sup-1")
        );
    }
}
