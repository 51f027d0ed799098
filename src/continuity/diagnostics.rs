//! Diagnostics engine - event classification, slow queries, predictive
//! degradation alerts
//!
//! Events are binned into categories with severities. Slow-query events
//! fire when duration exceeds the threshold. The predictive analyzer
//! keeps rolling latency windows per source; when the recent-window mean
//! exceeds k x the older-window mean, or an error-rate source exceeds
//! its threshold, it emits a predictive alert with indicators and
//! recommended actions.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ContinuityConfig;
use crate::types::{
    DiagnosticCategory, DiagnosticEvent, DiagnosticSeverity, PredictiveAlert, SlowQueryEvent,
};

/// A timestamped latency observation per source.
#[derive(Debug, Clone, Copy)]
struct LatencySample {
    at: DateTime<Utc>,
    latency_ms: f64,
}

/// Diagnostics engine.
pub struct DiagnosticsEngine {
    config: ContinuityConfig,
    events: VecDeque<DiagnosticEvent>,
    slow_queries: VecDeque<SlowQueryEvent>,
    alerts: Vec<PredictiveAlert>,
    latencies: HashMap<String, VecDeque<LatencySample>>,
    error_counts: HashMap<String, VecDeque<DateTime<Utc>>>,
}

const EVENT_LOG_SIZE: usize = 10_000;
const SLOW_QUERY_LOG_SIZE: usize = 1_000;

impl DiagnosticsEngine {
    pub fn new(config: ContinuityConfig) -> Self {
        Self {
            config,
            events: VecDeque::with_capacity(EVENT_LOG_SIZE),
            slow_queries: VecDeque::with_capacity(SLOW_QUERY_LOG_SIZE),
            alerts: Vec::new(),
            latencies: HashMap::new(),
            error_counts: HashMap::new(),
        }
    }

    /// Log a classified event.
    pub fn log_event(
        &mut self,
        category: DiagnosticCategory,
        severity: DiagnosticSeverity,
        source: &str,
        message: &str,
        error_code: Option<String>,
    ) -> DiagnosticEvent {
        let event = DiagnosticEvent {
            event_id: format!("diag-{}", Uuid::new_v4().simple()),
            category,
            severity,
            source: source.to_string(),
            message: message.to_string(),
            error_code,
            timestamp: Utc::now(),
            resolved: false,
        };
        if severity >= DiagnosticSeverity::Error {
            self.error_counts
                .entry(source.to_string())
                .or_default()
                .push_back(event.timestamp);
        }
        if self.events.len() >= EVENT_LOG_SIZE {
            self.events.pop_front();
        }
        debug!(
            category = ?category,
            severity = ?severity,
            source,
            "Diagnostic event"
        );
        self.events.push_back(event.clone());
        event
    }

    /// Record a query duration; fires a slow-query event past threshold.
    pub fn record_query(
        &mut self,
        source: &str,
        query_type: &str,
        duration_ms: f64,
    ) -> Option<SlowQueryEvent> {
        self.record_latency(source, duration_ms, Utc::now());
        if duration_ms < self.config.slow_query_threshold_ms {
            return None;
        }
        let event = SlowQueryEvent {
            query_id: format!("slow-{}", Uuid::new_v4().simple()),
            source: source.to_string(),
            query_type: query_type.to_string(),
            duration_ms,
            threshold_ms: self.config.slow_query_threshold_ms,
            timestamp: Utc::now(),
        };
        warn!(
            source,
            query_type,
            duration_ms,
            threshold_ms = self.config.slow_query_threshold_ms,
            "Slow query detected"
        );
        if self.slow_queries.len() >= SLOW_QUERY_LOG_SIZE {
            self.slow_queries.pop_front();
        }
        self.slow_queries.push_back(event.clone());
        Some(event)
    }

    /// Feed a latency sample into the predictive windows.
    pub fn record_latency(&mut self, source: &str, latency_ms: f64, at: DateTime<Utc>) {
        let window = Duration::minutes(self.config.predictive_window_minutes * 2);
        let samples = self.latencies.entry(source.to_string()).or_default();
        samples.push_back(LatencySample { at, latency_ms });
        while samples.front().is_some_and(|s| at - s.at > window) {
            samples.pop_front();
        }
    }

    /// Predictive pass over every source.
    ///
    /// Splits each source's samples at `now - predictive_window`; the
    /// recent half's mean against the older half's mean decides the
    /// alert. Error-rate sources alert on count within the window.
    pub fn run_predictive_analysis(&mut self, now: DateTime<Utc>) -> Vec<PredictiveAlert> {
        let boundary = now - Duration::minutes(self.config.predictive_window_minutes);
        let factor = self.config.predictive_degradation_factor;
        let mut fired = Vec::new();

        for (source, samples) in &self.latencies {
            let (older, recent): (Vec<f64>, Vec<f64>) = samples.iter().fold(
                (Vec::new(), Vec::new()),
                |(mut older, mut recent), s| {
                    if s.at < boundary {
                        older.push(s.latency_ms);
                    } else {
                        recent.push(s.latency_ms);
                    }
                    (older, recent)
                },
            );
            if older.len() < 3 || recent.len() < 3 {
                continue;
            }
            let older_mean = older.iter().sum::<f64>() / older.len() as f64;
            let recent_mean = recent.iter().sum::<f64>() / recent.len() as f64;
            if older_mean > 0.0 && recent_mean >= older_mean * factor {
                fired.push(PredictiveAlert {
                    alert_id: format!("pred-{}", Uuid::new_v4().simple()),
                    source: source.clone(),
                    indicators: vec![format!(
                        "recent mean latency {recent_mean:.0}ms vs baseline {older_mean:.0}ms ({factor:.1}x threshold)"
                    )],
                    recommended_actions: vec![
                        "Inspect downstream dependency saturation".into(),
                        "Consider pre-emptive failover before hard failure".into(),
                    ],
                    recent_mean_ms: recent_mean,
                    baseline_mean_ms: older_mean,
                    timestamp: now,
                    acknowledged: false,
                });
            }
        }

        let error_threshold = self.config.predictive_error_threshold;
        for (source, stamps) in &mut self.error_counts {
            stamps.retain(|t| now - *t <= Duration::minutes(30));
            if stamps.len() >= error_threshold {
                fired.push(PredictiveAlert {
                    alert_id: format!("pred-{}", Uuid::new_v4().simple()),
                    source: source.clone(),
                    indicators: vec![format!("{} errors in the last 30 minutes", stamps.len())],
                    recommended_actions: vec!["Review recent error diagnostics".into()],
                    recent_mean_ms: 0.0,
                    baseline_mean_ms: 0.0,
                    timestamp: now,
                    acknowledged: false,
                });
                stamps.clear();
            }
        }

        for alert in &fired {
            warn!(
                source = %alert.source,
                indicators = ?alert.indicators,
                "Predictive alert"
            );
        }
        self.alerts.extend(fired.clone());
        fired
    }

    pub fn acknowledge_alert(&mut self, alert_id: &str) -> bool {
        let Some(alert) = self.alerts.iter_mut().find(|a| a.alert_id == alert_id) else {
            return false;
        };
        alert.acknowledged = true;
        true
    }

    pub fn resolve_event(&mut self, event_id: &str) -> bool {
        let Some(event) = self.events.iter_mut().find(|e| e.event_id == event_id) else {
            return false;
        };
        event.resolved = true;
        true
    }

    pub fn events(&self, limit: usize) -> Vec<&DiagnosticEvent> {
        self.events.iter().rev().take(limit).collect()
    }

    pub fn slow_queries(&self, limit: usize) -> Vec<&SlowQueryEvent> {
        self.slow_queries.iter().rev().take(limit).collect()
    }

    pub fn alerts(&self, unacknowledged_only: bool) -> Vec<&PredictiveAlert> {
        self.alerts
            .iter()
            .filter(|a| !unacknowledged_only || !a.acknowledged)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> DiagnosticsEngine {
        DiagnosticsEngine::new(ContinuityConfig::default())
    }

    #[test]
    fn slow_query_fires_only_past_threshold() {
        let mut eng = engine();
        assert!(eng.record_query("db", "select", 500.0).is_none());
        let event = eng.record_query("db", "select", 1500.0).unwrap();
        assert!((event.threshold_ms - 1000.0).abs() < f64::EPSILON);
        assert_eq!(eng.slow_queries(10).len(), 1);
    }

    #[test]
    fn latency_degradation_raises_predictive_alert() {
        let mut eng = engine();
        let now = Utc::now();
        // Older window: ~100ms.
        for i in 0..10 {
            eng.record_latency("es", 100.0, now - Duration::minutes(45) + Duration::seconds(i));
        }
        // Recent window: ~250ms, above the 2x factor.
        for i in 0..10 {
            eng.record_latency("es", 250.0, now - Duration::minutes(5) + Duration::seconds(i));
        }
        let alerts = eng.run_predictive_analysis(now);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].source, "es");
        assert!(alerts[0].recent_mean_ms > alerts[0].baseline_mean_ms * 2.0 - 1.0);
    }

    #[test]
    fn stable_latency_raises_nothing() {
        let mut eng = engine();
        let now = Utc::now();
        for i in 0..10 {
            eng.record_latency("es", 100.0, now - Duration::minutes(45) + Duration::seconds(i));
            eng.record_latency("es", 110.0, now - Duration::minutes(5) + Duration::seconds(i));
        }
        assert!(eng.run_predictive_analysis(now).is_empty());
    }

    #[test]
    fn error_burst_raises_alert() {
        let mut eng = engine();
        for _ in 0..10 {
            eng.log_event(
                DiagnosticCategory::Network,
                DiagnosticSeverity::Error,
                "vendor-bridge",
                "connection reset",
                Some("ECONNRESET".into()),
            );
        }
        let alerts = eng.run_predictive_analysis(Utc::now());
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].indicators[0].contains("errors"));
    }

    #[test]
    fn alerts_acknowledge() {
        let mut eng = engine();
        for _ in 0..10 {
            eng.log_event(
                DiagnosticCategory::Queue,
                DiagnosticSeverity::Error,
                "q",
                "full",
                None,
            );
        }
        let alerts = eng.run_predictive_analysis(Utc::now());
        let id = alerts[0].alert_id.clone();
        assert!(eng.acknowledge_alert(&id));
        assert!(eng.alerts(true).is_empty());
        assert_eq!(eng.alerts(false).len(), 1);
    }
}
