//! Fusion Engine - multi-source correlation with graded confidence
//!
//! A configurable rule set maps source-type combinations to a correlation
//! window and radius. When a source arrives, pending sources within the
//! window of other eligible types are scanned; meeting the rule's
//! `min_sources` either extends an overlapping fusion (confidence bumped
//! by the rule boost, center and radius recomputed) or creates a new one.
//!
//! Confidence score: `mean(source confidences) * 0.5 + rule boost +
//! 0.1 * (|sources| - 2)`, clamped to [0,1]. Adding a source never
//! decreases confidence. A fusion crossing `auto_verify_threshold` is
//! auto-verified.

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::FusionConfig;
use crate::geo;
use crate::types::{
    CorrelationKind, CorrelationRule, EventSource, FusedEvent, FusionConfidence, FusionMetrics,
    GeoPoint, RawEvent, Severity,
};

/// Default correlation rules shipped with the engine.
pub fn default_rules() -> Vec<CorrelationRule> {
    vec![
        CorrelationRule {
            rule_id: "rule-gunshot-lpr".into(),
            name: "Gunshot + LPR Correlation".into(),
            source_types: vec!["gunshot".into(), "lpr".into()],
            correlation_kind: CorrelationKind::SensorLpr,
            time_window_secs: 120,
            distance_threshold_m: 300.0,
            min_sources: 2,
            confidence_boost: 0.2,
            enabled: true,
            priority: 1,
            tags: vec!["gunshot".into(), "vehicle".into()],
        },
        CorrelationRule {
            rule_id: "rule-gunshot-drone".into(),
            name: "Gunshot + Drone Correlation".into(),
            source_types: vec!["gunshot".into(), "drone_telemetry".into()],
            correlation_kind: CorrelationKind::SensorDrone,
            time_window_secs: 60,
            distance_threshold_m: 500.0,
            min_sources: 2,
            confidence_boost: 0.15,
            enabled: true,
            priority: 1,
            tags: vec!["gunshot".into(), "aerial".into()],
        },
        CorrelationRule {
            rule_id: "rule-crowd-environmental".into(),
            name: "Crowd + Environmental Correlation".into(),
            source_types: vec!["crowd".into(), "environmental".into()],
            correlation_kind: CorrelationKind::SensorSensor,
            time_window_secs: 300,
            distance_threshold_m: 200.0,
            min_sources: 2,
            confidence_boost: 0.1,
            enabled: true,
            priority: 1,
            tags: vec!["crowd".into(), "environmental".into()],
        },
        CorrelationRule {
            rule_id: "rule-panic-cad".into(),
            name: "Panic Beacon + CAD Correlation".into(),
            source_types: vec!["panic".into(), "cad".into()],
            correlation_kind: CorrelationKind::SensorCad,
            time_window_secs: 180,
            distance_threshold_m: 100.0,
            min_sources: 2,
            confidence_boost: 0.25,
            enabled: true,
            priority: 1,
            tags: vec!["panic".into(), "emergency".into()],
        },
        CorrelationRule {
            rule_id: "rule-lpr-cad".into(),
            name: "LPR + CAD Correlation".into(),
            source_types: vec!["lpr".into(), "cad".into()],
            correlation_kind: CorrelationKind::LprCad,
            time_window_secs: 300,
            distance_threshold_m: 500.0,
            min_sources: 2,
            confidence_boost: 0.2,
            enabled: true,
            priority: 1,
            tags: vec!["vehicle".into(), "incident".into()],
        },
        CorrelationRule {
            rule_id: "rule-multi-sensor".into(),
            name: "Multi-Sensor Correlation".into(),
            source_types: vec![
                "gunshot".into(),
                "crowd".into(),
                "environmental".into(),
                "panic".into(),
            ],
            correlation_kind: CorrelationKind::MultiSource,
            time_window_secs: 120,
            distance_threshold_m: 300.0,
            min_sources: 3,
            confidence_boost: 0.3,
            enabled: true,
            priority: 2,
            tags: vec!["multi-source".into()],
        },
    ]
}

/// Grid fusion engine. Owns fused events and the pending-source window.
pub struct FusionEngine {
    config: FusionConfig,
    /// Hot-swappable rule set; readers never block on rule updates.
    rules: ArcSwap<Vec<CorrelationRule>>,
    fused: HashMap<String, FusedEvent>,
    pending: VecDeque<RawEvent>,
    metrics: FusionMetrics,
}

impl FusionEngine {
    pub fn new(config: FusionConfig) -> Self {
        Self {
            config,
            rules: ArcSwap::from_pointee(default_rules()),
            fused: HashMap::new(),
            pending: VecDeque::new(),
            metrics: FusionMetrics::default(),
        }
    }

    /// Add a source event and run correlation against the pending window.
    ///
    /// Returns fusions created or extended by this source.
    pub fn add_source(&mut self, event: RawEvent) -> Vec<FusedEvent> {
        if self.pending.len() >= self.config.max_pending_sources {
            self.pending.pop_front();
        }
        self.pending.push_back(event.clone());

        let Some(_location) = event.location else {
            debug!(event_id = %event.event_id, "source without location skipped for correlation");
            return Vec::new();
        };

        let rules = self.rules.load_full();
        let mut touched = Vec::new();

        for rule in rules.iter() {
            if !rule.enabled {
                continue;
            }
            if !rule.source_types.iter().any(|t| t == event.source_type()) {
                continue;
            }

            let matches = self.find_matching_sources(&event, rule);
            if matches.len() + 1 >= rule.min_sources {
                let mut all = vec![event.clone()];
                all.extend(matches);
                let fusion = self.create_or_update_fusion(all, rule);
                touched.push(fusion);
            }
        }

        touched
    }

    /// Pending sources of other eligible types within the rule's windows.
    fn find_matching_sources(&self, source: &RawEvent, rule: &CorrelationRule) -> Vec<RawEvent> {
        let Some(src_loc) = source.location else {
            return Vec::new();
        };
        let cutoff = source.event_time - chrono::Duration::seconds(rule.time_window_secs);

        self.pending
            .iter()
            .filter(|p| p.event_id != source.event_id)
            .filter(|p| rule.source_types.iter().any(|t| t == p.source_type()))
            .filter(|p| p.source != source.source)
            .filter(|p| p.event_time >= cutoff)
            .filter(|p| {
                p.location
                    .is_some_and(|loc| geo::distance_m(src_loc, loc) <= rule.distance_threshold_m)
            })
            .cloned()
            .collect()
    }

    fn create_or_update_fusion(
        &mut self,
        sources: Vec<RawEvent>,
        rule: &CorrelationRule,
    ) -> FusedEvent {
        if let Some(fusion_id) = self.find_overlapping_fusion(&sources) {
            #[allow(clippy::unwrap_used)] // key just returned by find_overlapping_fusion
            let fusion = self.fused.get_mut(&fusion_id).unwrap();
            for source in sources {
                if !fusion.sources.iter().any(|s| s.event_id == source.event_id) {
                    fusion.sources.push(source);
                }
            }
            fusion.updated_at = Utc::now();
            fusion.confidence_score =
                (fusion.confidence_score + rule.confidence_boost).min(1.0);
            fusion.confidence = FusionConfidence::from_score(fusion.confidence_score);
            if fusion.confidence_score >= self.config.auto_verify_threshold && !fusion.verified {
                fusion.verified = true;
                fusion.verified_at = Some(Utc::now());
            }
            Self::recalculate_center(fusion);
            let updated = fusion.clone();
            debug!(
                fusion_id = %updated.fusion_id,
                sources = updated.sources.len(),
                confidence = updated.confidence_score,
                "Fusion extended"
            );
            self.update_metrics();
            return updated;
        }

        let (center, radius_m) = Self::geometry(&sources);
        let base_confidence =
            sources.iter().map(|s| s.confidence).sum::<f64>() / sources.len() as f64;
        let confidence_score = (base_confidence * 0.5
            + rule.confidence_boost
            + (sources.len() as f64 - 2.0) * 0.1)
            .clamp(0.0, 1.0);

        let event_type = Self::determine_event_type(&sources);
        let severity = Self::determine_severity(&sources, confidence_score);
        let description = format!(
            "Fused event from {} sources: {}",
            sources.len(),
            sources
                .iter()
                .map(RawEvent::source_type)
                .collect::<Vec<_>>()
                .join(", ")
        );

        let now = Utc::now();
        let auto_verified = confidence_score >= self.config.auto_verify_threshold;
        let fusion = FusedEvent {
            fusion_id: format!("fusion-{}", short_id()),
            correlation_kind: rule.correlation_kind,
            confidence: FusionConfidence::from_score(confidence_score),
            confidence_score,
            created_at: now,
            updated_at: now,
            center,
            radius_m,
            sources,
            event_type: event_type.to_string(),
            description,
            severity,
            verified: auto_verified,
            verified_by: None,
            verified_at: auto_verified.then_some(now),
            incident_id: None,
            tags: rule.tags.clone(),
        };

        info!(
            fusion_id = %fusion.fusion_id,
            kind = %fusion.correlation_kind,
            event_type = %fusion.event_type,
            severity = %fusion.severity,
            confidence = fusion.confidence_score,
            auto_verified,
            "Fusion created"
        );

        self.fused.insert(fusion.fusion_id.clone(), fusion.clone());
        self.metrics.total_fusions += 1;
        self.update_metrics();
        fusion
    }

    /// A fusion already containing any of these sources.
    fn find_overlapping_fusion(&self, sources: &[RawEvent]) -> Option<String> {
        self.fused
            .values()
            .find(|f| {
                f.sources
                    .iter()
                    .any(|fs| sources.iter().any(|s| s.event_id == fs.event_id))
            })
            .map(|f| f.fusion_id.clone())
    }

    fn geometry(sources: &[RawEvent]) -> (GeoPoint, f64) {
        let points: Vec<GeoPoint> = sources.iter().filter_map(|s| s.location).collect();
        if points.is_empty() {
            return (GeoPoint::new(0.0, 0.0), 100.0);
        }
        let center = GeoPoint::new(
            points.iter().map(|p| p.lat).sum::<f64>() / points.len() as f64,
            points.iter().map(|p| p.lon).sum::<f64>() / points.len() as f64,
        );
        let max_dist = points
            .iter()
            .map(|p| geo::distance_m(center, *p))
            .fold(0.0, f64::max);
        (center, (max_dist * 1.2).max(100.0))
    }

    fn recalculate_center(fusion: &mut FusedEvent) {
        let (center, radius) = Self::geometry(&fusion.sources);
        fusion.center = center;
        fusion.radius_m = radius;
    }

    /// Event type derived from source composition.
    fn determine_event_type(sources: &[RawEvent]) -> &'static str {
        let has = |src: EventSource| sources.iter().any(|s| s.source == src);
        if has(EventSource::Gunshot) {
            "gunshot_incident"
        } else if has(EventSource::Panic) {
            "emergency_alert"
        } else if has(EventSource::Crowd) && has(EventSource::Environmental) {
            "crowd_hazard"
        } else if has(EventSource::Lpr) {
            "vehicle_incident"
        } else {
            "multi_source_event"
        }
    }

    fn determine_severity(sources: &[RawEvent], confidence: f64) -> Severity {
        let has = |src: EventSource| sources.iter().any(|s| s.source == src);
        if has(EventSource::Gunshot) || has(EventSource::Panic) {
            return if confidence > 0.7 {
                Severity::Critical
            } else {
                Severity::High
            };
        }
        if confidence > 0.8 {
            Severity::High
        } else if confidence > 0.5 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    // ------------------------------------------------------------------
    // Operator actions
    // ------------------------------------------------------------------

    /// Operator verification forces the score to 1.0.
    pub fn verify_fusion(&mut self, fusion_id: &str, verified_by: &str) -> bool {
        let Some(fusion) = self.fused.get_mut(fusion_id) else {
            return false;
        };
        fusion.verified = true;
        fusion.verified_by = Some(verified_by.to_string());
        fusion.verified_at = Some(Utc::now());
        fusion.confidence = FusionConfidence::Verified;
        fusion.confidence_score = 1.0;
        self.metrics.verified_fusions += 1;
        info!(fusion_id, verified_by, "Fusion verified by operator");
        true
    }

    /// Link a fused event to an incident record.
    pub fn link_to_incident(&mut self, fusion_id: &str, incident_id: &str) -> bool {
        let Some(fusion) = self.fused.get_mut(fusion_id) else {
            return false;
        };
        fusion.incident_id = Some(incident_id.to_string());
        fusion.updated_at = Utc::now();
        true
    }

    // ------------------------------------------------------------------
    // Rule management (hot-swap)
    // ------------------------------------------------------------------

    pub fn rules(&self) -> Arc<Vec<CorrelationRule>> {
        self.rules.load_full()
    }

    pub fn add_rule(&self, rule: CorrelationRule) {
        let mut rules = (*self.rules.load_full()).clone();
        rules.retain(|r| r.rule_id != rule.rule_id);
        rules.push(rule);
        self.rules.store(Arc::new(rules));
    }

    pub fn update_rule(
        &self,
        rule_id: &str,
        enabled: Option<bool>,
        time_window_secs: Option<i64>,
        distance_threshold_m: Option<f64>,
    ) -> bool {
        let mut rules = (*self.rules.load_full()).clone();
        let Some(rule) = rules.iter_mut().find(|r| r.rule_id == rule_id) else {
            return false;
        };
        if let Some(e) = enabled {
            rule.enabled = e;
        }
        if let Some(w) = time_window_secs {
            rule.time_window_secs = w;
        }
        if let Some(d) = distance_threshold_m {
            rule.distance_threshold_m = d;
        }
        self.rules.store(Arc::new(rules));
        true
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn get_fusion(&self, fusion_id: &str) -> Option<&FusedEvent> {
        self.fused.get(fusion_id)
    }

    pub fn active_fusions(&self) -> impl Iterator<Item = &FusedEvent> {
        self.fused.values()
    }

    pub fn fusions_in_area(&self, center: GeoPoint, radius_km: f64) -> Vec<&FusedEvent> {
        self.fused
            .values()
            .filter(|f| geo::distance_km(center, f.center) <= radius_km)
            .collect()
    }

    pub fn metrics(&self) -> &FusionMetrics {
        &self.metrics
    }

    /// Drop pending sources older than the widest rule window relative to `now`.
    pub fn expire_pending(&mut self, now: DateTime<Utc>) {
        let widest = self
            .rules
            .load()
            .iter()
            .map(|r| r.time_window_secs)
            .max()
            .unwrap_or(self.config.correlation_window_secs);
        let cutoff = now - chrono::Duration::seconds(widest);
        self.pending.retain(|p| p.event_time >= cutoff);
    }

    fn update_metrics(&mut self) {
        let mut by_kind = std::collections::BTreeMap::new();
        let mut by_confidence = std::collections::BTreeMap::new();
        let mut total_sources = 0usize;
        let mut verified = 0u64;
        for f in self.fused.values() {
            *by_kind.entry(f.correlation_kind.to_string()).or_insert(0) += 1;
            let band = format!("{:?}", f.confidence).to_lowercase();
            *by_confidence.entry(band).or_insert(0) += 1;
            total_sources += f.sources.len();
            if f.verified {
                verified += 1;
            }
        }
        self.metrics.fusions_by_kind = by_kind;
        self.metrics.fusions_by_confidence = by_confidence;
        self.metrics.active_fusions = self.fused.len();
        self.metrics.verified_fusions = verified;
        self.metrics.avg_sources_per_fusion = if self.fused.is_empty() {
            0.0
        } else {
            total_sources as f64 / self.fused.len() as f64
        };
    }
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventPayload;

    fn event(id: &str, source: EventSource, lat: f64, lon: f64, conf: f64) -> RawEvent {
        RawEvent {
            event_id: id.to_string(),
            source,
            event_time: Utc::now(),
            ingest_time: Utc::now(),
            location: Some(GeoPoint::new(lat, lon)),
            payload: EventPayload::SensorReading {
                sensor_id: id.to_string(),
                reading: Default::default(),
            },
            confidence: conf,
            correlation_hints: vec![],
        }
    }

    fn engine() -> FusionEngine {
        FusionEngine::new(FusionConfig::default())
    }

    #[test]
    fn gunshot_plus_lpr_creates_sensor_lpr_fusion() {
        let mut eng = engine();
        assert!(eng
            .add_source(event("g1", EventSource::Gunshot, 26.7000, -80.0500, 0.92))
            .is_empty());
        let fusions = eng.add_source(event("l1", EventSource::Lpr, 26.7002, -80.0498, 0.9));
        assert_eq!(fusions.len(), 1);
        let f = &fusions[0];
        assert_eq!(f.correlation_kind, CorrelationKind::SensorLpr);
        assert_eq!(f.event_type, "gunshot_incident");
        assert!(f.confidence_score >= 0.6, "got {}", f.confidence_score);
        assert!(matches!(f.severity, Severity::High | Severity::Critical));
        assert_eq!(f.sources.len(), 2);
    }

    #[test]
    fn distant_sources_do_not_fuse() {
        let mut eng = engine();
        eng.add_source(event("g1", EventSource::Gunshot, 26.7000, -80.0500, 0.9));
        // ~11 km away, outside the 300 m rule radius
        let fusions = eng.add_source(event("l1", EventSource::Lpr, 26.8000, -80.0500, 0.9));
        assert!(fusions.is_empty());
    }

    #[test]
    fn same_source_type_never_correlates_with_itself() {
        let mut eng = engine();
        eng.add_source(event("g1", EventSource::Gunshot, 26.70, -80.05, 0.9));
        let fusions = eng.add_source(event("g2", EventSource::Gunshot, 26.70, -80.05, 0.9));
        assert!(fusions.is_empty());
    }

    #[test]
    fn extending_fusion_never_decreases_confidence() {
        let mut eng = engine();
        eng.add_source(event("g1", EventSource::Gunshot, 26.70, -80.05, 0.9));
        let first = eng.add_source(event("l1", EventSource::Lpr, 26.7001, -80.0501, 0.9));
        let before = first[0].confidence_score;
        let second = eng.add_source(event("l2", EventSource::Lpr, 26.7002, -80.0499, 0.9));
        assert!(!second.is_empty());
        assert!(second[0].confidence_score >= before);
        assert!(second[0].confidence_score <= 1.0);
    }

    #[test]
    fn sources_within_rule_windows() {
        let mut eng = engine();
        eng.add_source(event("g1", EventSource::Gunshot, 26.70, -80.05, 0.9));
        let fusions = eng.add_source(event("l1", EventSource::Lpr, 26.7001, -80.0501, 0.9));
        let f = &fusions[0];
        // Every source within the rule windows of at least one other source.
        for s in &f.sources {
            let ok = f.sources.iter().any(|o| {
                o.event_id != s.event_id
                    && (o.event_time - s.event_time).num_seconds().abs() <= 120
                    && geo::distance_m(o.location.unwrap(), s.location.unwrap()) <= 300.0
            });
            assert!(ok);
        }
    }

    #[test]
    fn operator_verify_forces_full_confidence() {
        let mut eng = engine();
        eng.add_source(event("g1", EventSource::Gunshot, 26.70, -80.05, 0.6));
        let fusions = eng.add_source(event("l1", EventSource::Lpr, 26.7001, -80.0501, 0.6));
        let id = fusions[0].fusion_id.clone();
        assert!(eng.verify_fusion(&id, "operator-7"));
        let f = eng.get_fusion(&id).unwrap();
        assert!(f.verified);
        assert!((f.confidence_score - 1.0).abs() < f64::EPSILON);
        assert!(!eng.verify_fusion("missing", "operator-7"));
    }

    #[test]
    fn panic_beacon_maps_to_emergency_alert() {
        let mut eng = engine();
        eng.add_source(event("p1", EventSource::Panic, 26.70, -80.05, 1.0));
        let fusions = eng.add_source(event("c1", EventSource::Cad, 26.7001, -80.0501, 1.0));
        assert_eq!(fusions[0].event_type, "emergency_alert");
        assert_eq!(fusions[0].severity, Severity::Critical);
    }

    #[test]
    fn rule_updates_hot_swap() {
        let eng = engine();
        assert!(eng.update_rule("rule-gunshot-lpr", Some(false), None, None));
        let rules = eng.rules();
        let rule = rules.iter().find(|r| r.rule_id == "rule-gunshot-lpr").unwrap();
        assert!(!rule.enabled);
        assert!(!eng.update_rule("rule-missing", Some(true), None, None));
    }
}
