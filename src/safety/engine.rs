//! Officer Safety Engine - per-officer situational state and warnings
//!
//! Maintains `OfficerSafetyStatus` per officer and materializes proximity
//! warnings against known threats. An officer's threat level is the max
//! of active warnings' levels; the threat score is a saturating aggregate
//! of warning weights in [0,1]. Warnings expire after their TTL or on
//! explicit acknowledgment.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SafetyConfig;
use crate::geo;
use crate::types::{
    AmbushAlert, CheckIn, CheckInType, FallDetectionState, FallEvent, GeoPoint, Hotzone,
    OfficerSafetyStatus, ProximityWarning, ThreatLevel, WarningType,
};

use super::ambush::AmbushDetector;
use super::checkin::CheckInRegistry;
use super::fall::FallTracker;
use super::hotzone::HotzoneTracker;

/// A threat the engine evaluates officer proximity against.
#[derive(Debug, Clone)]
pub struct Threat {
    pub threat_id: String,
    pub warning_type: WarningType,
    pub title: String,
    pub description: String,
    pub threat_level: ThreatLevel,
    pub location: GeoPoint,
}

/// Officer safety engine composing proximity, ambush, hotzone, check-in
/// and fall tracking.
pub struct OfficerSafetyEngine {
    config: SafetyConfig,
    statuses: HashMap<String, OfficerSafetyStatus>,
    warnings: HashMap<String, Vec<ProximityWarning>>,
    pub ambush: AmbushDetector,
    pub hotzones: HotzoneTracker,
    pub checkins: CheckInRegistry,
    pub falls: FallTracker,
}

impl OfficerSafetyEngine {
    pub fn new(config: SafetyConfig) -> Self {
        let ambush = AmbushDetector::new(
            config.ambush_time_window_secs,
            config.ambush_distance_window_m,
            config.ambush_min_calls,
        );
        let checkins = CheckInRegistry::new(config.checkin_interval_minutes);
        let falls = FallTracker::new(config.fall_confirm_timeout_secs);
        Self {
            config,
            statuses: HashMap::new(),
            warnings: HashMap::new(),
            ambush,
            hotzones: HotzoneTracker::new(),
            checkins,
            falls,
        }
    }

    fn status_entry(&mut self, officer_id: &str) -> &mut OfficerSafetyStatus {
        self.statuses
            .entry(officer_id.to_string())
            .or_insert_with(|| OfficerSafetyStatus {
                officer_id: officer_id.to_string(),
                threat_level: ThreatLevel::Low,
                threat_score: 0.0,
                active_warnings: Vec::new(),
                nearby_threats: 0,
                in_hotzone: false,
                hotzone_name: None,
                last_check_in: None,
                last_location: None,
                fall_detection_state: FallDetectionState::Normal,
                on_duty: true,
                updated_at: Utc::now(),
            })
    }

    pub fn status(&self, officer_id: &str) -> Option<&OfficerSafetyStatus> {
        self.statuses.get(officer_id)
    }

    pub fn on_duty_officers(&self) -> Vec<&OfficerSafetyStatus> {
        self.statuses.values().filter(|s| s.on_duty).collect()
    }

    pub fn set_on_duty(&mut self, officer_id: &str, on_duty: bool) {
        let now = Utc::now();
        if on_duty {
            self.checkins.track(officer_id, now);
        }
        let status = self.status_entry(officer_id);
        status.on_duty = on_duty;
        status.updated_at = now;
    }

    // ------------------------------------------------------------------
    // Proximity
    // ------------------------------------------------------------------

    fn radius_for(&self, warning_type: WarningType) -> f64 {
        self.config
            .proximity_radius_overrides
            .get(&warning_type.to_string())
            .copied()
            .unwrap_or(self.config.proximity_radius_m)
    }

    /// Evaluate a threat against every on-duty officer with a known
    /// location. Returns the warnings materialized (officer, warning).
    pub fn evaluate_threat(&mut self, threat: &Threat) -> Vec<(String, ProximityWarning)> {
        let radius = self.radius_for(threat.warning_type);
        let ttl = Duration::minutes(self.config.warning_ttl_minutes);

        let candidates: Vec<(String, GeoPoint)> = self
            .statuses
            .values()
            .filter(|s| s.on_duty)
            .filter_map(|s| s.last_location.map(|loc| (s.officer_id.clone(), loc)))
            .collect();

        let mut issued = Vec::new();
        for (officer_id, officer_loc) in candidates {
            let distance = geo::distance_m(officer_loc, threat.location);
            if distance > radius {
                continue;
            }
            let bearing = geo::bearing_deg(officer_loc, threat.location);
            let warning = ProximityWarning {
                warning_id: Uuid::new_v4().to_string(),
                warning_type: threat.warning_type,
                title: threat.title.clone(),
                description: threat.description.clone(),
                threat_level: threat.threat_level,
                distance_m: distance,
                direction: Some(geo::compass_direction(bearing).to_string()),
                location: Some(threat.location),
                entity_id: Some(threat.threat_id.clone()),
                created_at: Utc::now(),
                expires_at: Utc::now() + ttl,
                acknowledged: false,
            };
            debug!(
                officer_id = %officer_id,
                threat_id = %threat.threat_id,
                distance_m = distance,
                "Proximity warning issued"
            );
            self.warnings
                .entry(officer_id.clone())
                .or_default()
                .push(warning.clone());
            self.recompute_status(&officer_id);
            issued.push((officer_id, warning));
        }
        issued
    }

    /// Push a pre-built warning onto an officer's set (ambush, fall,
    /// hotzone paths).
    pub fn push_warning(&mut self, officer_id: &str, warning: ProximityWarning) {
        self.warnings
            .entry(officer_id.to_string())
            .or_default()
            .push(warning);
        self.recompute_status(officer_id);
    }

    pub fn active_warnings(&self, officer_id: &str) -> Vec<&ProximityWarning> {
        let now = Utc::now();
        self.warnings
            .get(officer_id)
            .map(|ws| {
                ws.iter()
                    .filter(|w| !w.acknowledged && w.expires_at > now)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn acknowledge_warning(&mut self, officer_id: &str, warning_id: &str) -> bool {
        let Some(ws) = self.warnings.get_mut(officer_id) else {
            return false;
        };
        let Some(w) = ws.iter_mut().find(|w| w.warning_id == warning_id) else {
            return false;
        };
        w.acknowledged = true;
        self.recompute_status(officer_id);
        true
    }

    /// Drop expired warnings and refresh statuses. Run periodically.
    pub fn expire_warnings(&mut self, now: DateTime<Utc>) {
        let officer_ids: Vec<String> = self.warnings.keys().cloned().collect();
        for officer_id in officer_ids {
            let before = self.warnings.get(&officer_id).map_or(0, Vec::len);
            if let Some(ws) = self.warnings.get_mut(&officer_id) {
                ws.retain(|w| w.expires_at > now);
            }
            let after = self.warnings.get(&officer_id).map_or(0, Vec::len);
            if before != after {
                self.recompute_status(&officer_id);
            }
        }
    }

    // ------------------------------------------------------------------
    // Location updates
    // ------------------------------------------------------------------

    /// Officer location update: refresh status, run hotzone transitions.
    /// Entry creates a hotzone warning; exit clears that zone's warnings.
    pub fn update_location(
        &mut self,
        officer_id: &str,
        location: GeoPoint,
    ) -> Vec<ProximityWarning> {
        {
            let status = self.status_entry(officer_id);
            status.last_location = Some(location);
            status.updated_at = Utc::now();
        }

        let transition = self.hotzones.update_location(officer_id, location);
        let mut new_warnings = Vec::new();

        for zone in &transition.entered {
            let warning = self.hotzone_warning(zone);
            info!(officer_id, zone = %zone.name, "Officer entered hotzone");
            self.warnings
                .entry(officer_id.to_string())
                .or_default()
                .push(warning.clone());
            new_warnings.push(warning);
        }

        for zone_id in &transition.exited {
            if let Some(ws) = self.warnings.get_mut(officer_id) {
                ws.retain(|w| {
                    !(w.warning_type == WarningType::Hotzone
                        && w.entity_id.as_deref() == Some(zone_id.as_str()))
                });
            }
        }

        self.recompute_status(officer_id);
        new_warnings
    }

    fn hotzone_warning(&self, zone: &Hotzone) -> ProximityWarning {
        let ttl = Duration::minutes(self.config.warning_ttl_minutes);
        ProximityWarning {
            warning_id: Uuid::new_v4().to_string(),
            warning_type: WarningType::Hotzone,
            title: format!("Entering hotzone: {}", zone.name),
            description: format!(
                "{} ({} recent incidents, {} recent gunfire)",
                zone.zone_type, zone.recent_incidents, zone.recent_gunfire
            ),
            threat_level: zone.threat_level,
            distance_m: 0.0,
            direction: None,
            location: zone.polygon.first().copied(),
            entity_id: Some(zone.zone_id.clone()),
            created_at: Utc::now(),
            expires_at: Utc::now() + ttl,
            acknowledged: false,
        }
    }

    // ------------------------------------------------------------------
    // Ambush
    // ------------------------------------------------------------------

    /// Fan an ambush alert out to its affected officers as critical
    /// warnings.
    pub fn apply_ambush_alert(&mut self, alert: &AmbushAlert) {
        let ttl = Duration::minutes(self.config.warning_ttl_minutes);
        for officer_id in alert.affected_officers.clone() {
            let warning = ProximityWarning {
                warning_id: Uuid::new_v4().to_string(),
                warning_type: WarningType::Ambush,
                title: "AMBUSH ALERT".into(),
                description: format!(
                    "Possible ambush at {}: {}",
                    alert.location_description,
                    alert.indicators.join("; ")
                ),
                threat_level: ThreatLevel::Critical,
                distance_m: 0.0,
                direction: None,
                location: Some(alert.location),
                entity_id: Some(alert.alert_id.clone()),
                created_at: Utc::now(),
                expires_at: Utc::now() + ttl,
                acknowledged: false,
            };
            self.push_warning(&officer_id, warning);
        }
    }

    // ------------------------------------------------------------------
    // Check-ins and falls
    // ------------------------------------------------------------------

    /// Record a check-in; emergency check-ins also yield a critical
    /// warning on the officer.
    pub fn check_in(
        &mut self,
        officer_id: &str,
        kind: CheckInType,
        location: Option<GeoPoint>,
        notes: Option<String>,
    ) -> CheckIn {
        let record = self.checkins.check_in(officer_id, kind, location, notes);
        {
            let status = self.status_entry(officer_id);
            status.last_check_in = Some(record.created_at);
            if let Some(loc) = location {
                status.last_location = Some(loc);
            }
            status.updated_at = Utc::now();
        }

        if kind == CheckInType::Emergency {
            let ttl = Duration::minutes(self.config.warning_ttl_minutes);
            let warning = ProximityWarning {
                warning_id: Uuid::new_v4().to_string(),
                warning_type: WarningType::OfficerDown,
                title: "EMERGENCY CHECK-IN".into(),
                description: format!("Officer {officer_id} sent an emergency check-in"),
                threat_level: ThreatLevel::Critical,
                distance_m: 0.0,
                direction: None,
                location,
                entity_id: None,
                created_at: Utc::now(),
                expires_at: Utc::now() + ttl,
                acknowledged: false,
            };
            self.push_warning(officer_id, warning);
        } else {
            self.recompute_status(officer_id);
        }
        record
    }

    /// Overdue sweep for the supervisor list.
    pub fn overdue_officers(&self, now: DateTime<Utc>) -> Vec<(String, Option<DateTime<Utc>>)> {
        self.checkins.overdue(now)
    }

    /// Device-reported possible fall.
    pub fn report_possible_fall(
        &mut self,
        officer_id: &str,
        location: Option<GeoPoint>,
        accelerometer: BTreeMap<String, f64>,
    ) -> FallEvent {
        let event = self.falls.report_possible_fall(officer_id, location, accelerometer);
        let status = self.status_entry(officer_id);
        status.fall_detection_state = event.state;
        status.updated_at = Utc::now();
        event
    }

    /// Acknowledge (or false-alarm) a fall event.
    pub fn acknowledge_fall(
        &mut self,
        officer_id: &str,
        acknowledged_by: &str,
        false_alarm_reason: Option<String>,
    ) -> Option<FallEvent> {
        let event = self.falls.acknowledge(officer_id, acknowledged_by, false_alarm_reason)?;
        let status = self.status_entry(officer_id);
        status.fall_detection_state = event.state;
        status.updated_at = Utc::now();
        Some(event)
    }

    /// Fall timeout sweep. Newly-confirmed falls get a critical warning;
    /// the caller notifies supervisors and may trigger dispatch.
    pub fn sweep_falls(&mut self, now: DateTime<Utc>) -> Vec<FallEvent> {
        let confirmed = self.falls.sweep(now);
        let ttl = Duration::minutes(self.config.warning_ttl_minutes);
        for event in &confirmed {
            {
                let status = self.status_entry(&event.officer_id);
                status.fall_detection_state = FallDetectionState::ConfirmedFall;
            }
            let warning = ProximityWarning {
                warning_id: Uuid::new_v4().to_string(),
                warning_type: WarningType::FallDetected,
                title: "FALL CONFIRMED".into(),
                description: format!(
                    "Officer {} possible fall unacknowledged past timeout",
                    event.officer_id
                ),
                threat_level: ThreatLevel::Critical,
                distance_m: 0.0,
                direction: None,
                location: event.location,
                entity_id: Some(event.event_id.clone()),
                created_at: Utc::now(),
                expires_at: Utc::now() + ttl,
                acknowledged: false,
            };
            warn!(officer_id = %event.officer_id, "Fall confirmed - critical warning issued");
            self.push_warning(&event.officer_id, warning);
        }
        confirmed
    }

    // ------------------------------------------------------------------
    // Status aggregation
    // ------------------------------------------------------------------

    /// Threat level = max of active warnings; threat score saturates at 1.
    fn recompute_status(&mut self, officer_id: &str) {
        let now = Utc::now();
        let active: Vec<(WarningType, ThreatLevel)> = self
            .warnings
            .get(officer_id)
            .map(|ws| {
                ws.iter()
                    .filter(|w| !w.acknowledged && w.expires_at > now)
                    .map(|w| (w.warning_type, w.threat_level))
                    .collect()
            })
            .unwrap_or_default();

        let in_hotzone = self.hotzones.is_in_any_zone(officer_id);
        let hotzone_name = self
            .hotzones
            .zones_for_officer(officer_id)
            .first()
            .map(|z| z.name.clone());
        let fall_state = self.falls.state_for(officer_id);

        let status = self.status_entry(officer_id);
        status.active_warnings = active.iter().map(|(t, _)| t.to_string()).collect();
        status.nearby_threats = active
            .iter()
            .filter(|(_, lvl)| *lvl >= ThreatLevel::High)
            .count();
        status.threat_level = active
            .iter()
            .map(|(_, lvl)| *lvl)
            .max()
            .unwrap_or(ThreatLevel::Low);
        status.threat_score = active
            .iter()
            .map(|(_, lvl)| lvl.score_weight())
            .fold(0.0_f64, |acc, w| acc + (1.0 - acc) * w)
            .clamp(0.0, 1.0);
        status.in_hotzone = in_hotzone;
        status.hotzone_name = hotzone_name;
        status.fall_detection_state = fall_state;
        status.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> OfficerSafetyEngine {
        OfficerSafetyEngine::new(SafetyConfig::default())
    }

    fn wanted_person_threat(lat: f64, lon: f64) -> Threat {
        Threat {
            threat_id: "t-1".into(),
            warning_type: WarningType::WantedPerson,
            title: "Wanted person nearby".into(),
            description: "Armed robbery suspect".into(),
            threat_level: ThreatLevel::High,
            location: GeoPoint::new(lat, lon),
        }
    }

    #[test]
    fn nearby_officer_gets_warning_with_direction() {
        let mut eng = engine();
        eng.set_on_duty("o1", true);
        eng.update_location("o1", GeoPoint::new(26.7000, -80.0500));

        let issued = eng.evaluate_threat(&wanted_person_threat(26.7020, -80.0500));
        assert_eq!(issued.len(), 1);
        let (officer, warning) = &issued[0];
        assert_eq!(officer, "o1");
        assert!(warning.distance_m < 500.0);
        assert_eq!(warning.direction.as_deref(), Some("N"));

        let status = eng.status("o1").unwrap();
        assert_eq!(status.threat_level, ThreatLevel::High);
        assert!(status.threat_score > 0.0);
        assert_eq!(status.nearby_threats, 1);
    }

    #[test]
    fn distant_officer_gets_no_warning() {
        let mut eng = engine();
        eng.set_on_duty("o1", true);
        eng.update_location("o1", GeoPoint::new(26.80, -80.05));
        assert!(eng.evaluate_threat(&wanted_person_threat(26.70, -80.05)).is_empty());
    }

    #[test]
    fn acknowledgment_lowers_threat() {
        let mut eng = engine();
        eng.set_on_duty("o1", true);
        eng.update_location("o1", GeoPoint::new(26.7000, -80.0500));
        let issued = eng.evaluate_threat(&wanted_person_threat(26.7010, -80.0500));
        let warning_id = issued[0].1.warning_id.clone();

        assert!(eng.acknowledge_warning("o1", &warning_id));
        let status = eng.status("o1").unwrap();
        assert_eq!(status.threat_level, ThreatLevel::Low);
        assert!(status.active_warnings.is_empty());
    }

    #[test]
    fn threat_level_is_max_of_active_warnings() {
        let mut eng = engine();
        eng.set_on_duty("o1", true);
        eng.update_location("o1", GeoPoint::new(26.7000, -80.0500));

        let mut moderate = wanted_person_threat(26.7010, -80.0500);
        moderate.threat_level = ThreatLevel::Moderate;
        moderate.threat_id = "t-mod".into();
        eng.evaluate_threat(&moderate);

        let critical = Threat {
            threat_id: "t-crit".into(),
            warning_type: WarningType::Gunfire,
            title: "Gunfire cluster".into(),
            description: "Multiple rounds".into(),
            threat_level: ThreatLevel::Critical,
            location: GeoPoint::new(26.7005, -80.0500),
        };
        eng.evaluate_threat(&critical);

        let status = eng.status("o1").unwrap();
        assert_eq!(status.threat_level, ThreatLevel::Critical);
        assert_eq!(status.active_warnings.len(), 2);
    }

    #[test]
    fn emergency_checkin_raises_critical() {
        let mut eng = engine();
        eng.set_on_duty("o1", true);
        eng.check_in("o1", CheckInType::Emergency, Some(GeoPoint::new(26.7, -80.05)), None);
        let status = eng.status("o1").unwrap();
        assert_eq!(status.threat_level, ThreatLevel::Critical);
        assert!(status.last_check_in.is_some());
    }

    #[test]
    fn hotzone_entry_exit_updates_status() {
        let mut eng = engine();
        eng.set_on_duty("o1", true);
        eng.hotzones.upsert_zone(Hotzone {
            zone_id: "z1".into(),
            name: "North End".into(),
            zone_type: "high_crime".into(),
            threat_level: ThreatLevel::Elevated,
            risk_score: 0.7,
            polygon: vec![
                GeoPoint::new(26.70, -80.06),
                GeoPoint::new(26.70, -80.04),
                GeoPoint::new(26.72, -80.04),
                GeoPoint::new(26.72, -80.06),
            ],
            recent_incidents: 2,
            recent_gunfire: 0,
            hazards: vec![],
            recommendations: vec![],
        });

        let warnings = eng.update_location("o1", GeoPoint::new(26.71, -80.05));
        assert_eq!(warnings.len(), 1);
        let status = eng.status("o1").unwrap();
        assert!(status.in_hotzone);
        assert_eq!(status.hotzone_name.as_deref(), Some("North End"));

        eng.update_location("o1", GeoPoint::new(26.80, -80.05));
        let status = eng.status("o1").unwrap();
        assert!(!status.in_hotzone);
        assert!(status.active_warnings.is_empty());
    }

    #[test]
    fn fall_sweep_confirms_and_warns() {
        let mut eng = engine();
        eng.set_on_duty("o1", true);
        eng.report_possible_fall("o1", Some(GeoPoint::new(26.7, -80.05)), BTreeMap::new());

        let confirmed = eng.sweep_falls(Utc::now() + Duration::seconds(121));
        assert_eq!(confirmed.len(), 1);
        let status = eng.status("o1").unwrap();
        assert_eq!(status.fall_detection_state, FallDetectionState::ConfirmedFall);
        assert_eq!(status.threat_level, ThreatLevel::Critical);
    }
}
