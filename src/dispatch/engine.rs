//! Auto-Dispatch Engine - trigger evaluation and actuator assignment
//!
//! Converts trigger events into actuator missions subject to per-trigger
//! rules. Evaluation score is the mean of (priority tier score, normalized
//! threat level, rule-enabled flag); below 0.5 the request cancels with an
//! audit note. Rules may require operator approval; otherwise an actuator
//! satisfying capabilities and battery within the response radius is
//! assigned, ranked by ETA. Critical triggers (officer distress, ambush,
//! active shooter) always take critical priority.

use chrono::Utc;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::types::{
    DispatchMetrics, DispatchPriority, DispatchRequest, DispatchRule, DispatchStatus,
    DispatchTrigger, GeoPoint, TriggerEvent,
};

use super::fleet::ActuatorRegistry;

/// Default per-trigger rules shipped with the engine.
pub fn default_rules() -> Vec<DispatchRule> {
    fn rule(
        id: &str,
        trigger: DispatchTrigger,
        min_priority: DispatchPriority,
        caps: &[&str],
    ) -> DispatchRule {
        DispatchRule {
            rule_id: id.to_string(),
            trigger,
            enabled: true,
            min_priority,
            auto_dispatch: true,
            require_approval: false,
            response_radius_km: 5.0,
            required_capabilities: caps.iter().map(ToString::to_string).collect(),
            altitude_m: 30.0,
            orbit_on_arrival: true,
            orbit_radius_m: 50.0,
            follow_target: false,
            notify_dispatch: true,
            notify_tactical: false,
        }
    }

    let mut rules = vec![
        {
            let mut r = rule(
                "rule-shotspotter",
                DispatchTrigger::Shotspotter,
                DispatchPriority::High,
                &["hd_camera", "thermal_camera"],
            );
            r.notify_tactical = true;
            r
        },
        {
            let mut r = rule(
                "rule-officer-distress",
                DispatchTrigger::OfficerDistress,
                DispatchPriority::Critical,
                &["hd_camera", "spotlight"],
            );
            r.follow_target = true;
            r.notify_tactical = true;
            r
        },
        {
            let mut r = rule(
                "rule-ambush",
                DispatchTrigger::AmbushWarning,
                DispatchPriority::Critical,
                &["hd_camera", "thermal_camera", "spotlight"],
            );
            r.notify_tactical = true;
            r
        },
        {
            let mut r = rule(
                "rule-hot-vehicle",
                DispatchTrigger::HotVehicleLpr,
                DispatchPriority::High,
                &["hd_camera", "lpr_camera"],
            );
            r.follow_target = true;
            r.orbit_on_arrival = false;
            r
        },
        {
            let mut r = rule(
                "rule-missing-person",
                DispatchTrigger::MissingPerson,
                DispatchPriority::Normal,
                &["hd_camera", "thermal_camera"],
            );
            r.orbit_on_arrival = false;
            r
        },
        {
            let mut r = rule(
                "rule-pursuit",
                DispatchTrigger::Pursuit,
                DispatchPriority::Urgent,
                &["hd_camera", "zoom_30x"],
            );
            r.follow_target = true;
            r.notify_tactical = true;
            r.orbit_on_arrival = false;
            r
        },
        {
            let mut r = rule(
                "rule-active-shooter",
                DispatchTrigger::ActiveShooter,
                DispatchPriority::Critical,
                &["hd_camera", "thermal_camera", "speaker"],
            );
            r.notify_tactical = true;
            r
        },
        rule(
            "rule-crash",
            DispatchTrigger::CrashDetection,
            DispatchPriority::Normal,
            &["hd_camera"],
        ),
        rule(
            "rule-perimeter",
            DispatchTrigger::PerimeterBreach,
            DispatchPriority::High,
            &["hd_camera", "thermal_camera"],
        ),
        rule(
            "rule-manual",
            DispatchTrigger::ManualRequest,
            DispatchPriority::Normal,
            &["hd_camera"],
        ),
    ];

    // 911 keyword dispatches always go through an operator.
    let mut keyword = rule(
        "rule-911-keyword",
        DispatchTrigger::DangerousKeyword911,
        DispatchPriority::High,
        &[],
    );
    keyword.auto_dispatch = false;
    keyword.require_approval = true;
    rules.push(keyword);

    rules
}

/// What the engine decided for one trigger, surfaced to the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Actuator assigned; request is `dispatched`.
    Dispatched,
    /// Request parked awaiting operator approval.
    ApprovalRequired,
    /// Evaluation score below threshold or rule disabled.
    Cancelled,
    /// No actuator satisfied capabilities/battery/radius.
    NoActuatorAvailable,
}

/// Auto-dispatch engine.
pub struct AutoDispatchEngine {
    config: DispatchConfig,
    rules: HashMap<DispatchTrigger, DispatchRule>,
    active: HashMap<String, DispatchRequest>,
    history: VecDeque<DispatchRequest>,
    metrics: DispatchMetrics,
    response_times_ms: Vec<u64>,
}

const HISTORY_SIZE: usize = 10_000;

impl AutoDispatchEngine {
    pub fn new(config: DispatchConfig) -> Self {
        let rules = default_rules()
            .into_iter()
            .map(|r| (r.trigger, r))
            .collect();
        Self {
            config,
            rules,
            active: HashMap::new(),
            history: VecDeque::with_capacity(HISTORY_SIZE),
            metrics: DispatchMetrics::default(),
            response_times_ms: Vec::new(),
        }
    }

    /// Process a trigger event end to end against the fleet.
    pub fn process_trigger(
        &mut self,
        mut event: TriggerEvent,
        registry: &ActuatorRegistry,
    ) -> (DispatchRequest, DispatchOutcome) {
        if event.trigger.is_always_critical() {
            event.priority = DispatchPriority::Critical;
        }

        let mut request = DispatchRequest {
            request_id: format!("dispatch-{}", short_id()),
            trigger_event: event,
            status: DispatchStatus::Evaluating,
            created_at: Utc::now(),
            decided_at: None,
            completed_at: None,
            assigned_actuator_id: None,
            assigned_mission_id: None,
            eta_seconds: None,
            response_time_ms: None,
            evaluation_score: 0.0,
            evaluation_factors: BTreeMap::new(),
            operator_override: false,
            operator_id: None,
            notes: Vec::new(),
        };
        self.metrics.total_requests += 1;

        let Some(rule) = self
            .rules
            .get(&request.trigger_event.trigger)
            .filter(|r| r.enabled)
            .cloned()
        else {
            request.status = DispatchStatus::Cancelled;
            request.completed_at = Some(Utc::now());
            request.notes.push("No active rule for trigger type".into());
            info!(request_id = %request.request_id, trigger = %request.trigger_event.trigger, "Dispatch cancelled: no rule");
            self.finish(request.clone());
            return (request, DispatchOutcome::Cancelled);
        };

        let (score, factors) = Self::evaluate(&request.trigger_event, &rule);
        request.evaluation_score = score;
        request.evaluation_factors = factors;

        if score < 0.5 {
            request.status = DispatchStatus::Cancelled;
            request.completed_at = Some(Utc::now());
            request
                .notes
                .push(format!("Evaluation score too low: {score:.2}"));
            info!(request_id = %request.request_id, score, "Dispatch cancelled: low score");
            self.finish(request.clone());
            return (request, DispatchOutcome::Cancelled);
        }

        let needs_approval = (rule.require_approval || self.config.require_operator_approval)
            && !request.operator_override;
        if needs_approval {
            request.status = DispatchStatus::Pending;
            request.notes.push("Awaiting operator approval".into());
            info!(request_id = %request.request_id, "Dispatch pending operator approval");
            self.active.insert(request.request_id.clone(), request.clone());
            return (request, DispatchOutcome::ApprovalRequired);
        }

        if !rule.auto_dispatch {
            request.status = DispatchStatus::Pending;
            request.notes.push("Auto-dispatch disabled by rule".into());
            self.active.insert(request.request_id.clone(), request.clone());
            return (request, DispatchOutcome::ApprovalRequired);
        }

        let outcome = self.assign_actuator(&mut request, &rule, registry);
        self.active.insert(request.request_id.clone(), request.clone());
        self.update_metrics();
        (request, outcome)
    }

    /// Evaluation score: mean of priority tier, normalized threat, rule flag.
    fn evaluate(
        event: &TriggerEvent,
        rule: &DispatchRule,
    ) -> (f64, BTreeMap<String, f64>) {
        let mut factors = BTreeMap::new();
        factors.insert("priority".to_string(), event.priority.score());
        factors.insert(
            "threat_level".to_string(),
            event
                .threat_level
                .map_or(0.5, |t| (f64::from(t) / 10.0).min(1.0)),
        );
        factors.insert(
            "rule_enabled".to_string(),
            if rule.enabled { 1.0 } else { 0.0 },
        );

        let score = factors.values().sum::<f64>() / factors.len() as f64;
        (score, factors)
    }

    fn assign_actuator(
        &mut self,
        request: &mut DispatchRequest,
        rule: &DispatchRule,
        registry: &ActuatorRegistry,
    ) -> DispatchOutcome {
        request.status = DispatchStatus::Dispatching;

        let candidates = registry.select(
            request.trigger_event.location,
            &rule.required_capabilities,
            self.config.min_battery_percent,
            rule.response_radius_km,
        );

        let Some(best) = candidates.first() else {
            request.status = DispatchStatus::NoActuatorAvailable;
            request
                .notes
                .push("No actuator satisfied capabilities and battery".into());
            warn!(
                request_id = %request.request_id,
                trigger = %request.trigger_event.trigger,
                "No actuator available - retained for manual assignment"
            );
            self.metrics.failed_count += 1;
            return DispatchOutcome::NoActuatorAvailable;
        };

        let now = Utc::now();
        request.assigned_actuator_id = Some(best.actuator_id.clone());
        request.assigned_mission_id = Some(format!("mission-{}", short_id()));
        request.eta_seconds = Some(best.eta_seconds);
        request.decided_at = Some(now);
        request.status = DispatchStatus::Dispatched;
        let response_ms = (now - request.created_at).num_milliseconds().max(0) as u64;
        request.response_time_ms = Some(response_ms);
        request
            .notes
            .push(format!("Dispatched actuator {}", best.actuator_id));

        info!(
            request_id = %request.request_id,
            actuator_id = %best.actuator_id,
            eta_seconds = best.eta_seconds,
            response_ms,
            "Dispatch assigned"
        );
        self.metrics.dispatched_count += 1;
        self.response_times_ms.push(response_ms);
        DispatchOutcome::Dispatched
    }

    // ------------------------------------------------------------------
    // Source-specific intake
    // ------------------------------------------------------------------

    /// ShotSpotter activation: rounds escalate priority.
    pub fn trigger_from_shotspotter(
        &self,
        location: GeoPoint,
        confidence: f64,
        rounds_detected: u32,
        source_event_id: Option<String>,
    ) -> TriggerEvent {
        let priority = if rounds_detected >= 10 {
            DispatchPriority::Critical
        } else if rounds_detected >= 5 {
            DispatchPriority::Urgent
        } else {
            DispatchPriority::High
        };
        TriggerEvent {
            event_id: format!("evt-{}", short_id()),
            trigger: DispatchTrigger::Shotspotter,
            timestamp: Utc::now(),
            location,
            priority,
            source_system: "shotspotter".into(),
            source_event_id,
            description: format!("ShotSpotter: {rounds_detected} rounds detected"),
            keywords: Vec::new(),
            affected_units: Vec::new(),
            threat_level: Some(rounds_detected.min(10) as u8),
            radius_m: (confidence * 100.0).max(50.0),
        }
    }

    /// Officer distress is always critical.
    pub fn trigger_from_officer_distress(
        &self,
        officer_id: &str,
        location: GeoPoint,
        distress_kind: &str,
    ) -> TriggerEvent {
        TriggerEvent {
            event_id: format!("evt-{}", short_id()),
            trigger: DispatchTrigger::OfficerDistress,
            timestamp: Utc::now(),
            location,
            priority: DispatchPriority::Critical,
            source_system: "officer_safety".into(),
            source_event_id: None,
            description: format!("Officer distress: {distress_kind}"),
            keywords: Vec::new(),
            affected_units: vec![officer_id.to_string()],
            threat_level: Some(10),
            radius_m: 100.0,
        }
    }

    /// Hot-vehicle LPR hit; certain alert types escalate to critical.
    pub fn trigger_from_hot_vehicle(
        &self,
        plate: &str,
        location: GeoPoint,
        alert_type: &str,
        source_event_id: Option<String>,
    ) -> TriggerEvent {
        let priority = if matches!(alert_type, "stolen_armed" | "felony_vehicle" | "amber_alert")
        {
            DispatchPriority::Critical
        } else {
            DispatchPriority::High
        };
        TriggerEvent {
            event_id: format!("evt-{}", short_id()),
            trigger: DispatchTrigger::HotVehicleLpr,
            timestamp: Utc::now(),
            location,
            priority,
            source_system: "lpr".into(),
            source_event_id,
            description: format!("Hot vehicle: {plate} - {alert_type}"),
            keywords: vec![plate.to_string(), alert_type.to_string()],
            affected_units: Vec::new(),
            threat_level: None,
            radius_m: 100.0,
        }
    }

    /// Scan a 911 transcript for dangerous keywords.
    ///
    /// Returns `None` when no keyword matched; per rule the resulting
    /// trigger requires operator approval before any sortie.
    pub fn trigger_from_911_transcript(
        &self,
        call_id: &str,
        location: GeoPoint,
        transcript: &str,
    ) -> Option<TriggerEvent> {
        let lowered = transcript.to_lowercase();
        let detected: Vec<String> = self
            .config
            .dangerous_keywords
            .iter()
            .filter(|kw| lowered.contains(kw.to_lowercase().as_str()))
            .cloned()
            .collect();
        if detected.is_empty() {
            return None;
        }

        let priority = if self
            .config
            .critical_keywords
            .iter()
            .any(|kw| lowered.contains(kw.to_lowercase().as_str()))
        {
            DispatchPriority::Critical
        } else {
            DispatchPriority::High
        };

        debug!(call_id, keywords = ?detected, "Dangerous 911 keywords detected");
        Some(TriggerEvent {
            event_id: format!("evt-{}", short_id()),
            trigger: DispatchTrigger::DangerousKeyword911,
            timestamp: Utc::now(),
            location,
            priority,
            source_system: "cad".into(),
            source_event_id: Some(call_id.to_string()),
            description: format!("911 call with keywords: {}", detected.join(", ")),
            keywords: detected,
            affected_units: Vec::new(),
            threat_level: None,
            radius_m: 100.0,
        })
    }

    /// Missing-person search over a wider radius.
    pub fn trigger_from_missing_person(
        &self,
        case_id: &str,
        last_known: GeoPoint,
        description: &str,
        search_radius_km: f64,
    ) -> TriggerEvent {
        TriggerEvent {
            event_id: format!("evt-{}", short_id()),
            trigger: DispatchTrigger::MissingPerson,
            timestamp: Utc::now(),
            location: last_known,
            priority: DispatchPriority::Normal,
            source_system: "investigations".into(),
            source_event_id: Some(case_id.to_string()),
            description: format!(
                "Missing person search: {}",
                description.chars().take(100).collect::<String>()
            ),
            keywords: Vec::new(),
            affected_units: Vec::new(),
            threat_level: None,
            radius_m: search_radius_km * 1000.0,
        }
    }

    /// Vehicle pursuit.
    pub fn trigger_from_pursuit(
        &self,
        pursuit_id: &str,
        location: GeoPoint,
        vehicle_description: &str,
        pursuing_units: Vec<String>,
    ) -> TriggerEvent {
        TriggerEvent {
            event_id: format!("evt-{}", short_id()),
            trigger: DispatchTrigger::Pursuit,
            timestamp: Utc::now(),
            location,
            priority: DispatchPriority::Urgent,
            source_system: "cad".into(),
            source_event_id: Some(pursuit_id.to_string()),
            description: format!("Vehicle pursuit: {vehicle_description}"),
            keywords: Vec::new(),
            affected_units: pursuing_units,
            threat_level: None,
            radius_m: 200.0,
        }
    }

    // ------------------------------------------------------------------
    // Operator actions
    // ------------------------------------------------------------------

    /// Approve a pending request and assign an actuator.
    pub fn approve(
        &mut self,
        request_id: &str,
        operator_id: &str,
        registry: &ActuatorRegistry,
    ) -> Option<(DispatchRequest, DispatchOutcome)> {
        let mut request = self.active.get(request_id).cloned()?;
        if request.status != DispatchStatus::Pending {
            return None;
        }
        request.operator_override = true;
        request.operator_id = Some(operator_id.to_string());
        request
            .notes
            .push(format!("Approved by operator {operator_id}"));

        let rule = self.rules.get(&request.trigger_event.trigger).cloned()?;
        let outcome = self.assign_actuator(&mut request, &rule, registry);
        self.active.insert(request.request_id.clone(), request.clone());
        self.update_metrics();
        Some((request, outcome))
    }

    /// Cancel an active request with a reason.
    pub fn cancel(&mut self, request_id: &str, operator_id: &str, reason: &str) -> bool {
        let Some(mut request) = self.active.remove(request_id) else {
            return false;
        };
        request.status = DispatchStatus::Cancelled;
        request.operator_id = Some(operator_id.to_string());
        request.completed_at = Some(Utc::now());
        request
            .notes
            .push(format!("Cancelled by {operator_id}: {reason}"));
        self.finish(request);
        true
    }

    /// Mark a dispatched request's field progression (en-route, on-scene, done).
    pub fn advance(&mut self, request_id: &str, status: DispatchStatus) -> bool {
        let Some(request) = self.active.get_mut(request_id) else {
            return false;
        };
        let allowed = matches!(
            (request.status, status),
            (DispatchStatus::Dispatched, DispatchStatus::EnRoute)
                | (DispatchStatus::EnRoute, DispatchStatus::OnScene)
                | (DispatchStatus::OnScene, DispatchStatus::Completed)
                | (DispatchStatus::Dispatched, DispatchStatus::Failed)
                | (DispatchStatus::EnRoute, DispatchStatus::Failed)
                | (DispatchStatus::OnScene, DispatchStatus::Failed)
        );
        if !allowed {
            return false;
        }
        request.status = status;
        if status.is_terminal() {
            request.completed_at = Some(Utc::now());
            if let Some(finished) = self.active.remove(request_id) {
                self.finish(finished);
            }
        }
        true
    }

    /// Drop unassignable requests older than the retry window.
    pub fn expire_unassigned(&mut self, now: chrono::DateTime<Utc>) -> Vec<DispatchRequest> {
        let window = chrono::Duration::seconds(self.config.retry_window_secs);
        let expired_ids: Vec<String> = self
            .active
            .values()
            .filter(|r| r.status == DispatchStatus::NoActuatorAvailable)
            .filter(|r| now - r.created_at > window)
            .map(|r| r.request_id.clone())
            .collect();

        let mut expired = Vec::new();
        for id in expired_ids {
            if let Some(mut r) = self.active.remove(&id) {
                r.status = DispatchStatus::Failed;
                r.completed_at = Some(now);
                r.notes.push("Retry window elapsed with no actuator".into());
                expired.push(r.clone());
                self.finish(r);
            }
        }
        expired
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn get_request(&self, request_id: &str) -> Option<&DispatchRequest> {
        self.active
            .get(request_id)
            .or_else(|| self.history.iter().find(|r| r.request_id == request_id))
    }

    pub fn active_requests(&self) -> impl Iterator<Item = &DispatchRequest> {
        self.active.values()
    }

    pub fn pending_approvals(&self) -> Vec<&DispatchRequest> {
        self.active
            .values()
            .filter(|r| r.status == DispatchStatus::Pending)
            .collect()
    }

    pub fn rule(&self, trigger: DispatchTrigger) -> Option<&DispatchRule> {
        self.rules.get(&trigger)
    }

    pub fn update_rule(&mut self, rule: DispatchRule) {
        self.rules.insert(rule.trigger, rule);
    }

    pub fn metrics(&self) -> &DispatchMetrics {
        &self.metrics
    }

    fn finish(&mut self, request: DispatchRequest) {
        if self.history.len() >= HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(request);
        self.update_metrics();
    }

    fn update_metrics(&mut self) {
        let mut by_trigger = BTreeMap::new();
        let mut by_status = BTreeMap::new();
        for r in self.history.iter().chain(self.active.values()) {
            *by_trigger
                .entry(r.trigger_event.trigger.to_string())
                .or_insert(0) += 1;
            let status = format!("{:?}", r.status).to_lowercase();
            *by_status.entry(status).or_insert(0) += 1;
        }
        self.metrics.requests_by_trigger = by_trigger;
        self.metrics.requests_by_status = by_status;
        self.metrics.avg_response_time_ms = if self.response_times_ms.is_empty() {
            0.0
        } else {
            self.response_times_ms.iter().sum::<u64>() as f64
                / self.response_times_ms.len() as f64
        };
    }
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Actuator;

    fn registry_with_drone() -> ActuatorRegistry {
        let mut reg = ActuatorRegistry::new();
        reg.upsert(Actuator {
            actuator_id: "d1".into(),
            name: "Falcon 1".into(),
            capabilities: vec![
                "hd_camera".into(),
                "thermal_camera".into(),
                "spotlight".into(),
                "speaker".into(),
            ],
            battery_percent: 85.0,
            location: GeoPoint::new(26.705, -80.052),
            available: true,
            cruise_speed_mps: 18.0,
        });
        reg
    }

    fn engine() -> AutoDispatchEngine {
        AutoDispatchEngine::new(DispatchConfig::default())
    }

    #[test]
    fn shotspotter_dispatches_with_capable_drone() {
        let mut eng = engine();
        let reg = registry_with_drone();
        let trigger = eng.trigger_from_shotspotter(
            GeoPoint::new(26.7000, -80.0500),
            0.92,
            3,
            Some("ss-1".into()),
        );
        assert_eq!(trigger.priority, DispatchPriority::High);

        let (request, outcome) = eng.process_trigger(trigger, &reg);
        assert_eq!(outcome, DispatchOutcome::Dispatched);
        assert_eq!(request.status, DispatchStatus::Dispatched);
        assert_eq!(request.assigned_actuator_id.as_deref(), Some("d1"));
        assert!(request.response_time_ms.is_some());
        assert!(request.evaluation_score >= 0.5);
    }

    #[test]
    fn rounds_escalate_shotspotter_priority() {
        let eng = engine();
        let p = GeoPoint::new(26.7, -80.05);
        assert_eq!(
            eng.trigger_from_shotspotter(p, 0.9, 12, None).priority,
            DispatchPriority::Critical
        );
        assert_eq!(
            eng.trigger_from_shotspotter(p, 0.9, 6, None).priority,
            DispatchPriority::Urgent
        );
    }

    #[test]
    fn critical_trigger_never_downgrades() {
        let mut eng = engine();
        let reg = registry_with_drone();
        let mut trigger =
            eng.trigger_from_officer_distress("o1", GeoPoint::new(26.70, -80.05), "panic_button");
        // Even if something upstream lowered it, the engine restores critical.
        trigger.priority = DispatchPriority::Low;
        let (request, _) = eng.process_trigger(trigger, &reg);
        assert_eq!(request.trigger_event.priority, DispatchPriority::Critical);
    }

    #[test]
    fn keyword_911_requires_approval_then_dispatches() {
        let mut eng = engine();
        let reg = registry_with_drone();
        let trigger = eng
            .trigger_from_911_transcript(
                "call-9",
                GeoPoint::new(26.70, -80.05),
                "caller reports a man with a gun near the park",
            )
            .expect("keyword should match");

        let (request, outcome) = eng.process_trigger(trigger, &reg);
        assert_eq!(outcome, DispatchOutcome::ApprovalRequired);
        assert_eq!(request.status, DispatchStatus::Pending);
        assert_eq!(eng.pending_approvals().len(), 1);

        let (approved, outcome) = eng.approve(&request.request_id, "op-2", &reg).unwrap();
        assert_eq!(outcome, DispatchOutcome::Dispatched);
        assert!(approved.operator_override);
    }

    #[test]
    fn clean_911_transcript_is_ignored() {
        let eng = engine();
        assert!(eng
            .trigger_from_911_transcript("call-1", GeoPoint::new(26.7, -80.05), "noise complaint")
            .is_none());
    }

    #[test]
    fn critical_keywords_escalate_911() {
        let eng = engine();
        let t = eng
            .trigger_from_911_transcript(
                "call-2",
                GeoPoint::new(26.7, -80.05),
                "active shooter at the mall",
            )
            .unwrap();
        assert_eq!(t.priority, DispatchPriority::Critical);
    }

    #[test]
    fn empty_fleet_yields_no_actuator_available() {
        let mut eng = engine();
        let reg = ActuatorRegistry::new();
        let trigger = eng.trigger_from_shotspotter(GeoPoint::new(26.7, -80.05), 0.9, 3, None);
        let (request, outcome) = eng.process_trigger(trigger, &reg);
        assert_eq!(outcome, DispatchOutcome::NoActuatorAvailable);
        assert_eq!(request.status, DispatchStatus::NoActuatorAvailable);
        // Retained for manual assignment.
        assert!(eng.get_request(&request.request_id).is_some());
    }

    #[test]
    fn unassigned_requests_expire_after_retry_window() {
        let mut eng = engine();
        let reg = ActuatorRegistry::new();
        let trigger = eng.trigger_from_shotspotter(GeoPoint::new(26.7, -80.05), 0.9, 3, None);
        let (request, _) = eng.process_trigger(trigger, &reg);

        let later = Utc::now() + chrono::Duration::seconds(1000);
        let expired = eng.expire_unassigned(later);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].request_id, request.request_id);
        assert_eq!(expired[0].status, DispatchStatus::Failed);
    }

    #[test]
    fn lifecycle_advances_in_order_only() {
        let mut eng = engine();
        let reg = registry_with_drone();
        let trigger = eng.trigger_from_shotspotter(GeoPoint::new(26.7, -80.05), 0.9, 3, None);
        let (request, _) = eng.process_trigger(trigger, &reg);
        let id = request.request_id;

        assert!(!eng.advance(&id, DispatchStatus::OnScene)); // skipping en_route
        assert!(eng.advance(&id, DispatchStatus::EnRoute));
        assert!(eng.advance(&id, DispatchStatus::OnScene));
        assert!(eng.advance(&id, DispatchStatus::Completed));
        // Terminal: no longer active.
        assert!(eng.pending_approvals().is_empty());
        assert_eq!(
            eng.get_request(&id).unwrap().status,
            DispatchStatus::Completed
        );
    }
}
