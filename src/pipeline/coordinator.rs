//! RTCC Coordinator - event flow across the six engines
//!
//! ```text
//! INGEST:    validate -> dedup -> hot store        (continuous)
//! ROUTE:     payload-specific side paths           (vitals, telemetry, 911)
//! FUSION:    correlation rules -> fused events     (per source)
//! SAFETY:    threats, ambush, hotzones             (per fused event / location)
//! GUARDRAIL: clearance for every sortie            (before dispatch)
//! DISPATCH:  trigger rules -> actuator assignment  (gated)
//! COMMANDS:  per-actuator lanes, preemption        (via worker router)
//! AUDIT:     every state change, hash-chained      (always)
//! ```
//!
//! The coordinator owns all engine state; callers reach it through one
//! owner task (or a lock at the adapter edge), and per-actuator command
//! execution is serialized by the aggregate worker router.

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, warn};

use crate::access::{CjisQueryLog, ZeroTrustGateway};
use crate::bus::{BusEvent, EventBus};
use crate::config::RtccConfig;
use crate::continuity::{
    AuditLog, DiagnosticsEngine, FailoverAction, FailoverManager, HealthCheckService,
    RedundancyManager,
};
use crate::dispatch::{
    ActuatorRegistry, AutoDispatchEngine, CommandEngine, DispatchOutcome,
};
use crate::fusion::{AnomalyDetector, EntityResolver, EventIngestor, FusionEngine, IngestError};
use crate::guardrail::GuardrailPipeline;
use crate::safety::{OfficerSafetyEngine, Threat};
use crate::types::{
    ActionContext, ActionKind, AuditAction, AuditSeverity, CommandParameters, CommandPriority,
    CommandType, DispatchRequest, EntityRecord, EntityType, EventPayload, FusedEvent, GeoPoint,
    GuardrailResult, RawEvent, ResolvedEntity, Severity, ThreatLevel, TriggerEvent, WarningType,
};

/// What one event produced as it moved through the pipeline.
#[derive(Debug, Default)]
pub struct ProcessOutcome {
    pub accepted: bool,
    pub duplicate: bool,
    pub fusions: Vec<FusedEvent>,
    pub dispatches: Vec<DispatchRequest>,
    pub warnings_issued: usize,
}

/// Counters for the status surface.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CoordinatorStats {
    pub events_processed: u64,
    pub fusions_created: u64,
    pub dispatches_requested: u64,
    pub dispatches_blocked_by_guardrail: u64,
    pub safety_warnings_issued: u64,
    pub anomalies_detected: u64,
}

/// The coordinator wiring every engine together.
pub struct RtccCoordinator {
    config: RtccConfig,
    pub ingestor: EventIngestor,
    pub resolver: EntityResolver,
    pub fusion: FusionEngine,
    pub anomaly: AnomalyDetector,
    pub dispatch: AutoDispatchEngine,
    pub commands: CommandEngine,
    pub fleet: ActuatorRegistry,
    pub safety: OfficerSafetyEngine,
    pub guardrail: GuardrailPipeline,
    pub gateway: ZeroTrustGateway,
    pub cjis: CjisQueryLog,
    pub health: HealthCheckService,
    pub failover: FailoverManager,
    pub redundancy: RedundancyManager,
    pub diagnostics: DiagnosticsEngine,
    pub audit: AuditLog,
    pub bus: EventBus,
    stats: CoordinatorStats,
    /// Rolling window of entity records extracted from payloads, resolved
    /// in batches by the sweep.
    entity_window: Vec<EntityRecord>,
    resolved_entities: Vec<ResolvedEntity>,
}

/// Entity records older than this many positions are dropped from the
/// resolution window.
const ENTITY_WINDOW_SIZE: usize = 1000;

impl RtccCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: RtccConfig,
        ingestor: EventIngestor,
        anomaly: AnomalyDetector,
        commands: CommandEngine,
        audit: AuditLog,
        bus: EventBus,
    ) -> Self {
        let resolver = EntityResolver::from_config(&config.fusion);
        let fusion = FusionEngine::new(config.fusion.clone());
        let dispatch = AutoDispatchEngine::new(config.dispatch.clone());
        let safety = OfficerSafetyEngine::new(config.safety.clone());
        let guardrail = GuardrailPipeline::new(config.guardrail.clone());
        let gateway = ZeroTrustGateway::new(config.access.clone());
        let cjis = CjisQueryLog::new(config.access.query_rate_burst_threshold);
        let health = HealthCheckService::new(config.continuity.clone());
        let failover = FailoverManager::new(config.continuity.clone());
        let redundancy = RedundancyManager::new();
        let diagnostics = DiagnosticsEngine::new(config.continuity.clone());
        Self {
            config,
            ingestor,
            resolver,
            fusion,
            anomaly,
            dispatch,
            commands,
            fleet: ActuatorRegistry::new(),
            safety,
            guardrail,
            gateway,
            cjis,
            health,
            failover,
            redundancy,
            diagnostics,
            audit,
            bus,
            stats: CoordinatorStats::default(),
            entity_window: Vec::new(),
            resolved_entities: Vec::new(),
        }
    }

    pub fn stats(&self) -> &CoordinatorStats {
        &self.stats
    }

    fn audit_log(
        &mut self,
        action: AuditAction,
        severity: AuditSeverity,
        source: &str,
        description: &str,
    ) {
        // Audit lockout surfaces through verify; a refused append here
        // must not take the pipeline down with it.
        if let Err(e) = self.audit.log(action, severity, source, description) {
            warn!(error = %e, "audit append refused");
        }
    }

    /// Accept an event that passed ingest and run the downstream engines.
    ///
    /// Split from [`Self::ingest_and_process`] so adapters that already
    /// persisted the event can drive correlation directly.
    pub async fn run_pipeline(&mut self, event: RawEvent) -> ProcessOutcome {
        let mut outcome = ProcessOutcome {
            accepted: true,
            ..ProcessOutcome::default()
        };
        self.stats.events_processed += 1;

        self.audit_log(
            AuditAction::EventIngested,
            AuditSeverity::Info,
            "ingest",
            &format!("{} event {} accepted", event.source, event.event_id),
        );
        self.bus.publish(BusEvent::RawAccepted(event.clone()));

        self.route_payload(&event, &mut outcome).await;

        // Correlation pass.
        let fusions = self.fusion.add_source(event.clone());
        for fusion in fusions {
            let is_new = fusion.created_at == fusion.updated_at;
            if is_new {
                self.stats.fusions_created += 1;
                self.audit_log(
                    AuditAction::FusionCreated,
                    AuditSeverity::Info,
                    "fusion",
                    &format!(
                        "fusion {} ({}) confidence {:.2}",
                        fusion.fusion_id, fusion.event_type, fusion.confidence_score
                    ),
                );
                self.bus.publish(BusEvent::FusionCreated(fusion.clone()));
            } else {
                self.audit_log(
                    AuditAction::FusionUpdated,
                    AuditSeverity::Info,
                    "fusion",
                    &format!("fusion {} extended", fusion.fusion_id),
                );
                self.bus.publish(BusEvent::FusionUpdated(fusion.clone()));
            }

            self.react_to_fusion(&fusion, &mut outcome).await;
            outcome.fusions.push(fusion);
        }

        outcome
    }

    /// Full path: ingest then pipeline.
    pub async fn ingest_and_process(&mut self, event: RawEvent) -> ProcessOutcome {
        match self.ingestor.ingest(event.clone()).await {
            Ok(crate::fusion::IngestOutcome::Accepted) => self.run_pipeline(event).await,
            Ok(crate::fusion::IngestOutcome::Duplicate) => ProcessOutcome {
                duplicate: true,
                ..ProcessOutcome::default()
            },
            Err(IngestError::DeadLettered(reason)) => {
                self.audit_log(
                    AuditAction::EventDeadLettered,
                    AuditSeverity::Error,
                    "ingest",
                    &format!("event parked in dead-letter queue: {reason}"),
                );
                self.bus.publish(BusEvent::OperatorNotification {
                    channel: "ops".into(),
                    message: format!("ingest dead-letter: {reason}"),
                });
                ProcessOutcome::default()
            }
            Err(e) => {
                self.audit_log(
                    AuditAction::EventRejected,
                    AuditSeverity::Warning,
                    "ingest",
                    &format!("malformed event dropped: {e}"),
                );
                ProcessOutcome::default()
            }
        }
    }

    /// Track an entity record for the next resolution pass.
    fn track_entity(&mut self, record: EntityRecord) {
        if self.entity_window.len() >= ENTITY_WINDOW_SIZE {
            self.entity_window.remove(0);
        }
        self.entity_window.push(record);
    }

    /// Run one entity-resolution pass over the tracked window.
    pub fn resolve_entities(&mut self) -> &[ResolvedEntity] {
        if self.entity_window.len() >= 2 {
            let resolved = self.resolver.resolve(&self.entity_window);
            let merges: usize = resolved.iter().map(|e| e.merge_candidates.len()).sum();
            self.audit_log(
                AuditAction::EntityResolutionCompleted,
                AuditSeverity::Info,
                "resolution",
                &format!(
                    "{} records -> {} clusters ({} merge candidates)",
                    self.entity_window.len(),
                    resolved.len(),
                    merges
                ),
            );
            self.resolved_entities = resolved;
        }
        &self.resolved_entities
    }

    pub fn resolved_entities(&self) -> &[ResolvedEntity] {
        &self.resolved_entities
    }

    /// Payload-specific side paths that do not wait for fusion.
    async fn route_payload(&mut self, event: &RawEvent, outcome: &mut ProcessOutcome) {
        match &event.payload {
            EventPayload::OfficerVitals {
                officer_id,
                possible_fall,
                accelerometer,
                ..
            } => {
                if *possible_fall {
                    self.safety.report_possible_fall(
                        officer_id,
                        event.location,
                        accelerometer.clone(),
                    );
                }
            }
            EventPayload::CrowdDensity {
                zone_id,
                estimated_count,
                ..
            } => {
                if let Some(result) =
                    self.anomaly
                        .observe(zone_id, event.event_time, f64::from(*estimated_count))
                {
                    self.stats.anomalies_detected += 1;
                    self.audit_log(
                        AuditAction::AnomalyDetected,
                        AuditSeverity::Warning,
                        "anomaly",
                        &format!(
                            "zone {} count {:.0} exceeds baseline (z={:.1})",
                            result.zone_id, result.observed, result.z_score
                        ),
                    );
                }
            }
            EventPayload::DroneTelemetry {
                actuator_id,
                battery_percent,
                ..
            } => {
                if let Some(loc) = event.location {
                    self.fleet.update_telemetry(actuator_id, *battery_percent, loc);
                }
            }
            EventPayload::PlateRead {
                plate,
                plate_state,
                alert_type,
                vehicle_description,
                ..
            } => {
                let mut record =
                    EntityRecord::new(format!("veh-{}", event.event_id), EntityType::Vehicle)
                        .with_attr("plate_number", plate);
                if let Some(state) = plate_state {
                    record = record.with_attr("plate_state", state);
                }
                if let Some(desc) = vehicle_description {
                    record = record.with_attr("description", desc);
                }
                self.track_entity(record);

                // Hot-vehicle hits dispatch directly, without waiting for
                // a correlation window.
                if let (Some(alert_type), Some(location)) = (alert_type, event.location) {
                    let trigger = self.dispatch.trigger_from_hot_vehicle(
                        plate,
                        location,
                        alert_type,
                        Some(event.event_id.clone()),
                    );
                    self.gated_dispatch(trigger, outcome).await;
                }
            }
            EventPayload::CadIncident { call_id, call_type, .. } => {
                self.track_entity(
                    EntityRecord::new(format!("inc-{}", event.event_id), EntityType::Incident)
                        .with_attr("case_number", call_id)
                        .with_attr("incident_type", call_type)
                        .with_attr("timestamp", &event.event_time.to_rfc3339()),
                );
                if let Some(location) = event.location {
                    let nearby: Vec<String> = self
                        .safety
                        .on_duty_officers()
                        .iter()
                        .filter(|s| {
                            s.last_location.is_some_and(|l| {
                                crate::geo::distance_m(l, location)
                                    <= self.config.safety.ambush_distance_window_m * 2.0
                            })
                        })
                        .map(|s| s.officer_id.clone())
                        .collect();
                    if let Some(alert) = self.safety.ambush.observe_call(
                        call_id,
                        location,
                        event.event_time,
                        &nearby,
                    ) {
                        self.audit_log(
                            AuditAction::AmbushAlertRaised,
                            AuditSeverity::Critical,
                            "safety",
                            &format!(
                                "ambush alert {} covering {} officers",
                                alert.alert_id,
                                alert.affected_officers.len()
                            ),
                        );
                        self.safety.apply_ambush_alert(&alert);
                        self.bus.publish(BusEvent::AmbushAlert(alert.clone()));
                        let trigger = self.dispatch_trigger_for_ambush(&alert.location);
                        self.gated_dispatch(trigger, outcome).await;
                    }
                }
            }
            EventPayload::CallTranscript {
                call_id,
                transcript,
                ..
            } => {
                if let Some(location) = event.location {
                    if let Some(trigger) =
                        self.dispatch
                            .trigger_from_911_transcript(call_id, location, transcript)
                    {
                        self.gated_dispatch(trigger, outcome).await;
                    }
                }
            }
            _ => {}
        }
    }

    fn dispatch_trigger_for_ambush(&self, location: &GeoPoint) -> TriggerEvent {
        TriggerEvent {
            event_id: format!("evt-{}", uuid::Uuid::new_v4().simple()),
            trigger: crate::types::DispatchTrigger::AmbushWarning,
            timestamp: Utc::now(),
            location: *location,
            priority: crate::types::DispatchPriority::Critical,
            source_system: "officer_safety".into(),
            source_event_id: None,
            description: "Ambush indicators clustered near officers".into(),
            keywords: Vec::new(),
            affected_units: Vec::new(),
            threat_level: Some(10),
            radius_m: 200.0,
        }
    }

    /// React to a fused event: safety warnings and gated dispatch.
    async fn react_to_fusion(&mut self, fusion: &FusedEvent, outcome: &mut ProcessOutcome) {
        // Safety: high-severity fusions become proximity threats.
        if fusion.severity >= Severity::High {
            let warning_type = match fusion.event_type.as_str() {
                "gunshot_incident" => WarningType::Gunfire,
                "emergency_alert" => WarningType::OfficerDown,
                _ => WarningType::Hazard,
            };
            let threat = Threat {
                threat_id: fusion.fusion_id.clone(),
                warning_type,
                title: format!("Fused event: {}", fusion.event_type),
                description: fusion.description.clone(),
                threat_level: if fusion.severity == Severity::Critical {
                    ThreatLevel::Critical
                } else {
                    ThreatLevel::High
                },
                location: fusion.center,
            };
            let issued = self.safety.evaluate_threat(&threat);
            outcome.warnings_issued += issued.len();
            self.stats.safety_warnings_issued += issued.len() as u64;
            for (officer_id, warning) in issued {
                self.audit_log(
                    AuditAction::SafetyWarningIssued,
                    AuditSeverity::Warning,
                    "safety",
                    &format!(
                        "{} warning to officer {} ({:.0} m)",
                        warning.warning_type, officer_id, warning.distance_m
                    ),
                );
                self.bus.publish(BusEvent::SafetyWarning {
                    officer_id,
                    warning,
                });
            }
        }

        // Dispatch derivation by source composition.
        let trigger = match fusion.event_type.as_str() {
            "gunshot_incident" => {
                let rounds = fusion
                    .sources
                    .iter()
                    .find_map(|s| match &s.payload {
                        EventPayload::GunshotDetection {
                            rounds_detected, ..
                        } => Some(*rounds_detected),
                        _ => None,
                    })
                    .unwrap_or(1);
                let confidence = fusion.confidence_score;
                Some(self.dispatch.trigger_from_shotspotter(
                    fusion.center,
                    confidence,
                    rounds,
                    Some(fusion.fusion_id.clone()),
                ))
            }
            "emergency_alert" => {
                let officer = fusion.sources.iter().find_map(|s| match &s.payload {
                    EventPayload::PanicBeacon { officer_id, .. } => officer_id.clone(),
                    _ => None,
                });
                Some(self.dispatch.trigger_from_officer_distress(
                    officer.as_deref().unwrap_or("unknown"),
                    fusion.center,
                    "panic_beacon",
                ))
            }
            "vehicle_incident" => fusion.sources.iter().find_map(|s| match &s.payload {
                EventPayload::PlateRead {
                    plate,
                    alert_type: Some(alert_type),
                    ..
                } => Some(self.dispatch.trigger_from_hot_vehicle(
                    plate,
                    fusion.center,
                    alert_type,
                    Some(fusion.fusion_id.clone()),
                )),
                _ => None,
            }),
            _ => None,
        };

        if let Some(trigger) = trigger {
            self.gated_dispatch(trigger, outcome).await;
        }
    }

    /// Guardrail clearance, then dispatch, then first commands.
    async fn gated_dispatch(&mut self, trigger: TriggerEvent, outcome: &mut ProcessOutcome) {
        let mut ctx = ActionContext::new(trigger.event_id.clone(), ActionKind::DroneSortie);
        // Sensor-corroborated triggers carry probable cause into the
        // clearance check; manual requests do not.
        ctx.probable_cause = trigger.trigger != crate::types::DispatchTrigger::ManualRequest;
        let (decision, _approval) = self.guardrail.evaluate(&ctx);
        self.audit_log(
            AuditAction::GuardrailDecision,
            AuditSeverity::Info,
            "guardrail",
            &format!(
                "{:?} for sortie {} (risk {:.0})",
                decision.result, trigger.event_id, decision.risk_score
            ),
        );

        if decision.result == GuardrailResult::Denied {
            self.stats.dispatches_blocked_by_guardrail += 1;
            warn!(
                trigger = %trigger.trigger,
                reason = %decision.reason,
                "Sortie blocked by guardrail"
            );
            return;
        }
        // allowed_with_review proceeds only once its approval resolves;
        // the request parks in the dispatch engine's pending set.
        let operator_hold = decision.result == GuardrailResult::AllowedWithReview;

        self.bus.publish(BusEvent::DispatchTriggered(trigger.clone()));
        self.stats.dispatches_requested += 1;

        let (request, dispatch_outcome) = self.dispatch.process_trigger(trigger, &self.fleet);
        self.audit_log(
            AuditAction::DispatchEvaluated,
            AuditSeverity::Info,
            "dispatch",
            &format!(
                "request {} -> {:?} (score {:.2})",
                request.request_id, request.status, request.evaluation_score
            ),
        );

        match dispatch_outcome {
            DispatchOutcome::Dispatched if !operator_hold => {
                self.issue_initial_commands(&request).await;
            }
            DispatchOutcome::Dispatched => {
                self.audit_log(
                    AuditAction::DispatchApprovalRequired,
                    AuditSeverity::Warning,
                    "dispatch",
                    &format!("request {} held for guardrail review", request.request_id),
                );
            }
            DispatchOutcome::ApprovalRequired => {
                self.audit_log(
                    AuditAction::DispatchApprovalRequired,
                    AuditSeverity::Warning,
                    "dispatch",
                    &format!("request {} awaiting operator approval", request.request_id),
                );
                self.bus.publish(BusEvent::OperatorNotification {
                    channel: "dispatch".into(),
                    message: format!("approval required for {}", request.request_id),
                });
            }
            DispatchOutcome::NoActuatorAvailable => {
                self.bus.publish(BusEvent::OperatorNotification {
                    channel: "dispatch".into(),
                    message: format!(
                        "no actuator available for {} - manual assignment window open",
                        request.request_id
                    ),
                });
            }
            DispatchOutcome::Cancelled => {}
        }

        self.bus.publish(BusEvent::DispatchDecided(request.clone()));
        outcome.dispatches.push(request);
    }

    /// Takeoff + goto + orbit for a fresh assignment.
    async fn issue_initial_commands(&mut self, request: &DispatchRequest) {
        let Some(actuator_id) = request.assigned_actuator_id.as_deref() else {
            return;
        };
        let rule = self.dispatch.rule(request.trigger_event.trigger).cloned();
        let altitude = rule.as_ref().map_or(30.0, |r| r.altitude_m);
        let orbit = rule.as_ref().is_none_or(|r| r.orbit_on_arrival);

        let mission_id = request.assigned_mission_id.clone();
        let target = request.trigger_event.location;

        let takeoff = self.commands.build_command(
            actuator_id,
            CommandType::Takeoff,
            CommandPriority::High,
            CommandParameters {
                target_altitude_m: Some(altitude),
                ..CommandParameters::default()
            },
            None,
            mission_id.clone(),
        );
        let goto = self.commands.build_command(
            actuator_id,
            CommandType::Goto,
            CommandPriority::High,
            CommandParameters {
                target: Some(target),
                target_altitude_m: Some(altitude),
                speed_mps: Some(self.config.dispatch.max_speed_mps),
                ..CommandParameters::default()
            },
            None,
            mission_id.clone(),
        );

        for command in [takeoff, goto] {
            match self.commands.submit(command) {
                Ok(command_id) => {
                    self.audit_log(
                        AuditAction::CommandIssued,
                        AuditSeverity::Info,
                        "commands",
                        &format!("{command_id} queued for {actuator_id}"),
                    );
                }
                Err(e) => {
                    self.audit_log(
                        AuditAction::CommandFailed,
                        AuditSeverity::Error,
                        "commands",
                        &format!("command refused for {actuator_id}: {e}"),
                    );
                }
            }
        }

        if orbit {
            let orbit_cmd = self.commands.build_command(
                actuator_id,
                CommandType::Orbit,
                CommandPriority::Normal,
                CommandParameters {
                    target: Some(target),
                    target_altitude_m: Some(altitude),
                    orbit_radius_m: rule.map(|r| r.orbit_radius_m),
                    speed_mps: Some(5.0),
                    ..CommandParameters::default()
                },
                None,
                mission_id,
            );
            if let Ok(command_id) = self.commands.submit(orbit_cmd) {
                debug!(command_id = %command_id, actuator_id, "orbit queued");
            }
        }

        self.fleet.set_available(actuator_id, false);
    }

    /// Emergency stop: preempts the actuator's lane and audits.
    pub async fn emergency_stop(&mut self, actuator_id: &str, operator_id: &str) -> Option<String> {
        let command = self.commands.build_command(
            actuator_id,
            CommandType::EmergencyStop,
            CommandPriority::Emergency,
            CommandParameters::default(),
            Some(operator_id.to_string()),
            None,
        );
        match self.commands.submit(command) {
            Ok(command_id) => {
                self.audit_log(
                    AuditAction::CommandPreempted,
                    AuditSeverity::Critical,
                    "commands",
                    &format!("emergency stop {command_id} on {actuator_id} by {operator_id}"),
                );
                Some(command_id)
            }
            Err(e) => {
                warn!(actuator_id, error = %e, "emergency stop refused");
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Periodic sweeps
    // ------------------------------------------------------------------

    /// Run every periodic obligation against `now`.
    pub async fn run_sweeps(&mut self, now: DateTime<Utc>) {
        // Officer check-in discipline.
        for (officer_id, last) in self.safety.overdue_officers(now) {
            self.audit_log(
                AuditAction::CheckInOverdue,
                AuditSeverity::Warning,
                "safety",
                &format!(
                    "officer {} overdue (last check-in: {})",
                    officer_id,
                    last.map_or_else(|| "never".into(), |t| t.to_rfc3339())
                ),
            );
        }

        // Fall confirmation timeouts escalate to dispatch.
        let confirmed = self.safety.sweep_falls(now);
        for event in confirmed {
            self.audit_log(
                AuditAction::FallConfirmed,
                AuditSeverity::Critical,
                "safety",
                &format!("fall confirmed for officer {}", event.officer_id),
            );
            self.bus.publish(BusEvent::OperatorNotification {
                channel: "supervisor".into(),
                message: format!("confirmed fall: officer {}", event.officer_id),
            });
            if let Some(location) = event.location {
                let trigger = self.dispatch.trigger_from_officer_distress(
                    &event.officer_id,
                    location,
                    "confirmed_fall",
                );
                let mut scratch = ProcessOutcome::default();
                self.gated_dispatch(trigger, &mut scratch).await;
            }
        }

        // Entity resolution pass over the tracked window.
        self.resolve_entities();

        // Warning expiry, approval expiry, unassigned-dispatch expiry.
        self.safety.expire_warnings(now);
        self.guardrail.approvals.sweep(now);
        self.dispatch.expire_unassigned(now);
        self.fusion.expire_pending(now);

        // Session idle expiry per role.
        let gateway = &self.gateway;
        gateway
            .sessions
            .sweep_expired(now, |role| gateway.session_timeout_minutes(role));

        // Failover buffered-write deadlines.
        let discarded = self.failover.expire_buffered_writes(now);
        for (service, count) in discarded {
            self.audit_log(
                AuditAction::BufferedWriteDiscarded,
                AuditSeverity::Warning,
                "failover",
                &format!("{count} buffered writes for {service} expired"),
            );
        }

        // Predictive diagnostics.
        for alert in self.diagnostics.run_predictive_analysis(now) {
            self.audit_log(
                AuditAction::PredictiveAlert,
                AuditSeverity::Warning,
                "diagnostics",
                &format!("{}: {}", alert.source, alert.indicators.join("; ")),
            );
            self.bus.publish(BusEvent::Predictive(alert));
        }

        // Hot-store and audit retention.
        if let Err(e) = self.ingestor.enforce_retention(now) {
            warn!(error = %e, "retention sweep failed");
        }
        self.audit.enforce_retention(now);
    }

    /// Feed a probe result through health tracking and failover logic.
    pub fn observe_probe(
        &mut self,
        service_type: &str,
        target: &str,
        probe: Result<f64, String>,
        now: DateTime<Utc>,
    ) -> FailoverAction {
        let result = self.health.record(target, probe);
        self.audit_log(
            AuditAction::HealthCheckCompleted,
            AuditSeverity::Debug,
            "health",
            &format!("{target}: {} ({:.0} ms)", result.status, result.latency_ms),
        );

        let action = self
            .failover
            .observe_probe(service_type, target, result.status, now);
        match &action {
            FailoverAction::FailedOver(event) => {
                self.audit_log(
                    AuditAction::FailoverTriggered,
                    AuditSeverity::Warning,
                    "failover",
                    &format!(
                        "{}: {} -> {} ({})",
                        event.service_type, event.from_target, event.to_target, event.reason
                    ),
                );
                self.bus.publish(BusEvent::Failover(event.clone()));
            }
            FailoverAction::Recovered { event, replayed_writes, discarded_writes } => {
                self.audit_log(
                    AuditAction::RecoveryCompleted,
                    AuditSeverity::Info,
                    "failover",
                    &format!(
                        "{} recovered; replayed {} writes, discarded {}",
                        event.service_type,
                        replayed_writes.len(),
                        discarded_writes
                    ),
                );
                self.bus.publish(BusEvent::Failover(event.clone()));
            }
            FailoverAction::None => {}
        }
        action
    }

    /// Status document for the API surface.
    pub fn status(&self) -> serde_json::Value {
        json!({
            "deployment": self.config.deployment.name,
            "stats": self.stats,
            "ingest": self.ingestor.stats(),
            "fusion": self.fusion.metrics(),
            "dispatch": self.dispatch.metrics(),
            "commands": self.commands.metrics(),
            "audit_entries": self.audit.entries_logged(),
            "audit_read_only": self.audit.is_read_only(),
            "bus_subscribers": self.bus.subscriber_count(),
            "active_failovers": self.failover.active_failovers(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use crate::continuity::AuditLog;
    use crate::dispatch::SimulatedTransport;
    use crate::fusion::{AnomalyDetector, EventIngestor};
    use crate::storage::EventStore;
    use crate::types::{Actuator, EventSource};
    use std::sync::Arc;

    fn coordinator() -> RtccCoordinator {
        let config = RtccConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::open(dir.path().join("events")).unwrap();
        std::mem::forget(dir);
        let ingestor = EventIngestor::new(config.fusion.clone(), store);
        let anomaly = AnomalyDetector::new(config.fusion.anomaly_sigma);
        let commands =
            CommandEngine::new(config.dispatch.clone(), Arc::new(SimulatedTransport));
        let audit = AuditLog::new(config.continuity.clone());
        let bus = EventBus::default();
        RtccCoordinator::new(config, ingestor, anomaly, commands, audit, bus)
    }

    fn drone(id: &str) -> Actuator {
        Actuator {
            actuator_id: id.to_string(),
            name: id.to_string(),
            capabilities: vec![
                "hd_camera".into(),
                "thermal_camera".into(),
                "spotlight".into(),
                "speaker".into(),
                "lpr_camera".into(),
            ],
            battery_percent: 90.0,
            location: GeoPoint::new(26.7010, -80.0510),
            available: true,
            cruise_speed_mps: 18.0,
        }
    }

    fn gunshot_event(id: &str, lat: f64, lon: f64) -> RawEvent {
        RawEvent {
            event_id: id.to_string(),
            source: EventSource::Gunshot,
            event_time: Utc::now(),
            ingest_time: Utc::now(),
            location: Some(GeoPoint::new(lat, lon)),
            payload: EventPayload::GunshotDetection {
                rounds_detected: 3,
                confidence: 0.92,
                sensor_array: None,
            },
            confidence: 1.0,
            correlation_hints: vec![],
        }
    }

    fn lpr_event(id: &str, lat: f64, lon: f64) -> RawEvent {
        RawEvent {
            event_id: id.to_string(),
            source: EventSource::Lpr,
            event_time: Utc::now(),
            ingest_time: Utc::now(),
            location: Some(GeoPoint::new(lat, lon)),
            payload: EventPayload::PlateRead {
                plate: "ABC123".into(),
                plate_state: Some("FL".into()),
                alert_type: None,
                vehicle_description: None,
                camera_id: Some("cam-4".into()),
            },
            confidence: 1.0,
            correlation_hints: vec![],
        }
    }

    #[tokio::test]
    async fn gunshot_lpr_fuses_and_dispatches() {
        let mut coord = coordinator();
        coord.fleet.upsert(drone("d1"));

        let first = coord
            .ingest_and_process(gunshot_event("g1", 26.7000, -80.0500))
            .await;
        assert!(first.accepted);
        assert!(first.fusions.is_empty());

        let second = coord
            .ingest_and_process(lpr_event("l1", 26.7002, -80.0498))
            .await;
        assert_eq!(second.fusions.len(), 1);
        let fusion = &second.fusions[0];
        assert_eq!(fusion.event_type, "gunshot_incident");
        assert!(fusion.confidence_score >= 0.7 - 1e-9);

        assert_eq!(second.dispatches.len(), 1);
        let request = &second.dispatches[0];
        assert_eq!(
            request.trigger_event.trigger,
            crate::types::DispatchTrigger::Shotspotter
        );
        assert_eq!(request.assigned_actuator_id.as_deref(), Some("d1"));
        // Commands were queued on the assigned actuator's lane.
        assert!(!coord.commands.queued_commands("d1").is_empty());
        // Audit chain stays verifiable end to end.
        assert!(coord.audit.verify_chain().is_ok());
    }

    #[tokio::test]
    async fn duplicate_event_is_not_reprocessed() {
        let mut coord = coordinator();
        let first = coord
            .ingest_and_process(gunshot_event("g1", 26.70, -80.05))
            .await;
        assert!(first.accepted);
        let second = coord
            .ingest_and_process(gunshot_event("g1", 26.70, -80.05))
            .await;
        assert!(second.duplicate);
        assert!(second.fusions.is_empty());
    }

    #[tokio::test]
    async fn nearby_officer_warned_on_gunshot_fusion() {
        let mut coord = coordinator();
        coord.safety.set_on_duty("o1", true);
        coord
            .safety
            .update_location("o1", GeoPoint::new(26.7003, -80.0503));

        coord
            .ingest_and_process(gunshot_event("g1", 26.7000, -80.0500))
            .await;
        let outcome = coord
            .ingest_and_process(lpr_event("l1", 26.7002, -80.0498))
            .await;
        assert!(outcome.warnings_issued >= 1);
        let status = coord.safety.status("o1").unwrap();
        assert!(status.threat_level >= ThreatLevel::High);
    }

    #[tokio::test]
    async fn probe_failures_drive_failover_with_audit() {
        let mut coord = coordinator();
        coord.health.register(
            "A",
            "elasticsearch-primary",
            Arc::new(crate::continuity::StaticProbe { latency_ms: 10.0 }),
        );
        coord.failover.register("es", "A", "B");

        let now = Utc::now();
        for _ in 0..2 {
            let action = coord.observe_probe("es", "A", Err("conn refused".into()), now);
            assert!(matches!(action, FailoverAction::None));
        }
        let action = coord.observe_probe("es", "A", Err("conn refused".into()), now);
        assert!(matches!(action, FailoverAction::FailedOver(_)));
        assert_eq!(coord.failover.pair("es").unwrap().active(), "B");

        // Buffer a write and recover.
        assert!(coord
            .failover
            .buffer_write("es", json!({"doc": 1}), now));
        for _ in 0..3 {
            coord.observe_probe("es", "A", Ok(5.0), now);
        }
        assert_eq!(coord.failover.pair("es").unwrap().active(), "A");
        assert!(coord.audit.verify_chain().is_ok());
    }

    #[tokio::test]
    async fn plate_reads_feed_entity_resolution() {
        let mut coord = coordinator();
        let mut a = lpr_event("l1", 26.70, -80.05);
        let mut b = lpr_event("l2", 26.71, -80.06);
        // Same plate observed by two cameras resolves to one cluster.
        a.payload = EventPayload::PlateRead {
            plate: "XYZ789".into(),
            plate_state: Some("FL".into()),
            alert_type: None,
            vehicle_description: None,
            camera_id: Some("cam-1".into()),
        };
        b.payload = EventPayload::PlateRead {
            plate: "XYZ-789".into(),
            plate_state: Some("FL".into()),
            alert_type: None,
            vehicle_description: None,
            camera_id: Some("cam-2".into()),
        };
        coord.ingest_and_process(a).await;
        coord.ingest_and_process(b).await;

        let resolved = coord.resolve_entities().to_vec();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].merge_candidates.len(), 1);
        assert!(resolved[0].confidence >= 0.75);
    }

    #[tokio::test]
    async fn fall_timeout_triggers_distress_dispatch() {
        let mut coord = coordinator();
        coord.fleet.upsert(drone("d1"));
        coord.safety.set_on_duty("o1", true);
        coord.safety.report_possible_fall(
            "o1",
            Some(GeoPoint::new(26.7005, -80.0505)),
            BTreeMap::new(),
        );

        let later = Utc::now() + chrono::Duration::seconds(200);
        coord.run_sweeps(later).await;

        let dispatched: Vec<_> = coord.dispatch.active_requests().collect();
        assert!(
            dispatched.iter().any(|r| r.trigger_event.trigger
                == crate::types::DispatchTrigger::OfficerDistress),
            "confirmed fall should trigger officer-distress dispatch"
        );
    }
}
