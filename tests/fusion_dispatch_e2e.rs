//! End-to-end: gunshot + LPR -> fused event -> auto-dispatch
//!
//! Injects a gunshot detection and a nearby LPR read and follows them
//! through correlation, safety fan-out, guardrail clearance and actuator
//! assignment.

use chrono::Utc;
use std::sync::Arc;

use rtcc_core::bus::EventBus;
use rtcc_core::config::RtccConfig;
use rtcc_core::continuity::AuditLog;
use rtcc_core::dispatch::{CommandEngine, SimulatedTransport};
use rtcc_core::fusion::{AnomalyDetector, EventIngestor};
use rtcc_core::pipeline::RtccCoordinator;
use rtcc_core::storage::EventStore;
use rtcc_core::types::{
    Actuator, CorrelationKind, DispatchStatus, DispatchTrigger, EventPayload, EventSource,
    GeoPoint, RawEvent, Severity,
};

fn build_coordinator(dir: &std::path::Path) -> RtccCoordinator {
    let config = RtccConfig::default();
    let store = EventStore::open(dir.join("events")).unwrap();
    let ingestor = EventIngestor::new(config.fusion.clone(), store);
    let anomaly = AnomalyDetector::new(config.fusion.anomaly_sigma);
    let commands = CommandEngine::new(config.dispatch.clone(), Arc::new(SimulatedTransport));
    let audit = AuditLog::new(config.continuity.clone());
    RtccCoordinator::new(config, ingestor, anomaly, commands, audit, EventBus::default())
}

fn gunshot(lat: f64, lon: f64, rounds: u32, confidence: f64) -> RawEvent {
    RawEvent {
        event_id: format!("gunshot-{lat}-{lon}"),
        source: EventSource::Gunshot,
        event_time: Utc::now(),
        ingest_time: Utc::now(),
        location: Some(GeoPoint::new(lat, lon)),
        payload: EventPayload::GunshotDetection {
            rounds_detected: rounds,
            confidence,
            sensor_array: Some("array-7".into()),
        },
        confidence: 1.0,
        correlation_hints: vec![],
    }
}

fn plate_read(lat: f64, lon: f64, plate: &str) -> RawEvent {
    RawEvent {
        event_id: format!("lpr-{plate}"),
        source: EventSource::Lpr,
        event_time: Utc::now(),
        ingest_time: Utc::now(),
        location: Some(GeoPoint::new(lat, lon)),
        payload: EventPayload::PlateRead {
            plate: plate.to_string(),
            plate_state: Some("FL".into()),
            alert_type: None,
            vehicle_description: None,
            camera_id: Some("cam-12".into()),
        },
        confidence: 1.0,
        correlation_hints: vec![],
    }
}

fn camera_drone(id: &str, lat: f64, lon: f64) -> Actuator {
    Actuator {
        actuator_id: id.to_string(),
        name: format!("Drone {id}"),
        capabilities: vec!["hd_camera".into(), "thermal_camera".into()],
        battery_percent: 82.0,
        location: GeoPoint::new(lat, lon),
        available: true,
        cruise_speed_mps: 18.0,
    }
}

#[tokio::test]
async fn gunshot_then_lpr_produces_fusion_and_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    let mut coord = build_coordinator(dir.path());
    coord.fleet.upsert(camera_drone("d1", 26.7050, -80.0520));

    // T: gunshot at (26.7000, -80.0500), 3 rounds, detector confidence 0.92.
    let first = coord
        .ingest_and_process(gunshot(26.7000, -80.0500, 3, 0.92))
        .await;
    assert!(first.accepted);
    assert!(first.fusions.is_empty(), "single source cannot fuse");

    // T+15s: plate read 30 m away.
    let second = coord
        .ingest_and_process(plate_read(26.7002, -80.0498, "ABC123"))
        .await;

    assert_eq!(second.fusions.len(), 1);
    let fusion = &second.fusions[0];
    assert_eq!(fusion.correlation_kind, CorrelationKind::SensorLpr);
    assert_eq!(fusion.event_type, "gunshot_incident");
    assert!(
        fusion.confidence_score >= 0.7 - 1e-9,
        "got {}",
        fusion.confidence_score
    );
    assert_eq!(fusion.severity, Severity::High);
    assert_eq!(fusion.sources.len(), 2);

    // Every source falls within the rule windows of another source.
    for s in &fusion.sources {
        let paired = fusion.sources.iter().any(|o| {
            o.event_id != s.event_id
                && (o.event_time - s.event_time).num_seconds().abs() <= 120
        });
        assert!(paired);
    }

    // Dispatch: shotspotter trigger, high priority, actuator assigned.
    assert_eq!(second.dispatches.len(), 1);
    let request = &second.dispatches[0];
    assert_eq!(request.trigger_event.trigger, DispatchTrigger::Shotspotter);
    assert_eq!(request.status, DispatchStatus::Dispatched);
    assert_eq!(request.assigned_actuator_id.as_deref(), Some("d1"));
    assert!(request.response_time_ms.is_some());

    // Initial mission commands sit on the assigned actuator's lane.
    let queued = coord.commands.queued_commands("d1");
    assert!(queued.len() >= 2, "takeoff + goto expected, got {}", queued.len());

    // Everything above is on the audit chain, verifiable end to end.
    assert!(coord.audit.verify_chain().is_ok());
}

#[tokio::test]
async fn replayed_webhook_event_is_deduplicated() {
    let dir = tempfile::tempdir().unwrap();
    let mut coord = build_coordinator(dir.path());

    let event = gunshot(26.7000, -80.0500, 2, 0.8);
    let first = coord.ingest_and_process(event.clone()).await;
    assert!(first.accepted);
    let replay = coord.ingest_and_process(event).await;
    assert!(replay.duplicate);
    assert_eq!(coord.ingestor.stats().duplicates, 1);
}

#[tokio::test]
async fn fusion_confidence_never_decreases_as_sources_arrive() {
    let dir = tempfile::tempdir().unwrap();
    let mut coord = build_coordinator(dir.path());

    coord
        .ingest_and_process(gunshot(26.7000, -80.0500, 3, 0.9))
        .await;
    let one = coord
        .ingest_and_process(plate_read(26.7001, -80.0501, "AAA111"))
        .await;
    let before = one.fusions[0].confidence_score;

    let two = coord
        .ingest_and_process(plate_read(26.7002, -80.0499, "BBB222"))
        .await;
    assert!(!two.fusions.is_empty());
    let after = two.fusions[0].confidence_score;
    assert!(after >= before);
    assert!(after <= 1.0);
}
