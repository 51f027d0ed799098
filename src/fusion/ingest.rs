//! Event Ingestor - validation, dedup, retry and dead-letter parking
//!
//! Raw events enter here from the webhook adapters and vendor bridges.
//! A malformed event is dropped with an audit entry; it never blocks the
//! pipeline. Transient store failures retry with exponential backoff and
//! jitter bounded by a per-source deadline; on deadline the event parks
//! in the dead-letter queue and an alert is raised.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::FusionConfig;
use crate::storage::{EventStore, StorageError};
use crate::types::{EventPayload, RawEvent};

/// Why an event was rejected at the door. Never retried.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("event_id must be non-empty")]
    MissingEventId,

    #[error("coordinates out of range: lat={lat}, lon={lon}")]
    BadCoordinates { lat: f64, lon: f64 },

    #[error("confidence {0} outside [0,1]")]
    BadConfidence(f64),

    #[error("event_time {event_time} is {skew_secs}s ahead of ingest clock (tolerance {tolerance_secs}s)")]
    ClockSkew {
        event_time: DateTime<Utc>,
        skew_secs: i64,
        tolerance_secs: i64,
    },

    #[error("payload rejected: {0}")]
    BadPayload(String),

    #[error("store failed after retries: {0}")]
    DeadLettered(String),
}

/// Outcome of one ingest attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Newly accepted and stored.
    Accepted,
    /// Same `event_id` was already stored; nothing written.
    Duplicate,
}

/// An event parked after exhausting its retry budget.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub event: RawEvent,
    pub error: String,
    pub parked_at: DateTime<Utc>,
}

/// Validating, deduplicating front door for raw events.
pub struct EventIngestor {
    config: FusionConfig,
    store: EventStore,
    dead_letters: VecDeque<DeadLetter>,
    accepted: u64,
    rejected: u64,
    duplicates: u64,
}

impl EventIngestor {
    pub fn new(config: FusionConfig, store: EventStore) -> Self {
        Self {
            config,
            store,
            dead_letters: VecDeque::new(),
            accepted: 0,
            rejected: 0,
            duplicates: 0,
        }
    }

    /// Validate, stamp ingest time, dedup, and store one event.
    pub async fn ingest(&mut self, mut event: RawEvent) -> Result<IngestOutcome, IngestError> {
        event.ingest_time = Utc::now();

        if let Err(e) = self.validate(&event) {
            self.rejected += 1;
            warn!(event_id = %event.event_id, error = %e, "Event rejected by ingest validation");
            return Err(e);
        }

        match self.store_with_retry(&event).await {
            Ok(true) => {
                self.accepted += 1;
                debug!(
                    event_id = %event.event_id,
                    source = %event.source,
                    kind = event.payload.kind(),
                    "Event accepted"
                );
                Ok(IngestOutcome::Accepted)
            }
            Ok(false) => {
                self.duplicates += 1;
                debug!(event_id = %event.event_id, "Duplicate event_id ignored");
                Ok(IngestOutcome::Duplicate)
            }
            Err(e) => {
                let message = e.to_string();
                warn!(event_id = %event.event_id, error = %message, "Event dead-lettered");
                self.dead_letters.push_back(DeadLetter {
                    event,
                    error: message.clone(),
                    parked_at: Utc::now(),
                });
                Err(IngestError::DeadLettered(message))
            }
        }
    }

    fn validate(&self, event: &RawEvent) -> Result<(), IngestError> {
        if event.event_id.trim().is_empty() {
            return Err(IngestError::MissingEventId);
        }
        if !(0.0..=1.0).contains(&event.confidence) {
            return Err(IngestError::BadConfidence(event.confidence));
        }
        if let Some(loc) = event.location {
            if !(-90.0..=90.0).contains(&loc.lat) || !(-180.0..=180.0).contains(&loc.lon) {
                return Err(IngestError::BadCoordinates {
                    lat: loc.lat,
                    lon: loc.lon,
                });
            }
        }

        // ingest_time >= event_time - clock_skew_tolerance
        let tolerance = ChronoDuration::seconds(self.config.clock_skew_tolerance_secs);
        let skew = event.event_time - event.ingest_time;
        if skew > tolerance {
            return Err(IngestError::ClockSkew {
                event_time: event.event_time,
                skew_secs: skew.num_seconds(),
                tolerance_secs: self.config.clock_skew_tolerance_secs,
            });
        }

        Self::validate_payload(&event.payload)
    }

    fn validate_payload(payload: &EventPayload) -> Result<(), IngestError> {
        match payload {
            EventPayload::GunshotDetection { confidence, .. } => {
                if !(0.0..=1.0).contains(confidence) {
                    return Err(IngestError::BadPayload(format!(
                        "gunshot confidence {confidence} outside [0,1]"
                    )));
                }
            }
            EventPayload::PlateRead { plate, .. } => {
                if plate.trim().is_empty() {
                    return Err(IngestError::BadPayload("empty plate".into()));
                }
            }
            EventPayload::OfficerVitals { heart_rate_bpm, .. } => {
                if *heart_rate_bpm > 300 {
                    return Err(IngestError::BadPayload(format!(
                        "implausible heart rate {heart_rate_bpm}"
                    )));
                }
            }
            EventPayload::CrowdDensity { density_per_sq_m, .. } => {
                if *density_per_sq_m < 0.0 {
                    return Err(IngestError::BadPayload("negative crowd density".into()));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Exponential backoff with jitter, bounded by the per-source deadline.
    async fn store_with_retry(&self, event: &RawEvent) -> Result<bool, StorageError> {
        let deadline = std::time::Instant::now()
            + Duration::from_secs(self.config.ingest_retry_deadline_secs);
        let mut attempt: u32 = 0;

        loop {
            match self.store.store_unique(event) {
                Ok(stored) => return Ok(stored),
                Err(e) => {
                    attempt += 1;
                    let base = Duration::from_millis(50 * 2u64.saturating_pow(attempt.min(8)));
                    let jitter =
                        Duration::from_millis(rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 2 + 1));
                    let delay = base + jitter;
                    if std::time::Instant::now() + delay >= deadline {
                        return Err(e);
                    }
                    warn!(
                        event_id = %event.event_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Store write failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Drain parked events for operator review or replay.
    pub fn drain_dead_letters(&mut self) -> Vec<DeadLetter> {
        self.dead_letters.drain(..).collect()
    }

    pub fn dead_letter_count(&self) -> usize {
        self.dead_letters.len()
    }

    pub fn stats(&self) -> IngestStats {
        IngestStats {
            accepted: self.accepted,
            rejected: self.rejected,
            duplicates: self.duplicates,
            dead_letters: self.dead_letters.len(),
        }
    }

    /// Retention sweep on the hot store.
    pub fn enforce_retention(&self, now: DateTime<Utc>) -> Result<usize, StorageError> {
        let cutoff =
            now - ChronoDuration::hours(self.config.retention_recent_hours);
        let deleted = self
            .store
            .cleanup_before(cutoff.timestamp_millis().max(0) as u64)?;
        if deleted > 0 {
            info!(deleted, "Hot-store retention sweep");
        }
        Ok(deleted)
    }
}

/// Counters reported on the status surface.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct IngestStats {
    pub accepted: u64,
    pub rejected: u64,
    pub duplicates: u64,
    pub dead_letters: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventSource, GeoPoint};

    fn ingestor() -> EventIngestor {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::open(dir.path().join("events")).unwrap();
        // Leak the tempdir so the store outlives the test body.
        std::mem::forget(dir);
        EventIngestor::new(FusionConfig::default(), store)
    }

    fn gunshot(id: &str) -> RawEvent {
        RawEvent {
            event_id: id.to_string(),
            source: EventSource::Gunshot,
            event_time: Utc::now(),
            ingest_time: Utc::now(),
            location: Some(GeoPoint::new(26.7, -80.05)),
            payload: EventPayload::GunshotDetection {
                rounds_detected: 3,
                confidence: 0.9,
                sensor_array: None,
            },
            confidence: 1.0,
            correlation_hints: vec![],
        }
    }

    #[tokio::test]
    async fn accepts_valid_event() {
        let mut ing = ingestor();
        let out = ing.ingest(gunshot("e1")).await.unwrap();
        assert_eq!(out, IngestOutcome::Accepted);
        assert_eq!(ing.stats().accepted, 1);
    }

    #[tokio::test]
    async fn duplicate_webhook_stores_once() {
        let mut ing = ingestor();
        assert_eq!(ing.ingest(gunshot("e1")).await.unwrap(), IngestOutcome::Accepted);
        assert_eq!(ing.ingest(gunshot("e1")).await.unwrap(), IngestOutcome::Duplicate);
        assert_eq!(ing.stats().duplicates, 1);
    }

    #[tokio::test]
    async fn rejects_bad_coordinates() {
        let mut ing = ingestor();
        let mut ev = gunshot("e1");
        ev.location = Some(GeoPoint::new(123.0, -80.0));
        assert!(matches!(
            ing.ingest(ev).await,
            Err(IngestError::BadCoordinates { .. })
        ));
        assert_eq!(ing.stats().rejected, 1);
    }

    #[tokio::test]
    async fn rejects_future_event_beyond_skew() {
        let mut ing = ingestor();
        let mut ev = gunshot("e1");
        ev.event_time = Utc::now() + ChronoDuration::hours(2);
        assert!(matches!(ing.ingest(ev).await, Err(IngestError::ClockSkew { .. })));
    }

    #[tokio::test]
    async fn rejects_empty_plate() {
        let mut ing = ingestor();
        let mut ev = gunshot("e1");
        ev.payload = EventPayload::PlateRead {
            plate: "  ".into(),
            plate_state: None,
            alert_type: None,
            vehicle_description: None,
            camera_id: None,
        };
        assert!(matches!(ing.ingest(ev).await, Err(IngestError::BadPayload(_))));
    }
}
