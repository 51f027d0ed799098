//! Fall detection lifecycle
//!
//! `normal -> possible_fall -> {confirmed_fall | false_alarm | acknowledged}`
//!
//! A `possible_fall` not acknowledged within the confirm timeout
//! transitions to `confirmed_fall`; the sweep returns newly-confirmed
//! events so the caller can raise critical alerts and notify supervisors.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};
use uuid::Uuid;

use crate::types::{FallDetectionState, FallEvent, GeoPoint};

/// Per-officer fall event tracking.
pub struct FallTracker {
    confirm_timeout: Duration,
    events: HashMap<String, FallEvent>,
}

impl FallTracker {
    pub fn new(confirm_timeout_secs: i64) -> Self {
        Self {
            confirm_timeout: Duration::seconds(confirm_timeout_secs),
            events: HashMap::new(),
        }
    }

    /// Device reported a possible fall.
    pub fn report_possible_fall(
        &mut self,
        officer_id: &str,
        location: Option<GeoPoint>,
        accelerometer: BTreeMap<String, f64>,
    ) -> FallEvent {
        let event = FallEvent {
            event_id: Uuid::new_v4().to_string(),
            officer_id: officer_id.to_string(),
            state: FallDetectionState::PossibleFall,
            location,
            accelerometer,
            detected_at: Utc::now(),
            acknowledged_at: None,
            acknowledged_by: None,
            false_alarm_reason: None,
        };
        warn!(officer_id, "Possible fall reported");
        self.events.insert(officer_id.to_string(), event.clone());
        event
    }

    /// Acknowledge: the officer (or a supervisor) confirmed they are fine,
    /// or marks a false alarm with a reason.
    pub fn acknowledge(
        &mut self,
        officer_id: &str,
        acknowledged_by: &str,
        false_alarm_reason: Option<String>,
    ) -> Option<FallEvent> {
        let event = self.events.get_mut(officer_id)?;
        if event.state != FallDetectionState::PossibleFall
            && event.state != FallDetectionState::ConfirmedFall
        {
            return None;
        }
        event.acknowledged_at = Some(Utc::now());
        event.acknowledged_by = Some(acknowledged_by.to_string());
        event.state = if let Some(reason) = false_alarm_reason {
            event.false_alarm_reason = Some(reason);
            FallDetectionState::FalseAlarm
        } else {
            FallDetectionState::Acknowledged
        };
        info!(officer_id, state = ?event.state, "Fall event acknowledged");
        Some(event.clone())
    }

    /// Explicit confirmation (e.g. responding unit on scene).
    pub fn confirm(&mut self, officer_id: &str) -> Option<FallEvent> {
        let event = self.events.get_mut(officer_id)?;
        event.state = FallDetectionState::ConfirmedFall;
        Some(event.clone())
    }

    /// Timeout sweep: unacknowledged possible falls past the confirm
    /// timeout become confirmed. Returns newly-confirmed events.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Vec<FallEvent> {
        let mut confirmed = Vec::new();
        for event in self.events.values_mut() {
            if event.state == FallDetectionState::PossibleFall
                && now - event.detected_at >= self.confirm_timeout
            {
                event.state = FallDetectionState::ConfirmedFall;
                warn!(
                    officer_id = %event.officer_id,
                    "Possible fall unacknowledged past timeout - confirmed"
                );
                confirmed.push(event.clone());
            }
        }
        confirmed
    }

    pub fn state_for(&self, officer_id: &str) -> FallDetectionState {
        self.events
            .get(officer_id)
            .map_or(FallDetectionState::Normal, |e| e.state)
    }

    pub fn event_for(&self, officer_id: &str) -> Option<&FallEvent> {
        self.events.get(officer_id)
    }
}
