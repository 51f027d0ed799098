//! Check-in discipline - per-officer timers and the overdue sweep

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::types::{CheckIn, CheckInType, GeoPoint};

/// Per-officer check-in history and the overdue sweep.
pub struct CheckInRegistry {
    interval: Duration,
    history: HashMap<String, Vec<CheckIn>>,
    last: HashMap<String, DateTime<Utc>>,
}

impl CheckInRegistry {
    pub fn new(interval_minutes: i64) -> Self {
        Self {
            interval: Duration::minutes(interval_minutes),
            history: HashMap::new(),
            last: HashMap::new(),
        }
    }

    /// Record a check-in and reset the officer's timer.
    ///
    /// Returns the stored record; an `Emergency` check-in is the caller's
    /// cue to raise a critical alert.
    pub fn check_in(
        &mut self,
        officer_id: &str,
        check_in_type: CheckInType,
        location: Option<GeoPoint>,
        notes: Option<String>,
    ) -> CheckIn {
        let record = CheckIn {
            checkin_id: Uuid::new_v4().to_string(),
            officer_id: officer_id.to_string(),
            check_in_type,
            location,
            notes,
            created_at: Utc::now(),
        };

        if check_in_type == CheckInType::Emergency {
            warn!(officer_id, "Emergency check-in received");
        } else {
            info!(officer_id, kind = ?check_in_type, "Check-in recorded");
        }

        self.last.insert(officer_id.to_string(), record.created_at);
        self.history
            .entry(officer_id.to_string())
            .or_default()
            .push(record.clone());
        record
    }

    pub fn last_check_in(&self, officer_id: &str) -> Option<DateTime<Utc>> {
        self.last.get(officer_id).copied()
    }

    /// Officers whose last check-in is older than the interval.
    ///
    /// Officers are registered on their first check-in or by an explicit
    /// `track` call from the duty roster; an officer with no check-in at
    /// all is always overdue.
    pub fn overdue(&self, now: DateTime<Utc>) -> Vec<(String, Option<DateTime<Utc>>)> {
        self.last
            .iter()
            .filter(|(_, last)| now - **last > self.interval)
            .map(|(id, last)| (id.clone(), Some(*last)))
            .collect()
    }

    /// Begin tracking an officer without an initial check-in; the timer
    /// starts from `now` so the first sweep after the interval flags them.
    pub fn track(&mut self, officer_id: &str, now: DateTime<Utc>) {
        self.last.entry(officer_id.to_string()).or_insert(now);
    }

    pub fn history(&self, officer_id: &str, limit: usize) -> Vec<&CheckIn> {
        self.history
            .get(officer_id)
            .map(|v| v.iter().rev().take(limit).collect())
            .unwrap_or_default()
    }
}
