//! Failover manager - automatic and manual primary/secondary switching
//!
//! Per service-type the manager holds primary, secondary, state and mode.
//! In auto mode, n consecutive failing probes on the active target
//! transition to the other target; recovery requires m consecutive
//! healthy probes on the primary. Manual failover/recovery record reason
//! and user and are permitted in any state. Writes during failover are
//! buffered in order up to a limit and replayed on recovery; buffered
//! writes past their deadline are discarded.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ContinuityConfig;
use crate::types::{FailoverEvent, FailoverMode, FailoverState, ServiceStatus};

/// A write buffered while its service is failed over.
#[derive(Debug, Clone)]
pub struct BufferedWrite {
    pub payload: serde_json::Value,
    pub buffered_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

/// One managed primary/secondary pair.
#[derive(Debug)]
pub struct FailoverPair {
    pub service_type: String,
    pub primary: String,
    pub secondary: String,
    pub state: FailoverState,
    pub mode: FailoverMode,
    failing_streak: u32,
    recovery_streak: u32,
    buffer: VecDeque<BufferedWrite>,
}

impl FailoverPair {
    /// Target currently serving traffic.
    pub fn active(&self) -> &str {
        match self.state {
            FailoverState::Normal => &self.primary,
            FailoverState::FailedOver => &self.secondary,
        }
    }

    pub fn buffered_count(&self) -> usize {
        self.buffer.len()
    }
}

/// Outcome of a probe fed into the manager.
#[derive(Debug, Clone)]
pub enum FailoverAction {
    None,
    FailedOver(FailoverEvent),
    Recovered {
        event: FailoverEvent,
        replayed_writes: Vec<serde_json::Value>,
        discarded_writes: usize,
    },
}

/// Failover manager over all service types.
pub struct FailoverManager {
    config: ContinuityConfig,
    pairs: HashMap<String, FailoverPair>,
    events: Vec<FailoverEvent>,
}

impl FailoverManager {
    pub fn new(config: ContinuityConfig) -> Self {
        Self {
            config,
            pairs: HashMap::new(),
            events: Vec::new(),
        }
    }

    pub fn register(&mut self, service_type: &str, primary: &str, secondary: &str) {
        self.pairs.insert(
            service_type.to_string(),
            FailoverPair {
                service_type: service_type.to_string(),
                primary: primary.to_string(),
                secondary: secondary.to_string(),
                state: FailoverState::Normal,
                mode: FailoverMode::Auto,
                failing_streak: 0,
                recovery_streak: 0,
                buffer: VecDeque::new(),
            },
        );
    }

    pub fn pair(&self, service_type: &str) -> Option<&FailoverPair> {
        self.pairs.get(service_type)
    }

    pub fn set_mode(&mut self, service_type: &str, mode: FailoverMode) -> bool {
        let Some(pair) = self.pairs.get_mut(service_type) else {
            return false;
        };
        pair.mode = mode;
        true
    }

    /// Feed a probe result for a pair's target.
    ///
    /// Failing probes on the active target advance toward auto failover;
    /// healthy probes on the primary while failed over advance toward
    /// auto recovery.
    pub fn observe_probe(
        &mut self,
        service_type: &str,
        target: &str,
        status: ServiceStatus,
        now: DateTime<Utc>,
    ) -> FailoverAction {
        let Some(pair) = self.pairs.get_mut(service_type) else {
            return FailoverAction::None;
        };
        if pair.mode != FailoverMode::Auto {
            return FailoverAction::None;
        }

        match pair.state {
            FailoverState::Normal => {
                if target != pair.primary {
                    return FailoverAction::None;
                }
                if status.is_failing() {
                    pair.failing_streak += 1;
                    if pair.failing_streak >= self.config.failover_consecutive_failures {
                        pair.failing_streak = 0;
                        return self.execute_failover(service_type, "consecutive probe failures", true, None);
                    }
                } else {
                    pair.failing_streak = 0;
                }
                FailoverAction::None
            }
            FailoverState::FailedOver => {
                if target != pair.primary {
                    return FailoverAction::None;
                }
                if status.is_failing() {
                    pair.recovery_streak = 0;
                    return FailoverAction::None;
                }
                pair.recovery_streak += 1;
                if pair.recovery_streak >= self.config.recovery_consecutive_successes {
                    pair.recovery_streak = 0;
                    return self.execute_recovery(service_type, "primary healthy", true, None, now);
                }
                FailoverAction::None
            }
        }
    }

    /// Manual failover; permitted in any state.
    pub fn manual_failover(
        &mut self,
        service_type: &str,
        reason: &str,
        user_id: &str,
    ) -> FailoverAction {
        self.execute_failover(service_type, reason, false, Some(user_id.to_string()))
    }

    /// Manual recovery; permitted in any state.
    pub fn manual_recovery(
        &mut self,
        service_type: &str,
        reason: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> FailoverAction {
        self.execute_recovery(service_type, reason, false, Some(user_id.to_string()), now)
    }

    fn execute_failover(
        &mut self,
        service_type: &str,
        reason: &str,
        auto: bool,
        user_id: Option<String>,
    ) -> FailoverAction {
        let Some(pair) = self.pairs.get_mut(service_type) else {
            return FailoverAction::None;
        };
        if pair.state == FailoverState::FailedOver {
            return FailoverAction::None;
        }
        pair.state = FailoverState::FailedOver;
        let event = FailoverEvent {
            event_id: format!("fo-{}", Uuid::new_v4().simple()),
            service_type: service_type.to_string(),
            from_target: pair.primary.clone(),
            to_target: pair.secondary.clone(),
            reason: reason.to_string(),
            auto_triggered: auto,
            user_id,
            timestamp: Utc::now(),
        };
        warn!(
            service_type,
            from = %event.from_target,
            to = %event.to_target,
            reason,
            auto,
            "FAILOVER"
        );
        self.events.push(event.clone());
        FailoverAction::FailedOver(event)
    }

    fn execute_recovery(
        &mut self,
        service_type: &str,
        reason: &str,
        auto: bool,
        user_id: Option<String>,
        now: DateTime<Utc>,
    ) -> FailoverAction {
        let Some(pair) = self.pairs.get_mut(service_type) else {
            return FailoverAction::None;
        };
        if pair.state == FailoverState::Normal {
            return FailoverAction::None;
        }
        pair.state = FailoverState::Normal;

        // Drain the buffer in order; expired writes are discarded.
        let mut replayed = Vec::new();
        let mut discarded = 0usize;
        while let Some(write) = pair.buffer.pop_front() {
            if write.deadline <= now {
                discarded += 1;
            } else {
                replayed.push(write.payload);
            }
        }

        let event = FailoverEvent {
            event_id: format!("rec-{}", Uuid::new_v4().simple()),
            service_type: service_type.to_string(),
            from_target: pair.secondary.clone(),
            to_target: pair.primary.clone(),
            reason: reason.to_string(),
            auto_triggered: auto,
            user_id,
            timestamp: Utc::now(),
        };
        info!(
            service_type,
            replayed = replayed.len(),
            discarded,
            reason,
            "Recovery complete - buffer drained"
        );
        self.events.push(event.clone());
        FailoverAction::Recovered {
            event,
            replayed_writes: replayed,
            discarded_writes: discarded,
        }
    }

    /// Buffer a write against a failed-over service.
    ///
    /// Returns `false` (would_block) when the pair is not failed over or
    /// the buffer is full; callers backpressure rather than drop.
    pub fn buffer_write(
        &mut self,
        service_type: &str,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> bool {
        let limit = self.config.failover_buffer_limit;
        let deadline_secs = self.config.failover_buffer_deadline_secs;
        let Some(pair) = self.pairs.get_mut(service_type) else {
            return false;
        };
        if pair.state != FailoverState::FailedOver || pair.buffer.len() >= limit {
            return false;
        }
        pair.buffer.push_back(BufferedWrite {
            payload,
            buffered_at: now,
            deadline: now + chrono::Duration::seconds(deadline_secs),
        });
        true
    }

    /// Discard expired buffered writes; returns count per service type.
    pub fn expire_buffered_writes(&mut self, now: DateTime<Utc>) -> HashMap<String, usize> {
        let mut discarded = HashMap::new();
        for (service_type, pair) in &mut self.pairs {
            let before = pair.buffer.len();
            pair.buffer.retain(|w| w.deadline > now);
            let dropped = before - pair.buffer.len();
            if dropped > 0 {
                warn!(service_type = %service_type, dropped, "Buffered writes expired");
                discarded.insert(service_type.clone(), dropped);
            }
        }
        discarded
    }

    pub fn events(&self) -> &[FailoverEvent] {
        &self.events
    }

    pub fn active_failovers(&self) -> usize {
        self.pairs
            .values()
            .filter(|p| p.state == FailoverState::FailedOver)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> FailoverManager {
        let mut m = FailoverManager::new(ContinuityConfig::default());
        m.register("es", "A", "B");
        m
    }

    #[test]
    fn three_failures_trigger_failover_once() {
        let mut m = manager();
        let now = Utc::now();
        assert!(matches!(
            m.observe_probe("es", "A", ServiceStatus::Unhealthy, now),
            FailoverAction::None
        ));
        assert!(matches!(
            m.observe_probe("es", "A", ServiceStatus::Unhealthy, now),
            FailoverAction::None
        ));
        let action = m.observe_probe("es", "A", ServiceStatus::Unhealthy, now);
        assert!(matches!(action, FailoverAction::FailedOver(_)));
        assert_eq!(m.pair("es").unwrap().active(), "B");
        assert_eq!(m.events().len(), 1);

        // Further failures do not re-fire.
        let action = m.observe_probe("es", "A", ServiceStatus::Unhealthy, now);
        assert!(matches!(action, FailoverAction::None));
    }

    #[test]
    fn healthy_probe_resets_streak() {
        let mut m = manager();
        let now = Utc::now();
        m.observe_probe("es", "A", ServiceStatus::Unhealthy, now);
        m.observe_probe("es", "A", ServiceStatus::Healthy, now);
        m.observe_probe("es", "A", ServiceStatus::Unhealthy, now);
        let action = m.observe_probe("es", "A", ServiceStatus::Unhealthy, now);
        // Only two consecutive failures since the reset.
        assert!(matches!(action, FailoverAction::None));
    }

    #[test]
    fn recovery_drains_buffer_in_order() {
        let mut m = manager();
        let now = Utc::now();
        for _ in 0..3 {
            m.observe_probe("es", "A", ServiceStatus::Unhealthy, now);
        }
        assert!(m.buffer_write("es", serde_json::json!({"n": 1}), now));
        assert!(m.buffer_write("es", serde_json::json!({"n": 2}), now));

        for _ in 0..2 {
            m.observe_probe("es", "A", ServiceStatus::Healthy, now);
        }
        let action = m.observe_probe("es", "A", ServiceStatus::Healthy, now);
        match action {
            FailoverAction::Recovered {
                replayed_writes,
                discarded_writes,
                ..
            } => {
                assert_eq!(replayed_writes.len(), 2);
                assert_eq!(replayed_writes[0]["n"], 1);
                assert_eq!(replayed_writes[1]["n"], 2);
                assert_eq!(discarded_writes, 0);
            }
            other => panic!("expected recovery, got {other:?}"),
        }
        assert_eq!(m.pair("es").unwrap().active(), "A");
    }

    #[test]
    fn failover_then_immediate_recovery_restores_primary() {
        let mut m = manager();
        let now = Utc::now();
        m.manual_failover("es", "maintenance", "ops-1");
        assert_eq!(m.pair("es").unwrap().active(), "B");
        m.manual_recovery("es", "maintenance done", "ops-1", now);
        assert_eq!(m.pair("es").unwrap().active(), "A");
        assert_eq!(m.events().len(), 2);
    }

    #[test]
    fn writes_not_buffered_in_normal_state() {
        let mut m = manager();
        assert!(!m.buffer_write("es", serde_json::json!({}), Utc::now()));
    }

    #[test]
    fn expired_buffered_writes_are_discarded() {
        let mut m = manager();
        let now = Utc::now();
        m.manual_failover("es", "test", "ops-1");
        m.buffer_write("es", serde_json::json!({"n": 1}), now);

        let later = now + chrono::Duration::seconds(600);
        let discarded = m.expire_buffered_writes(later);
        assert_eq!(discarded["es"], 1);
        assert_eq!(m.pair("es").unwrap().buffered_count(), 0);
    }

    #[test]
    fn buffer_limit_backpressures() {
        let mut config = ContinuityConfig::default();
        config.failover_buffer_limit = 2;
        let mut m = FailoverManager::new(config);
        m.register("es", "A", "B");
        m.manual_failover("es", "test", "ops-1");
        let now = Utc::now();
        assert!(m.buffer_write("es", serde_json::json!({"n": 1}), now));
        assert!(m.buffer_write("es", serde_json::json!({"n": 2}), now));
        assert!(!m.buffer_write("es", serde_json::json!({"n": 3}), now));
    }
}
