//! Actuator Command Engine - bounded per-actuator command state machine
//!
//! Each actuator owns an ordered FIFO queue plus an optional active slot.
//! Guarantees:
//! - at most one command in `executing` per actuator
//! - an `emergency` command cancels the active command and all queued
//!   commands (reason `preempted_by_emergency`) and runs immediately
//! - commands carry a per-type timeout; on expiry the command fails and
//!   the next queued command is considered
//! - any motion command is clamped to the altitude/speed envelope and,
//!   when geofencing is enabled, the configured polygon; violations fail
//!   the command with reason `envelope_violation` before it queues

use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::geo;
use crate::types::{
    ActuatorCommand, CommandMetrics, CommandParameters, CommandPriority, CommandStatus,
    CommandType, GeoPoint,
};

use super::fleet::{ActuatorTransport, TransportError, TransportOutcome};

pub const PREEMPTION_REASON: &str = "preempted_by_emergency";
pub const ENVELOPE_REASON: &str = "envelope_violation";

/// Why a command was not accepted into the queue.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("envelope_violation: {0}")]
    EnvelopeViolation(String),

    #[error("queue full for actuator {0}")]
    QueueFull(String),
}

/// Per-actuator queue and active slot.
#[derive(Default)]
struct ActuatorLane {
    queue: VecDeque<ActuatorCommand>,
    active: Option<ActuatorCommand>,
}

/// Command engine: owns all per-actuator lanes and drives the transport.
pub struct CommandEngine {
    config: DispatchConfig,
    transport: Arc<dyn ActuatorTransport>,
    lanes: HashMap<String, ActuatorLane>,
    history: VecDeque<ActuatorCommand>,
    metrics: CommandMetrics,
}

const MAX_QUEUE_PER_ACTUATOR: usize = 100;
const HISTORY_SIZE: usize = 10_000;

impl CommandEngine {
    pub fn new(config: DispatchConfig, transport: Arc<dyn ActuatorTransport>) -> Self {
        Self {
            config,
            transport,
            lanes: HashMap::new(),
            history: VecDeque::with_capacity(HISTORY_SIZE),
            metrics: CommandMetrics::default(),
        }
    }

    /// Build a command with per-type timeout and a fresh id.
    pub fn build_command(
        &self,
        actuator_id: &str,
        command_type: CommandType,
        priority: CommandPriority,
        parameters: CommandParameters,
        operator_id: Option<String>,
        mission_id: Option<String>,
    ) -> ActuatorCommand {
        ActuatorCommand {
            command_id: format!("cmd-{}", short_id()),
            actuator_id: actuator_id.to_string(),
            command_type,
            status: CommandStatus::Pending,
            priority,
            parameters,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            timeout_secs: command_type.default_timeout_secs(),
            operator_id,
            mission_id,
            error_message: None,
        }
    }

    /// Submit a command. Emergency priority preempts; everything else
    /// appends FIFO. Returns the submitted command's id.
    ///
    /// The caller should follow with [`CommandEngine::pump`] for the
    /// actuator to drive execution.
    pub fn submit(&mut self, mut command: ActuatorCommand) -> Result<String, CommandError> {
        if let Err(reason) = self.check_envelope(&command) {
            command.status = CommandStatus::Failed;
            command.error_message = Some(format!("{ENVELOPE_REASON}: {reason}"));
            command.completed_at = Some(Utc::now());
            warn!(
                command_id = %command.command_id,
                actuator_id = %command.actuator_id,
                reason = %reason,
                "Command rejected by envelope check"
            );
            let id = command.command_id.clone();
            self.finish(command);
            return Err(CommandError::EnvelopeViolation(id));
        }

        let lane = self.lanes.entry(command.actuator_id.clone()).or_default();

        if command.priority == CommandPriority::Emergency {
            // Preempt: cancel active and flush the queue.
            if let Some(mut active) = lane.active.take() {
                active.status = CommandStatus::Cancelled;
                active.error_message = Some(PREEMPTION_REASON.to_string());
                active.completed_at = Some(Utc::now());
                info!(
                    cancelled = %active.command_id,
                    by = %command.command_id,
                    "Active command preempted by emergency"
                );
                self.history_push(active);
            }
            let lane = self.lanes.entry(command.actuator_id.clone()).or_default();
            let flushed: Vec<ActuatorCommand> = lane.queue.drain(..).collect();
            for mut queued in flushed {
                queued.status = CommandStatus::Cancelled;
                queued.error_message = Some(PREEMPTION_REASON.to_string());
                queued.completed_at = Some(Utc::now());
                self.history_push(queued);
            }
            let lane = self.lanes.entry(command.actuator_id.clone()).or_default();
            command.status = CommandStatus::Queued;
            let id = command.command_id.clone();
            lane.queue.push_back(command);
            self.metrics.total_commands += 1;
            self.refresh_metrics();
            return Ok(id);
        }

        if lane.queue.len() >= MAX_QUEUE_PER_ACTUATOR {
            return Err(CommandError::QueueFull(command.actuator_id));
        }

        command.status = CommandStatus::Queued;
        let id = command.command_id.clone();
        debug!(
            command_id = %id,
            actuator_id = %command.actuator_id,
            command_type = %command.command_type,
            "Command queued"
        );
        lane.queue.push_back(command);
        self.metrics.total_commands += 1;
        self.refresh_metrics();
        Ok(id)
    }

    /// Drive the actuator's lane: if idle, pop the next queued command and
    /// execute it through the transport to a terminal status.
    ///
    /// Per-actuator serialization holds because a lane executes at most
    /// one command at a time and `pump` is called from that actuator's
    /// worker.
    pub async fn pump(&mut self, actuator_id: &str) -> Option<ActuatorCommand> {
        let lane = self.lanes.get_mut(actuator_id)?;
        if lane.active.is_some() {
            return None;
        }
        let mut command = lane.queue.pop_front()?;

        command.status = CommandStatus::Executing;
        command.started_at = Some(Utc::now());
        lane.active = Some(command.clone());
        self.refresh_metrics();

        let timeout = Duration::from_secs(command.timeout_secs);
        let result = tokio::time::timeout(timeout, self.transport.execute(&command)).await;

        let mut finished = command;
        match result {
            Ok(Ok(TransportOutcome::Completed)) => {
                finished.status = CommandStatus::Completed;
            }
            Ok(Ok(TransportOutcome::Failed)) => {
                finished.status = CommandStatus::Failed;
                finished.error_message = Some("actuator reported failure".into());
            }
            Ok(Err(e)) => {
                finished = self.handle_transport_error(finished, &e).await;
            }
            Err(_elapsed) => {
                finished.status = CommandStatus::Timeout;
                finished.error_message =
                    Some(format!("timed out after {}s", finished.timeout_secs));
                warn!(command_id = %finished.command_id, "Command timed out");
            }
        }
        finished.completed_at = Some(Utc::now());

        // Release the active slot. The lane may have been preempted while
        // the transport call was in flight; only clear our own command.
        if let Some(lane) = self.lanes.get_mut(actuator_id) {
            if lane
                .active
                .as_ref()
                .is_some_and(|a| a.command_id == finished.command_id)
            {
                lane.active = None;
            }
        }

        info!(
            command_id = %finished.command_id,
            actuator_id = %finished.actuator_id,
            status = ?finished.status,
            "Command finished"
        );
        self.finish(finished.clone());
        Some(finished)
    }

    /// Retry applies to non-motion commands only; one immediate retry.
    async fn handle_transport_error(
        &self,
        mut command: ActuatorCommand,
        error: &TransportError,
    ) -> ActuatorCommand {
        if command.command_type.is_retryable() {
            debug!(command_id = %command.command_id, error = %error, "Retrying non-motion command");
            match self.transport.execute(&command).await {
                Ok(TransportOutcome::Completed) => {
                    command.status = CommandStatus::Completed;
                    return command;
                }
                Ok(TransportOutcome::Failed) | Err(_) => {}
            }
        }
        command.status = CommandStatus::Failed;
        command.error_message = Some(error.to_string());
        command
    }

    /// Cancel a queued command by id. Executing commands cancel via the
    /// transport and settle when their lane pump observes the result.
    pub async fn cancel(&mut self, command_id: &str) -> bool {
        let mut removed: Option<ActuatorCommand> = None;
        for lane in self.lanes.values_mut() {
            if let Some(pos) = lane.queue.iter().position(|c| c.command_id == command_id) {
                removed = lane.queue.remove(pos);
                break;
            }
        }
        if let Some(mut cmd) = removed {
            cmd.status = CommandStatus::Cancelled;
            cmd.completed_at = Some(Utc::now());
            self.history_push(cmd);
            self.refresh_metrics();
            return true;
        }

        let active_on = self.lanes.iter().find_map(|(id, lane)| {
            lane.active
                .as_ref()
                .filter(|a| a.command_id == command_id)
                .map(|_| id.clone())
        });
        if let Some(actuator_id) = active_on {
            let _ = self.transport.cancel(&actuator_id, command_id).await;
            return true;
        }
        false
    }

    fn check_envelope(&self, command: &ActuatorCommand) -> Result<(), String> {
        if !command.command_type.is_motion() {
            return Ok(());
        }
        let p = &command.parameters;

        if let Some(alt) = p.target_altitude_m {
            if alt < self.config.min_altitude_m || alt > self.config.max_altitude_m {
                return Err(format!(
                    "altitude {alt} outside [{}, {}]",
                    self.config.min_altitude_m, self.config.max_altitude_m
                ));
            }
        }
        if let Some(speed) = p.speed_mps {
            if speed > self.config.max_speed_mps {
                return Err(format!(
                    "speed {speed} exceeds max {}",
                    self.config.max_speed_mps
                ));
            }
        }
        for wp in &p.waypoints {
            if wp.altitude_m < self.config.min_altitude_m
                || wp.altitude_m > self.config.max_altitude_m
            {
                return Err(format!("waypoint altitude {} outside envelope", wp.altitude_m));
            }
        }

        if self.config.geofence_enabled && !self.config.geofence_polygon.is_empty() {
            let fence: Vec<GeoPoint> = self
                .config
                .geofence_polygon
                .iter()
                .map(|(lat, lon)| GeoPoint::new(*lat, *lon))
                .collect();
            let mut points: Vec<GeoPoint> = Vec::new();
            if let Some(t) = p.target {
                points.push(t);
            }
            points.extend(p.waypoints.iter().map(|w| w.point));
            for pt in points {
                if !geo::point_in_polygon(pt, &fence) {
                    return Err(format!(
                        "point ({}, {}) outside geofence",
                        pt.lat, pt.lon
                    ));
                }
            }
        }
        Ok(())
    }

    fn finish(&mut self, command: ActuatorCommand) {
        self.history_push(command);
        self.refresh_metrics();
    }

    fn history_push(&mut self, command: ActuatorCommand) {
        if self.history.len() >= HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(command);
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn active_command(&self, actuator_id: &str) -> Option<&ActuatorCommand> {
        self.lanes.get(actuator_id)?.active.as_ref()
    }

    pub fn queued_commands(&self, actuator_id: &str) -> Vec<&ActuatorCommand> {
        self.lanes
            .get(actuator_id)
            .map(|l| l.queue.iter().collect())
            .unwrap_or_default()
    }

    pub fn history(&self, limit: usize) -> Vec<&ActuatorCommand> {
        self.history.iter().rev().take(limit).collect()
    }

    pub fn find(&self, command_id: &str) -> Option<&ActuatorCommand> {
        self.lanes
            .values()
            .flat_map(|l| l.queue.iter().chain(l.active.iter()))
            .chain(self.history.iter())
            .find(|c| c.command_id == command_id)
    }

    pub fn metrics(&self) -> &CommandMetrics {
        &self.metrics
    }

    /// Actuators with work pending, for the worker router.
    pub fn busy_actuators(&self) -> Vec<String> {
        self.lanes
            .iter()
            .filter(|(_, lane)| !lane.queue.is_empty() || lane.active.is_some())
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn refresh_metrics(&mut self) {
        self.metrics.queued_commands = self.lanes.values().map(|l| l.queue.len()).sum();
        self.metrics.executing_commands =
            self.lanes.values().filter(|l| l.active.is_some()).count();

        let mut by_type = std::collections::BTreeMap::new();
        let mut by_status = std::collections::BTreeMap::new();
        let mut completed = 0u64;
        let mut failed = 0u64;
        for c in &self.history {
            *by_type.entry(c.command_type.to_string()).or_insert(0) += 1;
            let status = format!("{:?}", c.status).to_lowercase();
            *by_status.entry(status).or_insert(0) += 1;
            match c.status {
                CommandStatus::Completed => completed += 1,
                CommandStatus::Failed | CommandStatus::Timeout => failed += 1,
                _ => {}
            }
        }
        self.metrics.commands_by_type = by_type;
        self.metrics.commands_by_status = by_status;
        self.metrics.completed_commands = completed;
        self.metrics.failed_commands = failed;
    }
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}
