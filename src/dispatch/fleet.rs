//! Actuator fleet registry and transport seam
//!
//! The registry tracks actuator capability, battery and position for
//! selection. `ActuatorTransport` is the trait boundary to the external
//! actuator control plane; the engine drives it and expects a terminal
//! status (or timeout) per command.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::geo;
use crate::types::{Actuator, ActuatorCommand, GeoPoint};

/// Transport-level failure when driving an actuator.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("actuator unreachable: {0}")]
    Unreachable(String),

    #[error("actuator rejected command: {0}")]
    Rejected(String),

    #[error("transport timeout after {0:?}")]
    Timeout(Duration),
}

/// Terminal outcome reported by the transport for one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportOutcome {
    Completed,
    Failed,
}

/// Boundary to the external actuator control plane.
#[async_trait]
pub trait ActuatorTransport: Send + Sync {
    /// Deliver a command and wait for its terminal status.
    async fn execute(&self, command: &ActuatorCommand) -> Result<TransportOutcome, TransportError>;

    /// Tell the actuator to abandon the identified command, if running.
    async fn cancel(&self, actuator_id: &str, command_id: &str) -> Result<(), TransportError>;
}

/// HTTP transport speaking JSON to a fleet control endpoint.
pub struct HttpActuatorTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpActuatorTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ActuatorTransport for HttpActuatorTransport {
    async fn execute(&self, command: &ActuatorCommand) -> Result<TransportOutcome, TransportError> {
        let url = format!(
            "{}/actuators/{}/commands",
            self.base_url, command.actuator_id
        );
        let response = self
            .client
            .post(&url)
            .json(command)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(Duration::from_secs(command.timeout_secs))
                } else {
                    TransportError::Unreachable(e.to_string())
                }
            })?;

        if response.status().is_success() {
            Ok(TransportOutcome::Completed)
        } else if response.status().is_client_error() {
            Err(TransportError::Rejected(format!(
                "status {}",
                response.status()
            )))
        } else {
            warn!(actuator_id = %command.actuator_id, status = %response.status(), "transport 5xx");
            Ok(TransportOutcome::Failed)
        }
    }

    async fn cancel(&self, actuator_id: &str, command_id: &str) -> Result<(), TransportError> {
        let url = format!(
            "{}/actuators/{actuator_id}/commands/{command_id}",
            self.base_url
        );
        self.client
            .delete(&url)
            .send()
            .await
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;
        Ok(())
    }
}

/// In-process transport for tests and simulation runs. Always completes.
#[derive(Default)]
pub struct SimulatedTransport;

#[async_trait]
impl ActuatorTransport for SimulatedTransport {
    async fn execute(&self, command: &ActuatorCommand) -> Result<TransportOutcome, TransportError> {
        debug!(
            command_id = %command.command_id,
            actuator_id = %command.actuator_id,
            command_type = %command.command_type,
            "simulated execute"
        );
        Ok(TransportOutcome::Completed)
    }

    async fn cancel(&self, _actuator_id: &str, _command_id: &str) -> Result<(), TransportError> {
        Ok(())
    }
}

// ============================================================================
// Registry
// ============================================================================

/// A ranked candidate from actuator selection.
#[derive(Debug, Clone)]
pub struct SelectionCandidate {
    pub actuator_id: String,
    pub distance_m: f64,
    pub eta_seconds: f64,
}

/// In-memory registry of known actuators and their last reported state.
#[derive(Default)]
pub struct ActuatorRegistry {
    actuators: HashMap<String, Actuator>,
}

impl ActuatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, actuator: Actuator) {
        self.actuators.insert(actuator.actuator_id.clone(), actuator);
    }

    pub fn get(&self, actuator_id: &str) -> Option<&Actuator> {
        self.actuators.get(actuator_id)
    }

    pub fn set_available(&mut self, actuator_id: &str, available: bool) {
        if let Some(a) = self.actuators.get_mut(actuator_id) {
            a.available = available;
        }
    }

    pub fn update_telemetry(
        &mut self,
        actuator_id: &str,
        battery_percent: f64,
        location: GeoPoint,
    ) {
        if let Some(a) = self.actuators.get_mut(actuator_id) {
            a.battery_percent = battery_percent;
            a.location = location;
        }
    }

    pub fn len(&self) -> usize {
        self.actuators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actuators.is_empty()
    }

    /// Candidates satisfying capabilities and battery within the radius,
    /// ranked by ETA at each actuator's cruise speed.
    pub fn select(
        &self,
        target: GeoPoint,
        required_capabilities: &[String],
        min_battery_percent: f64,
        radius_km: f64,
    ) -> Vec<SelectionCandidate> {
        let mut candidates: Vec<SelectionCandidate> = self
            .actuators
            .values()
            .filter(|a| a.available)
            .filter(|a| a.battery_percent >= min_battery_percent)
            .filter(|a| {
                required_capabilities
                    .iter()
                    .all(|cap| a.capabilities.iter().any(|c| c == cap))
            })
            .filter_map(|a| {
                let distance_m = geo::distance_m(a.location, target);
                if distance_m <= radius_km * 1000.0 {
                    let speed = a.cruise_speed_mps.max(1.0);
                    Some(SelectionCandidate {
                        actuator_id: a.actuator_id.clone(),
                        distance_m,
                        eta_seconds: distance_m / speed,
                    })
                } else {
                    None
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.eta_seconds
                .partial_cmp(&b.eta_seconds)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates
    }
}
