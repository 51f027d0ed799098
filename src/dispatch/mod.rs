//! Auto-Dispatch & Actuator Command Engine
//!
//! Converts trigger events into actuator missions subject to per-trigger
//! rules and guardrail clearance, and drives each actuator through a
//! bounded command state machine with emergency preemption.

pub mod commands;
pub mod engine;
pub mod fleet;

pub use commands::{CommandEngine, CommandError, ENVELOPE_REASON, PREEMPTION_REASON};
pub use engine::{default_rules, AutoDispatchEngine, DispatchOutcome};
pub use fleet::{
    ActuatorRegistry, ActuatorTransport, HttpActuatorTransport, SimulatedTransport,
    TransportError, TransportOutcome,
};
