//! RTCC Core: Real-Time Crime Center operational engines
//!
//! Six tightly-coupled engines behind one coordinator:
//!
//! - **Event Fusion Pipeline**: entity resolution, anomaly detection,
//!   multi-source correlation, fused-event lifecycle
//! - **Auto-Dispatch & Command Engine**: trigger evaluation, priority
//!   scheduling, actuator command state machine with emergency preemption
//! - **Officer Safety & Proximity Engine**: proximity warnings, ambush
//!   detection, check-in timers, fall-detection lifecycle
//! - **Guardrail & Risk Pipeline**: layered rule precedence, risk and
//!   fairness scoring, human-in-the-loop approval
//! - **Operational Continuity Core**: health checks, failover, redundancy
//!   pools, tamper-evident operations audit log
//! - **Zero-Trust / CJIS Gateway**: per-request policy evaluation,
//!   session lifecycle, federated audit

pub mod access;
pub mod api;
pub mod bus;
pub mod config;
pub mod continuity;
pub mod dispatch;
pub mod fusion;
pub mod geo;
pub mod guardrail;
pub mod pipeline;
pub mod safety;
pub mod storage;
pub mod types;

// Re-export deployment configuration
pub use config::RtccConfig;

// Re-export commonly used types
pub use types::{
    ActuatorCommand, AuditEntry, DispatchRequest, FusedEvent, GuardrailDecision,
    OfficerSafetyStatus, RawEvent, ResolvedEntity, Severity,
};

// Re-export the coordinator and bus
pub use bus::{BusEvent, EventBus};
pub use pipeline::RtccCoordinator;

// Re-export engine entry points
pub use continuity::{AuditLog, AuditSegmentStore};
pub use dispatch::{AutoDispatchEngine, CommandEngine};
pub use fusion::{EntityResolver, EventIngestor, FusionEngine};
pub use guardrail::GuardrailPipeline;
pub use safety::OfficerSafetyEngine;
