//! Processing Pipeline Module
//!
//! ## Event Flow
//!
//! ```text
//! INGEST:    validate -> dedup -> hot store       (continuous)
//! FUSION:    correlation rules -> fused events    (per source)
//! SAFETY:    threats, ambush, hotzones            (per fused event)
//! GUARDRAIL: clearance for every sortie           (before dispatch)
//! DISPATCH:  trigger rules -> actuator missions   (gated)
//! COMMANDS:  per-actuator lanes with preemption   (worker router)
//! AUDIT:     hash-chained record of every change  (always)
//! ```

mod coordinator;
mod workers;

pub use coordinator::{CoordinatorStats, ProcessOutcome, RtccCoordinator};
pub use workers::{AggregateJob, AggregateRouter, WouldBlock};
