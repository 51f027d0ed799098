//! Event Fusion Pipeline
//!
//! Takes the stream of normalized raw events from heterogeneous sources
//! and produces (a) resolved entity clusters with merge candidates and
//! (b) fused multi-source events with graded confidence, plus anomaly
//! results from rolling per-zone baselines.

pub mod anomaly;
pub mod engine;
pub mod ingest;
pub mod resolution;

pub use anomaly::{AnomalyDetector, AnomalyResult, BaselineCell};
pub use engine::{default_rules, FusionEngine};
pub use ingest::{DeadLetter, EventIngestor, IngestError, IngestOutcome, IngestStats};
pub use resolution::EntityResolver;
