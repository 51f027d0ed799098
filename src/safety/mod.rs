//! Officer Safety & Proximity Engine
//!
//! Per-officer situational state with timely warnings: proximity to
//! threats, ambush indicators, hotzone entry/exit, missed check-ins and
//! fall detection.

pub mod ambush;
pub mod checkin;
pub mod engine;
pub mod fall;
pub mod hotzone;

pub use ambush::AmbushDetector;
pub use checkin::CheckInRegistry;
pub use engine::{OfficerSafetyEngine, Threat};
pub use fall::FallTracker;
pub use hotzone::{HotzoneTracker, ZoneTransition};
