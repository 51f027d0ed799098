//! Persistent stores backed by Sled
//!
//! - `EventStore`: hot store for accepted raw events with `event_id`
//!   dedup and time-based retention
//! - `BaselineStore`: anomaly baselines that must survive restart

mod baselines;
mod events;

pub use baselines::BaselineStore;
pub use events::EventStore;

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
