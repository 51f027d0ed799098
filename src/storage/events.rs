//! Hot event store
//!
//! Persists accepted raw events to Sled. Two trees:
//! - `events`: key `ingest_ts_millis (u64 BE) | event_id`, value JSON
//! - `event_ids`: dedup index, key `event_id`, value primary key
//!
//! Timestamp-prefixed keys give natural chronological ordering; the dedup
//! index enforces exactly-one-stored per `event_id` for webhook replays.

use std::path::Path;
use std::sync::Arc;

use crate::types::RawEvent;

use super::StorageError;

/// Sled-backed store for accepted raw events.
#[derive(Clone)]
pub struct EventStore {
    db: Arc<sled::Db>,
    events: sled::Tree,
    ids: sled::Tree,
}

impl EventStore {
    /// Open or create the event store at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        let events = db.open_tree("events")?;
        let ids = db.open_tree("event_ids")?;
        Ok(Self {
            db: Arc::new(db),
            events,
            ids,
        })
    }

    fn primary_key(event: &RawEvent) -> Vec<u8> {
        let ts = event.ingest_time.timestamp_millis().max(0) as u64;
        let mut key = ts.to_be_bytes().to_vec();
        key.extend_from_slice(event.event_id.as_bytes());
        key
    }

    /// Store an event unless its `event_id` is already present.
    ///
    /// Returns `true` when the event was newly stored, `false` on a
    /// duplicate. Submitting the same `event_id` twice leaves exactly one
    /// record.
    pub fn store_unique(&self, event: &RawEvent) -> Result<bool, StorageError> {
        if self.ids.contains_key(event.event_id.as_bytes())? {
            return Ok(false);
        }
        let key = Self::primary_key(event);
        let value = serde_json::to_vec(event)?;
        self.events.insert(&key, value)?;
        self.ids.insert(event.event_id.as_bytes(), key)?;
        Ok(true)
    }

    /// Look up an event by id.
    pub fn get(&self, event_id: &str) -> Result<Option<RawEvent>, StorageError> {
        let Some(key) = self.ids.get(event_id.as_bytes())? else {
            return Ok(None);
        };
        let Some(value) = self.events.get(&key)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&value)?))
    }

    pub fn contains(&self, event_id: &str) -> Result<bool, StorageError> {
        Ok(self.ids.contains_key(event_id.as_bytes())?)
    }

    /// Most recent N events (newest first).
    pub fn recent(&self, limit: usize) -> Vec<RawEvent> {
        let mut out = Vec::with_capacity(limit);
        for item in self.events.iter().rev() {
            if out.len() >= limit {
                break;
            }
            if let Ok((_k, v)) = item {
                if let Ok(event) = serde_json::from_slice::<RawEvent>(&v) {
                    out.push(event);
                }
            }
        }
        out
    }

    pub fn count(&self) -> usize {
        self.events.len()
    }

    /// Delete events ingested before the cutoff. Returns deleted count.
    ///
    /// Retention enforcement; the dedup index entries are removed with the
    /// primary records so a re-ingest after expiry is accepted again.
    pub fn cleanup_before(&self, cutoff_millis: u64) -> Result<usize, StorageError> {
        let cutoff_key = cutoff_millis.to_be_bytes();
        let mut deleted = 0usize;

        let keys: Vec<(sled::IVec, sled::IVec)> = self
            .events
            .range(..cutoff_key.to_vec())
            .filter_map(Result::ok)
            .collect();

        for (key, value) in keys {
            self.events.remove(&key)?;
            if let Ok(event) = serde_json::from_slice::<RawEvent>(&value) {
                self.ids.remove(event.event_id.as_bytes())?;
            }
            deleted += 1;
        }
        Ok(deleted)
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}
