//! Anomaly baseline persistence
//!
//! Key: `zone_id | ':' | hour_of_week (u16 BE)`, value: JSON-serialized
//! baseline cell. Written on every persist pass and reloaded at startup.

use std::path::Path;
use std::sync::Arc;

use crate::fusion::BaselineCell;

use super::StorageError;

/// Sled-backed store for anomaly baseline cells.
#[derive(Clone)]
pub struct BaselineStore {
    db: Arc<sled::Db>,
}

impl BaselineStore {
    /// Open or create the baseline store at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Ok(Self { db: Arc::new(db) })
    }

    fn key(zone_id: &str, hour_of_week: u16) -> Vec<u8> {
        let mut key = zone_id.as_bytes().to_vec();
        key.push(b':');
        key.extend_from_slice(&hour_of_week.to_be_bytes());
        key
    }

    /// Upsert a single baseline cell.
    pub fn save(&self, cell: &BaselineCell) -> Result<(), StorageError> {
        let key = Self::key(&cell.zone_id, cell.hour_of_week);
        let value = serde_json::to_vec(cell)?;
        self.db.insert(key, value)?;
        Ok(())
    }

    /// Load every stored cell. Unreadable records are skipped.
    pub fn load_all(&self) -> Vec<BaselineCell> {
        self.db
            .iter()
            .filter_map(Result::ok)
            .filter_map(|(_k, v)| serde_json::from_slice(&v).ok())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.db.len()
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_and_reload_cells() {
        let dir = tempfile::tempdir().unwrap();
        let store = BaselineStore::open(dir.path().join("baselines")).unwrap();

        let mut cell = BaselineCell {
            zone_id: "z1".into(),
            hour_of_week: 42,
            count: 0,
            mean: 0.0,
            m2: 0.0,
            peak: 0.0,
        };
        for v in [10.0, 12.0, 11.0] {
            cell.update(v);
        }
        store.save(&cell).unwrap();

        let loaded = store.load_all();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].hour_of_week, 42);
        assert_eq!(loaded[0].count, 3);
        assert!((loaded[0].mean - 11.0).abs() < 1e-9);
    }
}
