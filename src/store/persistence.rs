//! Sled-backed persistence for the save record stream

use crate::error::StorageError;
use crate::save::SaveRecord;
use crate::store::SaveStore;
use std::path::Path;
use tracing::debug;

const RECORD_TREE: &str = "records";

/// Keeps the most recently saved record stream in a sled database.
///
/// Records are keyed by their big-endian sequence number, so iteration
/// returns them in the order they were saved.
pub struct SledSaveStore {
    db: sled::Db,
}

impl SledSaveStore {
    /// Open or create a store at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)
            .map_err(|e| StorageError::Database(format!("Failed to open sled database: {}", e)))?;
        Ok(Self { db })
    }

    fn records(&self) -> Result<sled::Tree, StorageError> {
        Ok(self.db.open_tree(RECORD_TREE)?)
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

impl SaveStore for SledSaveStore {
    fn save(&self, records: &[SaveRecord]) -> Result<(), StorageError> {
        let tree = self.records()?;
        let mut batch = sled::Batch::default();
        for item in tree.iter() {
            let (key, _) = item?;
            batch.remove(key);
        }
        for (index, record) in records.iter().enumerate() {
            let value = bincode::serialize(record)?;
            batch.insert((index as u64).to_be_bytes().to_vec(), value);
        }
        tree.apply_batch(batch)?;
        tree.flush()?;
        debug!(records = records.len(), "Saved workspace records");
        Ok(())
    }

    fn load(&self) -> Result<Vec<SaveRecord>, StorageError> {
        let tree = self.records()?;
        let mut records = Vec::new();
        for item in tree.iter() {
            let (key, value) = item?;
            let record: SaveRecord =
                bincode::deserialize(&value).map_err(|e| StorageError::CorruptRecord {
                    key: hex::encode(&key),
                    reason: e.to_string(),
                })?;
            records.push(record);
        }
        debug!(records = records.len(), "Loaded workspace records");
        Ok(records)
    }
}
