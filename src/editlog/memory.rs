use std::sync::{Arc, RwLock};

use anyhow::Result;

use crate::editlog::EditLogStore;
use crate::error::AppendError;
use crate::record::EditRecord;

/// In-memory editlog. Clones share the same underlying log.
pub struct MemoryEditLog {
    records: Arc<RwLock<Vec<EditRecord>>>,
}

impl MemoryEditLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for MemoryEditLog {
    fn default() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Clone for MemoryEditLog {
    fn clone(&self) -> Self {
        Self {
            records: self.records.clone(),
        }
    }
}

impl EditLogStore for MemoryEditLog {
    fn append(&self, record: &EditRecord) -> Result<(), AppendError> {
        log::debug!(
            "EDITLOG APPEND: action={} key='{}' column={:?}",
            record.action,
            record.key,
            record.column_name
        );
        let mut records = self.records.write().map_err(|_| AppendError::LockPoisoned)?;
        records.push(record.clone());
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<EditRecord>> {
        let records = self
            .records
            .read()
            .map_err(|_| anyhow::anyhow!("Failed to acquire read lock"))?;
        log::debug!("EDITLOG READ: {} records", records.len());
        Ok(records.clone())
    }

    fn clear(&self) -> Result<()> {
        let mut records = self
            .records
            .write()
            .map_err(|_| anyhow::anyhow!("Failed to acquire write lock"))?;
        log::debug!("EDITLOG CLEAR: removing {} records", records.len());
        records.clear();
        Ok(())
    }
}
