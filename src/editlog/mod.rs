mod memory;
mod sqlite;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use crate::error::AppendError;
use crate::record::EditRecord;

pub use memory::MemoryEditLog;
pub use sqlite::SqliteEditLog;

/// An append-only store of edit records. One record is the atomic unit of a
/// write: a record is either fully appended or not at all, never reordered,
/// never silently dropped.
pub trait EditLogStore: Send + Sync {
    fn append(&self, record: &EditRecord) -> Result<(), AppendError>;

    /// Materializes the whole log, in append order, into memory. Replay
    /// always works from one such snapshot so a log growing concurrently
    /// cannot change size mid-computation.
    fn read_all(&self) -> Result<Vec<EditRecord>>;

    /// Destructive maintenance reset. This is the only way to remove records
    /// from the log and is never itself a log entry.
    fn clear(&self) -> Result<()>;
}

/// Which backing store holds the editlog. Decided once at configuration
/// time; implementations never duck-type the backend at call time.
#[derive(Clone, Debug)]
pub enum LogBackend {
    /// Transactional single-row inserts into a SQLite database file.
    Sqlite(PathBuf),
    /// A process-local in-memory log, for tests and ephemeral sessions.
    Memory,
}

pub struct EditLogStoreFactory;

impl EditLogStoreFactory {
    pub fn create(backend: &LogBackend) -> Result<Arc<dyn EditLogStore>> {
        Ok(match backend {
            LogBackend::Sqlite(path) => Arc::new(SqliteEditLog::open(path)?),
            LogBackend::Memory => Arc::new(MemoryEditLog::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_selects_backend() -> Result<()> {
        let store = EditLogStoreFactory::create(&LogBackend::Memory)?;
        assert!(store.read_all()?.is_empty());

        let dir = tempfile::tempdir()?;
        let store = EditLogStoreFactory::create(&LogBackend::Sqlite(dir.path().join("log.db")))?;
        assert!(store.read_all()?.is_empty());
        Ok(())
    }
}
