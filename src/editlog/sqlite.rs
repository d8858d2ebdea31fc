use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use rusqlite::Connection;

use crate::editlog::EditLogStore;
use crate::error::AppendError;
use crate::record::EditRecord;

/// SQLite-backed editlog. Each append is a single-row transactional insert;
/// the `seq` rowid is the authoritative log order. The connection sits
/// behind a `Mutex` rather than a `RwLock` because `Connection` is not
/// `Sync`: reads prepare statements through the same handle as writes.
#[derive(Clone)]
pub struct SqliteEditLog {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteEditLog {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS editlog (
                seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                date        TEXT NOT NULL,
                user        TEXT NOT NULL,
                action      TEXT NOT NULL,
                key         TEXT NOT NULL,
                column_name TEXT,
                value       TEXT
            );
        ",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl EditLogStore for SqliteEditLog {
    fn append(&self, record: &EditRecord) -> Result<(), AppendError> {
        let mut conn = self.conn.lock().map_err(|_| AppendError::LockPoisoned)?;
        let tx = conn.transaction()?;
        log::debug!(
            "SQL EXECUTE: INSERT INTO editlog (date, user, action, key, column_name, value) VALUES (?, ?, ?, ?, ?, ?)"
        );
        let affected = tx.execute(
            "INSERT INTO editlog (date, user, action, key, column_name, value) VALUES (?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                record.date,
                record.user,
                record.action.as_str(),
                record.key,
                record.column_name,
                record.value,
            ],
        )?;
        tx.commit()?;
        log::debug!("SQL EXECUTE RESULT: {} rows affected", affected);
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<EditRecord>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Failed to acquire connection lock"))?;
        let mut stmt = conn.prepare(
            "SELECT date, user, action, key, column_name, value FROM editlog ORDER BY seq",
        )?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(serde_rusqlite::from_row::<EditRecord>(row)?);
        }
        log::debug!("EDITLOG READ: {} records", records.len());
        Ok(records)
    }

    fn clear(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Failed to acquire connection lock"))?;
        log::debug!("SQL EXECUTE: DELETE FROM editlog");
        let affected = conn.execute("DELETE FROM editlog", [])?;
        log::debug!("SQL EXECUTE RESULT: {} rows affected", affected);
        Ok(())
    }
}
