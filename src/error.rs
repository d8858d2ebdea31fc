use thiserror::Error;

/// A log write failed. The edit is considered not applied; callers should
/// retry or alert, never silently swallow.
#[derive(Debug, Error)]
pub enum AppendError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("editlog store lock poisoned")]
    LockPoisoned,
}

/// Corrupt data encountered while replaying the editlog. Fatal for that
/// replay call; a partial result is never returned.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("malformed key '{key}' in editlog: {reason}")]
    MalformedKey { key: String, reason: String },
}

/// The requested key never appears in the replayed editlog.
#[derive(Debug, Error)]
#[error("no edits found for key '{0}'")]
pub struct NotFoundError(pub String);
