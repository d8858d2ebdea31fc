pub mod editlog;
pub mod editor;
pub mod error;
pub mod key;
pub mod merge;
pub mod record;
pub mod replay;
pub mod schema;
pub mod table;

pub use editlog::{EditLogStore, EditLogStoreFactory, LogBackend, MemoryEditLog, SqliteEditLog};
pub use editor::{DataEditor, EditOutcome, EditorConfig, ValidationLock};
pub use error::{AppendError, NotFoundError, ReplayError};
pub use key::RowKey;
pub use merge::apply_edits;
pub use record::{EditAction, EditRecord};
pub use replay::replay_edits;
pub use schema::{ColumnDef, ColumnType, EditSchema};
pub use table::{Row, Table};

pub use rusqlite;
pub use serde_rusqlite;
