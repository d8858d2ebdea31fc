use serde::{Deserialize, Serialize};

/// The kind of edit captured by a single editlog record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum EditAction {
    Create,
    Update,
    Delete,
    Validate,
    Comment,
}

impl EditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditAction::Create => "create",
            EditAction::Update => "update",
            EditAction::Delete => "delete",
            EditAction::Validate => "validate",
            EditAction::Comment => "comment",
        }
    }
}

impl From<EditAction> for String {
    fn from(action: EditAction) -> Self {
        action.as_str().to_string()
    }
}

impl TryFrom<String> for EditAction {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "create" => Ok(EditAction::Create),
            "update" => Ok(EditAction::Update),
            "delete" => Ok(EditAction::Delete),
            "validate" => Ok(EditAction::Validate),
            "comment" => Ok(EditAction::Comment),
            other => Err(format!("unknown edit action '{}'", other)),
        }
    }
}

impl std::fmt::Display for EditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in the editlog. Immutable once appended; the log is the single
/// source of truth for edits and every other structure is recomputed from it.
///
/// The field names and order are the durable storage contract: any backend
/// must read and write exactly `date, user, action, key, column_name, value`,
/// all as text, with `column_name` and `value` nullable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EditRecord {
    /// Edit time, UTC, ISO-8601. Not guaranteed monotonic across records;
    /// ties are broken by log order during replay.
    pub date: String,
    /// Acting principal, or the "unknown" sentinel.
    pub user: String,
    pub action: EditAction,
    /// Serialized [`crate::key::RowKey`] identifying the target row.
    pub key: String,
    /// Edited column, or None when the action carries no column (delete).
    pub column_name: Option<String>,
    /// New value serialized as a string. None deletes/clears the field.
    pub value: Option<String>,
}
