use std::sync::Arc;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;

use crate::editlog::EditLogStore;
use crate::error::NotFoundError;
use crate::key::{value_to_key_string, RowKey};
use crate::merge::apply_edits;
use crate::record::{EditAction, EditRecord};
use crate::replay::replay_edits;
use crate::schema::{ColumnType, EditSchema};
use crate::table::{Row, Table};

/// Outcome of one edit submission. Authorization refusals and semantic
/// rejections are expected cases, not system faults, so they are values
/// rather than errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EditOutcome {
    Success,
    Failure(String),
    Unauthorized,
}

impl EditOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, EditOutcome::Success)
    }
}

/// What a validate action freezes. The exact lock semantics vary between
/// deployments, so they are configuration rather than hard-coded behavior.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ValidationLock {
    /// One validate record per editable column, freezing the row context the
    /// caller observed at validation time.
    #[default]
    AllEditable,
    /// A single validate record with no column payload; only the validation
    /// flag and metadata change.
    FlagOnly,
}

#[derive(Clone, Debug)]
pub struct EditorConfig {
    pub primary_keys: Vec<String>,
    pub editable_columns: Vec<String>,
    /// Column end users write free-text notes into. Edits targeting it are
    /// stored with the comment action.
    pub notes_column: Option<String>,
    pub validation_lock: ValidationLock,
    /// Allow-list of principals permitted to edit. None authorizes everyone.
    pub authorized_users: Option<Vec<String>>,
}

impl EditorConfig {
    pub fn new(primary_keys: &[&str], editable_columns: &[&str]) -> Self {
        Self {
            primary_keys: primary_keys.iter().map(|s| s.to_string()).collect(),
            editable_columns: editable_columns.iter().map(|s| s.to_string()).collect(),
            notes_column: None,
            validation_lock: ValidationLock::default(),
            authorized_users: None,
        }
    }
}

type UserResolver = Box<dyn Fn() -> Option<String> + Send + Sync>;

/// CRUD access to a read-only baseline table using the event sourcing
/// pattern: edits append records to an editlog and the edited state is
/// recomputed from baseline plus log on every read. The baseline itself is
/// never mutated.
pub struct DataEditor {
    baseline: Table,
    schema: EditSchema,
    notes_column: Option<String>,
    validation_lock: ValidationLock,
    authorized_users: Option<Vec<String>>,
    editlog: Arc<dyn EditLogStore>,
    user_resolver: UserResolver,
}

impl DataEditor {
    pub fn new(baseline: Table, editlog: Arc<dyn EditLogStore>, config: EditorConfig) -> Self {
        // Declared editable columns that the baseline doesn't carry can never
        // be displayed or merged; drop them up front.
        let editable_columns: Vec<String> = config
            .editable_columns
            .into_iter()
            .filter(|c| {
                let present = baseline.column(c).is_some();
                if !present {
                    log::warn!("Editable column {} not found in the baseline. Ignoring it.", c);
                }
                present
            })
            .collect();
        Self {
            schema: EditSchema {
                primary_keys: config.primary_keys,
                editable_columns,
            },
            baseline,
            notes_column: config.notes_column,
            validation_lock: config.validation_lock,
            authorized_users: config.authorized_users,
            editlog,
            user_resolver: Box::new(|| None),
        }
    }

    /// Sets how the acting principal is resolved, e.g. from request headers
    /// in a web backend. An unresolvable user is recorded as "unknown" and
    /// refused whenever an allow-list is configured.
    pub fn with_user_resolver(
        mut self,
        resolver: impl Fn() -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.user_resolver = Box::new(resolver);
        self
    }

    pub fn schema(&self) -> &EditSchema {
        &self.schema
    }

    pub fn baseline(&self) -> &Table {
        &self.baseline
    }

    /// Creates a new row: one create record per provided column, all sharing
    /// one serialized key.
    pub fn create_row(&self, primary_keys: &Row, column_values: &Row) -> Result<Vec<EditOutcome>> {
        let key = RowKey::from_row(primary_keys, &self.schema.primary_keys)?;
        Ok(column_values
            .iter()
            .map(|(column, value)| {
                self.append_to_editlog(&key, Some(column), value_to_log_string(value), EditAction::Create)
            })
            .collect())
    }

    /// Updates one cell of one row.
    pub fn update_row(&self, primary_keys: &Row, column: &str, value: &Value) -> Result<EditOutcome> {
        let key = RowKey::from_row(primary_keys, &self.schema.primary_keys)?;
        Ok(self.append_to_editlog(&key, Some(column), value_to_log_string(value), EditAction::Update))
    }

    /// Marks a row deleted. Deletes carry no column and bypass column
    /// validation; they are resolved into merge invisibility on read.
    pub fn delete_row(&self, primary_keys: &Row) -> Result<EditOutcome> {
        let key = RowKey::from_row(primary_keys, &self.schema.primary_keys)?;
        Ok(self.append_to_editlog(&key, None, None, EditAction::Delete))
    }

    /// Writes free-text notes for a row.
    pub fn comment_row(&self, primary_keys: &Row, notes: &str) -> Result<EditOutcome> {
        let key = RowKey::from_row(primary_keys, &self.schema.primary_keys)?;
        let column = self.notes_column.clone();
        Ok(self.append_to_editlog(
            &key,
            column.as_deref(),
            Some(notes.to_string()),
            EditAction::Comment,
        ))
    }

    /// Validates a row. With [`ValidationLock::AllEditable`] this logs the
    /// provided value of every editable column, so later recomputation of
    /// non-edited columns cannot silently overwrite the validated snapshot.
    pub fn validate_row(&self, row: &Row) -> Result<Vec<EditOutcome>> {
        let key = RowKey::from_row(row, &self.schema.primary_keys)?;
        match self.validation_lock {
            ValidationLock::AllEditable => Ok(self
                .schema
                .editable_columns
                .iter()
                .map(|column| {
                    let value = row.get(column).cloned().unwrap_or(Value::Null);
                    self.append_to_editlog(
                        &key,
                        Some(column),
                        value_to_log_string(&value),
                        EditAction::Validate,
                    )
                })
                .collect()),
            ValidationLock::FlagOnly => {
                Ok(vec![self.append_to_editlog(&key, None, None, EditAction::Validate)])
            }
        }
    }

    /// Returns the replayed row for a key: only ever-touched data, never
    /// baseline-only rows. Fails with [`NotFoundError`] if the key never
    /// appears in the log.
    pub fn get_row(&self, primary_keys: &Row) -> Result<Row> {
        let key = RowKey::from_row(primary_keys, &self.schema.primary_keys)?;
        let edited = self.get_edited_cells()?;
        for row in edited.rows() {
            if RowKey::from_row(row, &self.schema.primary_keys)? == key {
                return Ok(row.clone());
            }
        }
        Err(NotFoundError(key.serialize()).into())
    }

    /// Replays the editlog: one row per edited key, last value per cell.
    pub fn get_edited_cells(&self) -> Result<Table> {
        let records = self.editlog.read_all()?;
        Ok(replay_edits(&records, &self.schema)?)
    }

    /// The current view: baseline with all edits applied, created rows
    /// included, deleted rows removed.
    pub fn get_merged_view(&self) -> Result<Table> {
        let replayed = self.get_edited_cells()?;
        Ok(apply_edits(&self.baseline, &replayed, &self.schema))
    }

    /// Raw editlog contents, in append order.
    pub fn get_editlog(&self) -> Result<Vec<EditRecord>> {
        self.editlog.read_all()
    }

    /// Destructive maintenance reset of the editlog. Not itself a log entry.
    pub fn empty_editlog(&self) -> Result<()> {
        self.editlog.clear()
    }

    fn append_to_editlog(
        &self,
        key: &RowKey,
        column: Option<&str>,
        value: Option<String>,
        action: EditAction,
    ) -> EditOutcome {
        let value = self.normalize_boolean(column, value);

        let user = (self.user_resolver)();
        if let Some(authorized) = &self.authorized_users {
            let allowed = user.as_ref().map(|u| authorized.contains(u)).unwrap_or(false);
            if !allowed {
                log::debug!(
                    "Logging {} action unauthorized ('{}'): column {:?} where key is '{}'.",
                    action,
                    user.as_deref().unwrap_or("unknown"),
                    column,
                    key.serialize()
                );
                return EditOutcome::Unauthorized;
            }
        }

        let column_allowed = match column {
            // Deletes carry no column; a flag-only validate or a comment
            // without a configured notes column don't either.
            None => matches!(
                action,
                EditAction::Delete | EditAction::Validate | EditAction::Comment
            ),
            Some(c) => {
                action == EditAction::Comment
                    || self.schema.is_editable(c)
                    || self.notes_column.as_deref() == Some(c)
            }
        };
        if !column_allowed {
            let column = column.unwrap_or("<none>");
            log::info!(
                "Logging {} action failed: column {} where key is '{}'.",
                action,
                column,
                key.serialize()
            );
            return EditOutcome::Failure(format!("{} isn't an editable column.", column));
        }

        // Edits targeting the notes column are always stored as comments.
        let action = if column.is_some() && column == self.notes_column.as_deref() {
            EditAction::Comment
        } else {
            action
        };

        let record = EditRecord {
            date: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            user: user.unwrap_or_else(|| "unknown".to_string()),
            action,
            key: key.serialize(),
            column_name: column.map(|c| c.to_string()),
            value,
        };
        match self.editlog.append(&record) {
            Ok(()) => {
                log::debug!(
                    "Logging {} action success: column {:?} set to value {:?} where key is '{}'.",
                    action,
                    record.column_name,
                    record.value,
                    record.key
                );
                EditOutcome::Success
            }
            Err(e) => {
                log::error!("Failed to append edit log: {}", e);
                EditOutcome::Failure("Internal error, failed to append edit log.".to_string())
            }
        }
    }

    /// Boolean columns accept whatever casing a client sends; stored values
    /// are normalized to "true"/"false", and the empty string clears the
    /// cell.
    fn normalize_boolean(&self, column: Option<&str>, value: Option<String>) -> Option<String> {
        let Some(column) = column else { return value };
        let is_boolean = self
            .baseline
            .column(column)
            .map(|c| c.column_type == ColumnType::Boolean)
            .unwrap_or(false);
        if !is_boolean {
            return value;
        }
        match value {
            None => None,
            Some(s) if s.is_empty() => None,
            Some(s) => match s.to_lowercase().as_str() {
                "true" => Some("true".to_string()),
                "false" => Some("false".to_string()),
                _ => {
                    log::warn!(
                        "Value '{}' for boolean column {} is not a boolean. Keeping it as-is.",
                        s,
                        column
                    );
                    Some(s)
                }
            },
        }
    }
}

fn value_to_log_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        other => Some(value_to_key_string(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editlog::MemoryEditLog;
    use crate::schema::ColumnDef;
    use serde_json::json;

    fn baseline() -> Table {
        let mut table = Table::new(vec![
            ColumnDef::new("id", ColumnType::String),
            ColumnDef::new("status", ColumnType::String),
            ColumnDef::new("in_promo", ColumnType::Boolean),
            ColumnDef::new("notes", ColumnType::String),
        ]);
        let mut row = Row::new();
        row.insert("id".to_string(), json!("A"));
        row.insert("status".to_string(), json!("pending"));
        row.insert("in_promo".to_string(), json!(false));
        row.insert("notes".to_string(), Value::Null);
        table.push_row(row);
        table
    }

    fn config() -> EditorConfig {
        let mut config = EditorConfig::new(&["id"], &["status", "in_promo"]);
        config.notes_column = Some("notes".to_string());
        config
    }

    fn editor(log: &MemoryEditLog, config: EditorConfig) -> DataEditor {
        DataEditor::new(baseline(), Arc::new(log.clone()), config)
            .with_user_resolver(|| Some("u1".to_string()))
    }

    fn keys(id: &str) -> Row {
        let mut row = Row::new();
        row.insert("id".to_string(), json!(id));
        row
    }

    #[test]
    fn update_appends_one_record() -> Result<()> {
        let log = MemoryEditLog::new();
        let editor = editor(&log, config());
        let outcome = editor.update_row(&keys("A"), "status", &json!("approved"))?;
        assert!(outcome.is_success());
        let records = log.read_all()?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, EditAction::Update);
        assert_eq!(records[0].key, "A");
        assert_eq!(records[0].column_name.as_deref(), Some("status"));
        assert_eq!(records[0].value.as_deref(), Some("approved"));
        assert_eq!(records[0].user, "u1");
        Ok(())
    }

    #[test]
    fn unauthorized_user_is_refused_before_append() -> Result<()> {
        let log = MemoryEditLog::new();
        let mut config = config();
        config.authorized_users = Some(vec!["someone-else".to_string()]);
        let editor = editor(&log, config);
        let outcome = editor.update_row(&keys("A"), "status", &json!("approved"))?;
        assert_eq!(outcome, EditOutcome::Unauthorized);
        assert!(log.read_all()?.is_empty());
        Ok(())
    }

    #[test]
    fn unresolvable_user_is_refused_when_allow_list_is_set() -> Result<()> {
        let log = MemoryEditLog::new();
        let mut config = config();
        config.authorized_users = Some(vec!["u1".to_string()]);
        let editor = DataEditor::new(baseline(), Arc::new(log.clone()), config);
        let outcome = editor.update_row(&keys("A"), "status", &json!("approved"))?;
        assert_eq!(outcome, EditOutcome::Unauthorized);
        assert!(log.read_all()?.is_empty());
        Ok(())
    }

    #[test]
    fn allow_listed_user_may_edit() -> Result<()> {
        let log = MemoryEditLog::new();
        let mut config = config();
        config.authorized_users = Some(vec!["u1".to_string()]);
        let editor = editor(&log, config);
        assert!(editor.update_row(&keys("A"), "status", &json!("x"))?.is_success());
        Ok(())
    }

    #[test]
    fn unresolvable_user_is_recorded_as_unknown() -> Result<()> {
        let log = MemoryEditLog::new();
        let editor = DataEditor::new(baseline(), Arc::new(log.clone()), config());
        editor.update_row(&keys("A"), "status", &json!("x"))?;
        assert_eq!(log.read_all()?[0].user, "unknown");
        Ok(())
    }

    #[test]
    fn non_editable_column_is_rejected_without_append() -> Result<()> {
        let log = MemoryEditLog::new();
        let editor = editor(&log, config());
        let outcome = editor.update_row(&keys("A"), "id", &json!("B"))?;
        assert_eq!(
            outcome,
            EditOutcome::Failure("id isn't an editable column.".to_string())
        );
        assert!(log.read_all()?.is_empty());
        Ok(())
    }

    #[test]
    fn delete_bypasses_column_validation() -> Result<()> {
        let log = MemoryEditLog::new();
        let editor = editor(&log, config());
        assert!(editor.delete_row(&keys("A"))?.is_success());
        let records = log.read_all()?;
        assert_eq!(records[0].action, EditAction::Delete);
        assert_eq!(records[0].column_name, None);
        Ok(())
    }

    #[test]
    fn notes_edits_are_stored_as_comments() -> Result<()> {
        let log = MemoryEditLog::new();
        let editor = editor(&log, config());
        editor.update_row(&keys("A"), "notes", &json!("hello"))?;
        editor.comment_row(&keys("A"), "world")?;
        let records = log.read_all()?;
        assert_eq!(records[0].action, EditAction::Comment);
        assert_eq!(records[1].action, EditAction::Comment);
        assert_eq!(records[1].value.as_deref(), Some("world"));
        Ok(())
    }

    #[test]
    fn boolean_values_are_normalized_on_append() -> Result<()> {
        let log = MemoryEditLog::new();
        let editor = editor(&log, config());
        editor.update_row(&keys("A"), "in_promo", &json!("True"))?;
        editor.update_row(&keys("A"), "in_promo", &json!(""))?;
        let records = log.read_all()?;
        assert_eq!(records[0].value.as_deref(), Some("true"));
        assert_eq!(records[1].value, None);
        Ok(())
    }

    #[test]
    fn create_row_appends_one_record_per_column() -> Result<()> {
        let log = MemoryEditLog::new();
        let editor = editor(&log, config());
        let mut values = Row::new();
        values.insert("status".to_string(), json!("new"));
        values.insert("in_promo".to_string(), json!(true));
        let outcomes = editor.create_row(&keys("C"), &values)?;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.is_success()));
        let records = log.read_all()?;
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.action == EditAction::Create && r.key == "C"));
        Ok(())
    }

    #[test]
    fn validate_row_locks_all_editable_columns() -> Result<()> {
        let log = MemoryEditLog::new();
        let editor = editor(&log, config());
        let mut row = keys("A");
        row.insert("status".to_string(), json!("pending"));
        row.insert("in_promo".to_string(), json!(false));
        let outcomes = editor.validate_row(&row)?;
        assert_eq!(outcomes.len(), 2);
        let records = log.read_all()?;
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.action == EditAction::Validate));
        let columns: Vec<_> = records.iter().filter_map(|r| r.column_name.clone()).collect();
        assert_eq!(columns, vec!["status", "in_promo"]);
        Ok(())
    }

    #[test]
    fn flag_only_validation_appends_a_single_record() -> Result<()> {
        let log = MemoryEditLog::new();
        let mut config = config();
        config.validation_lock = ValidationLock::FlagOnly;
        let editor = editor(&log, config);
        let outcomes = editor.validate_row(&keys("A"))?;
        assert_eq!(outcomes.len(), 1);
        let records = log.read_all()?;
        assert_eq!(records[0].action, EditAction::Validate);
        assert_eq!(records[0].column_name, None);
        Ok(())
    }

    #[test]
    fn get_row_returns_only_touched_rows() -> Result<()> {
        let log = MemoryEditLog::new();
        let editor = editor(&log, config());
        editor.update_row(&keys("A"), "status", &json!("approved"))?;
        let row = editor.get_row(&keys("A"))?;
        assert_eq!(row["status"], json!("approved"));
        // "A" exists in the baseline but "B" was never edited.
        let err = editor.get_row(&keys("B")).unwrap_err();
        assert!(err.downcast_ref::<NotFoundError>().is_some());
        Ok(())
    }

    #[test]
    fn undeclared_editable_columns_are_ignored() {
        let log = MemoryEditLog::new();
        let config = EditorConfig::new(&["id"], &["status", "missing"]);
        let editor = DataEditor::new(baseline(), Arc::new(log), config);
        assert_eq!(editor.schema().editable_columns, vec!["status"]);
    }
}
