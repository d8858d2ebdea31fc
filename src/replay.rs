use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::ReplayError;
use crate::key::RowKey;
use crate::record::{EditAction, EditRecord};
use crate::schema::{ColumnDef, ColumnType, EditSchema, COMMENTS_COLUMN, VALIDATED_COLUMN};
use crate::table::{Row, Table};

/// Accumulated state for one key while folding over the sorted log.
#[derive(Default)]
struct KeyState<'a> {
    /// Last written value per editable column.
    values: BTreeMap<&'a str, Value>,
    /// Earliest non-comment record for the key.
    first: Option<&'a EditRecord>,
    /// Most recent non-comment record for the key, whichever column it touched.
    last: Option<&'a EditRecord>,
    /// Most recent comment record for the key.
    comment: Option<&'a EditRecord>,
}

/// Collapses an editlog into one row per edited key.
///
/// Records are stable-sorted by timestamp, so ties in timestamp resolve by
/// log order, and the last value written to each column wins. Comment
/// records only ever influence the `comments` column. Keys whose last action
/// is a delete are retained here; deletion takes effect downstream in the
/// merge, which keeps this a pure fold over the log.
///
/// The output schema is fixed regardless of what the log contains: primary
/// keys, editable columns, feedback columns, metadata columns. Columns in
/// the log that are not declared editable are dropped with a warning. A key
/// that cannot be parsed back into the configured arity fails the whole call
/// with [`ReplayError`]; a corrupt log must be detectable, never silently
/// truncated.
pub fn replay_edits(records: &[EditRecord], schema: &EditSchema) -> Result<Table, ReplayError> {
    let mut table = Table::new(replay_table_columns(schema));
    if records.is_empty() {
        return Ok(table);
    }

    let arity = schema.primary_keys.len();

    let (comments, edits): (Vec<&EditRecord>, Vec<&EditRecord>) =
        records.iter().partition(|r| r.action == EditAction::Comment);

    // Vec::sort_by is stable: equal timestamps keep their append order,
    // which is the tie-break policy.
    let mut edits = edits;
    edits.sort_by(|a, b| a.date.cmp(&b.date));
    let mut comments = comments;
    comments.sort_by(|a, b| a.date.cmp(&b.date));

    let mut groups: BTreeMap<RowKey, KeyState> = BTreeMap::new();
    for &record in &edits {
        let key = RowKey::parse(&record.key, arity)?;
        let state = groups.entry(key).or_default();
        if let Some(column) = &record.column_name {
            if schema.is_editable(column) {
                let value = record
                    .value
                    .as_ref()
                    .map(|v| Value::String(v.clone()))
                    .unwrap_or(Value::Null);
                state.values.insert(column, value);
            } else {
                log::warn!(
                    "Column {} is not an editable column. Dropping it from the replay.",
                    column
                );
            }
        }
        if state.first.is_none() {
            state.first = Some(record);
        }
        state.last = Some(record);
    }

    for &record in &comments {
        let key = RowKey::parse(&record.key, arity)?;
        // Sorted ascending, so the last one seen per key wins.
        groups.entry(key).or_default().comment = Some(record);
    }

    for (key, state) in groups {
        let mut row = Row::new();
        for (name, value) in schema.primary_keys.iter().zip(key.values()) {
            row.insert(name.clone(), Value::String(value.clone()));
        }
        for (column, value) in state.values {
            row.insert(column.to_string(), value);
        }
        let validated = state
            .last
            .map(|r| r.action == EditAction::Validate)
            .unwrap_or(false);
        row.insert(VALIDATED_COLUMN.to_string(), Value::Bool(validated));
        if let Some(comment) = state.comment {
            let value = comment
                .value
                .as_ref()
                .map(|v| Value::String(v.clone()))
                .unwrap_or(Value::Null);
            row.insert(COMMENTS_COLUMN.to_string(), value);
        }
        if let Some(last) = state.last {
            row.insert("last_edit_date".to_string(), Value::String(last.date.clone()));
            row.insert("last_edited_by".to_string(), Value::String(last.user.clone()));
            row.insert("last_action".to_string(), Value::String(last.action.to_string()));
        }
        if let Some(first) = state.first {
            row.insert("first_action".to_string(), Value::String(first.action.to_string()));
        }
        table.push_row(row);
    }

    Ok(table)
}

/// The fixed replay output schema. Everything is text except the derived
/// validation flag: values come straight from the log, which stores strings.
fn replay_table_columns(schema: &EditSchema) -> Vec<ColumnDef> {
    schema
        .replay_columns()
        .into_iter()
        .map(|name| {
            let column_type = if name == VALIDATED_COLUMN {
                ColumnType::Boolean
            } else {
                ColumnType::String
            };
            ColumnDef { name, column_type }
        })
        .collect()
}
