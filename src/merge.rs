use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::key::RowKey;
use crate::record::EditAction;
use crate::schema::{ColumnDef, ColumnType, EditSchema, COMMENTS_COLUMN, FEEDBACK_COLUMNS, METADATA_COLUMNS, VALIDATED_COLUMN};
use crate::table::{Row, Table};

/// Combines the read-only baseline with the replay output to produce the
/// current view.
///
/// Replayed rows partition into created (first action create, not since
/// deleted), deleted (last action delete) and updated. Updated rows overlay
/// the baseline cell by cell: a non-null replayed value wins and the
/// pre-edit baseline value moves into a `<column>_original` shadow; a null
/// replayed value leaves the baseline cell untouched and the shadow empty.
/// Created rows have no baseline counterpart and come first in the output.
/// Deleted keys are excluded entirely; this is the only place deletion takes
/// effect.
///
/// Replayed values are coerced to the baseline column's declared type. A
/// value that cannot be coerced keeps its raw representation for that cell
/// and a warning is logged; the row is still included.
pub fn apply_edits(baseline: &Table, replayed: &Table, schema: &EditSchema) -> Table {
    let display_columns: Vec<&ColumnDef> = baseline
        .columns()
        .iter()
        .filter(|c| !schema.is_primary_key(&c.name) && !schema.is_editable(&c.name))
        .collect();

    // Columns in the replayed table that are neither declared nor derived,
    // e.g. ad hoc fields introduced by a client. Preserved as extra trailing
    // columns, never silently dropped.
    let known: HashSet<&str> = schema
        .primary_keys
        .iter()
        .chain(schema.editable_columns.iter())
        .map(|s| s.as_str())
        .chain(display_columns.iter().map(|c| c.name.as_str()))
        .chain(FEEDBACK_COLUMNS)
        .chain(METADATA_COLUMNS)
        .collect();
    let new_columns: Vec<&str> = replayed
        .column_names()
        .into_iter()
        .filter(|name| !known.contains(name))
        .collect();

    let mut table = Table::new(merged_table_columns(
        baseline,
        schema,
        &display_columns,
        &new_columns,
    ));

    // Partition the replayed rows.
    let mut created_rows: Vec<&Row> = Vec::new();
    let mut deleted_keys: HashSet<RowKey> = HashSet::new();
    let mut updated_by_key: HashMap<RowKey, &Row> = HashMap::new();
    for row in replayed.rows() {
        let key = match RowKey::from_row(row, &schema.primary_keys) {
            Ok(key) => key,
            Err(e) => {
                log::warn!("Skipping replayed row without usable key: {}", e);
                continue;
            }
        };
        let last_action = row.get("last_action").and_then(|v| v.as_str());
        let first_action = row.get("first_action").and_then(|v| v.as_str());
        if last_action == Some(EditAction::Delete.as_str()) {
            deleted_keys.insert(key);
        } else if first_action == Some(EditAction::Create.as_str()) {
            created_rows.push(row);
        } else {
            updated_by_key.insert(key, row);
        }
    }

    // Created rows first, as newly added rows surface on top of the view.
    for row in created_rows {
        table.push_row(build_created_row(row, baseline, schema, &new_columns));
    }

    for row in baseline.rows() {
        let key = match RowKey::from_row(row, &schema.primary_keys) {
            Ok(key) => key,
            Err(e) => {
                log::warn!("Skipping baseline row without usable key: {}", e);
                continue;
            }
        };
        if deleted_keys.contains(&key) {
            continue;
        }
        let edit = updated_by_key.get(&key).copied();
        table.push_row(build_merged_row(row, edit, baseline, schema, &new_columns));
    }

    table
}

fn merged_table_columns(
    baseline: &Table,
    schema: &EditSchema,
    display_columns: &[&ColumnDef],
    new_columns: &[&str],
) -> Vec<ColumnDef> {
    let baseline_def = |name: &str| {
        baseline
            .column(name)
            .cloned()
            .unwrap_or_else(|| ColumnDef::new(name, ColumnType::String))
    };

    let mut columns: Vec<ColumnDef> = Vec::new();
    for name in &schema.primary_keys {
        columns.push(baseline_def(name));
    }
    for def in display_columns {
        columns.push((*def).clone());
    }
    for name in &schema.editable_columns {
        columns.push(baseline_def(name));
    }
    for name in new_columns {
        columns.push(ColumnDef::new(name, ColumnType::String));
    }
    for name in &schema.editable_columns {
        let def = baseline_def(name);
        columns.push(ColumnDef::new(&format!("{}_original", name), def.column_type));
    }
    columns.push(ColumnDef::new(VALIDATED_COLUMN, ColumnType::Boolean));
    columns.push(ColumnDef::new(COMMENTS_COLUMN, ColumnType::String));
    for name in METADATA_COLUMNS {
        columns.push(ColumnDef::new(name, ColumnType::String));
    }
    columns
}

fn build_merged_row(
    baseline_row: &Row,
    edit: Option<&Row>,
    baseline: &Table,
    schema: &EditSchema,
    new_columns: &[&str],
) -> Row {
    let mut out = baseline_row.clone();
    for column in &schema.editable_columns {
        let replayed_value = edit.and_then(|e| e.get(column)).cloned().unwrap_or(Value::Null);
        if !replayed_value.is_null() {
            let original = out.get(column).cloned().unwrap_or(Value::Null);
            out.insert(column.clone(), coerce_or_warn(baseline, column, replayed_value));
            out.insert(format!("{}_original", column), original);
        }
    }
    if let Some(edit) = edit {
        for column in new_columns {
            if let Some(value) = edit.get(*column) {
                out.insert(column.to_string(), value.clone());
            }
        }
        for column in FEEDBACK_COLUMNS.iter().chain(METADATA_COLUMNS.iter()) {
            if let Some(value) = edit.get(*column) {
                out.insert(column.to_string(), value.clone());
            }
        }
    } else {
        out.insert(VALIDATED_COLUMN.to_string(), Value::Bool(false));
    }
    out
}

fn build_created_row(
    replayed_row: &Row,
    baseline: &Table,
    schema: &EditSchema,
    new_columns: &[&str],
) -> Row {
    let mut out = Row::new();
    for column in schema.primary_keys.iter().chain(schema.editable_columns.iter()) {
        let value = replayed_row.get(column).cloned().unwrap_or(Value::Null);
        out.insert(column.clone(), coerce_or_warn(baseline, column, value));
    }
    for column in new_columns {
        if let Some(value) = replayed_row.get(*column) {
            out.insert(column.to_string(), value.clone());
        }
    }
    for column in FEEDBACK_COLUMNS.iter().chain(METADATA_COLUMNS.iter()) {
        if let Some(value) = replayed_row.get(*column) {
            out.insert(column.to_string(), value.clone());
        }
    }
    out
}

fn coerce_or_warn(baseline: &Table, column: &str, value: Value) -> Value {
    let column_type = baseline
        .column(column)
        .map(|c| c.column_type)
        .unwrap_or(ColumnType::String);
    match column_type.coerce(&value) {
        Ok(coerced) => coerced,
        Err(reason) => {
            log::warn!(
                "Failed to coerce column {} to its declared type: {}. Keeping the raw value.",
                column,
                reason
            );
            value
        }
    }
}
