use anyhow::Result;
use rusqlite::Connection;
use serde_json::Value;

use crate::schema::{ColumnDef, ColumnType};

/// One row of a table: column name to cell value. Cells are JSON values so
/// that nullable integers, floats, booleans and text share one
/// representation.
pub type Row = serde_json::Map<String, Value>;

/// An ordered, typed, in-memory table. The baseline is loaded into one of
/// these, and replay/merge output is returned as one.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    columns: Vec<ColumnDef>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Appends a row, filling any declared column the row is missing with
    /// null so that every row always carries the full column set.
    pub fn push_row(&mut self, mut row: Row) {
        for col in &self.columns {
            if !row.contains_key(&col.name) {
                row.insert(col.name.clone(), Value::Null);
            }
        }
        self.rows.push(row);
    }

    /// Reads a whole SQLite table using the declared column types rather
    /// than whatever SQLite happens to have stored. Integer columns tolerate
    /// missing values (null cells), booleans accept 0/1 or "true"/"false"
    /// text, everything else reads as text.
    pub fn from_sqlite(conn: &Connection, table_name: &str, columns: &[ColumnDef]) -> Result<Self> {
        let column_list = columns
            .iter()
            .map(|c| format!("\"{}\"", c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("SELECT {} FROM \"{}\"", column_list, table_name);
        log::debug!("SQL QUERY: {}", sql);

        let mut table = Table::new(columns.to_vec());
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut out = Row::new();
            for (i, col) in columns.iter().enumerate() {
                let value = sqlite_to_value(row.get_ref(i)?, col.column_type)?;
                out.insert(col.name.clone(), value);
            }
            table.push_row(out);
        }
        log::debug!("SQL QUERY RESULT: {} rows", table.len());
        Ok(table)
    }
}

fn sqlite_to_value(value: rusqlite::types::ValueRef, column_type: ColumnType) -> Result<Value> {
    use rusqlite::types::ValueRef;

    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => match column_type {
            ColumnType::Float => Value::from(i as f64),
            ColumnType::Boolean => Value::Bool(i != 0),
            ColumnType::String | ColumnType::Date => Value::String(i.to_string()),
            ColumnType::Integer => Value::from(i),
        },
        ValueRef::Real(f) => match column_type {
            ColumnType::Integer if f.fract() == 0.0 => Value::from(f as i64),
            ColumnType::String | ColumnType::Date => Value::String(f.to_string()),
            _ => Value::from(f),
        },
        ValueRef::Text(t) => {
            let text = std::str::from_utf8(t)?.to_string();
            column_type
                .coerce(&Value::String(text.clone()))
                .unwrap_or(Value::String(text))
        }
        ValueRef::Blob(_) => anyhow::bail!("blob columns are not supported"),
    })
}
