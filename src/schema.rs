use serde::{Deserialize, Serialize};

/// Declared type of a baseline column. Consulted uniformly by the replay
/// engine's null-filling and the merge engine's coercion step; no implicit
/// type inference happens anywhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
}

impl ColumnType {
    /// Coerces a replayed (string) value to this declared type. `Null` passes
    /// through. Integer columns use a nullable representation: an integral
    /// float string like "3.0" still lands as an integer, mirroring how
    /// missing-value-tolerant integer columns behave upstream.
    ///
    /// Returns Err with a reason when the value cannot be represented; the
    /// caller decides whether that is fatal (it is not during merge: the raw
    /// value is kept and a warning logged).
    pub fn coerce(&self, value: &serde_json::Value) -> Result<serde_json::Value, String> {
        use serde_json::Value;

        if value.is_null() {
            return Ok(Value::Null);
        }
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => other.to_string(),
        };
        match self {
            ColumnType::String | ColumnType::Date => Ok(Value::String(text)),
            ColumnType::Integer => {
                if text.is_empty() {
                    return Ok(Value::Null);
                }
                let parsed: f64 = text
                    .parse()
                    .map_err(|_| format!("'{}' is not an integer", text))?;
                if parsed.fract() != 0.0 {
                    return Err(format!("'{}' is not an integer", text));
                }
                Ok(Value::from(parsed as i64))
            }
            ColumnType::Float => {
                if text.is_empty() {
                    return Ok(Value::Null);
                }
                let parsed: f64 = text
                    .parse()
                    .map_err(|_| format!("'{}' is not a float", text))?;
                Ok(Value::from(parsed))
            }
            ColumnType::Boolean => {
                if text.is_empty() {
                    return Ok(Value::Null);
                }
                match text.to_lowercase().as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    _ => Err(format!("'{}' is not a boolean", text)),
                }
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnDef {
    pub fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
        }
    }
}

/// Column name of the derived validation flag.
pub const VALIDATED_COLUMN: &str = "validated";
/// Column name of the derived free-text notes.
pub const COMMENTS_COLUMN: &str = "comments";

/// Feedback columns derived from validate/comment actions.
pub const FEEDBACK_COLUMNS: [&str; 2] = [VALIDATED_COLUMN, COMMENTS_COLUMN];

/// Per-row metadata columns derived from the most recent and earliest
/// non-comment records of each key.
pub const METADATA_COLUMNS: [&str; 4] = [
    "last_edit_date",
    "last_edited_by",
    "last_action",
    "first_action",
];

/// Names the columns involved in editing: which columns identify a row and
/// which ones end users may change. Everything else in the baseline is
/// display-only.
#[derive(Clone, Debug)]
pub struct EditSchema {
    pub primary_keys: Vec<String>,
    pub editable_columns: Vec<String>,
}

impl EditSchema {
    pub fn new(primary_keys: &[&str], editable_columns: &[&str]) -> Self {
        Self {
            primary_keys: primary_keys.iter().map(|s| s.to_string()).collect(),
            editable_columns: editable_columns.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// The fixed column set of the replay output, in order: primary keys,
    /// editable columns, feedback columns, metadata columns. Guaranteed even
    /// when the editlog is empty.
    pub fn replay_columns(&self) -> Vec<String> {
        self.primary_keys
            .iter()
            .chain(self.editable_columns.iter())
            .map(|s| s.to_string())
            .chain(FEEDBACK_COLUMNS.iter().map(|s| s.to_string()))
            .chain(METADATA_COLUMNS.iter().map(|s| s.to_string()))
            .collect()
    }

    pub fn is_editable(&self, column: &str) -> bool {
        self.editable_columns.iter().any(|c| c == column)
    }

    pub fn is_primary_key(&self, column: &str) -> bool {
        self.primary_keys.iter().any(|c| c == column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn coerce_integer_tolerates_integral_floats() {
        assert_eq!(ColumnType::Integer.coerce(&json!("42")), Ok(json!(42)));
        assert_eq!(ColumnType::Integer.coerce(&json!("3.0")), Ok(json!(3)));
        assert_eq!(ColumnType::Integer.coerce(&json!("")), Ok(Value::Null));
        assert!(ColumnType::Integer.coerce(&json!("3.5")).is_err());
        assert!(ColumnType::Integer.coerce(&json!("abc")).is_err());
    }

    #[test]
    fn coerce_boolean_is_case_insensitive() {
        assert_eq!(ColumnType::Boolean.coerce(&json!("True")), Ok(json!(true)));
        assert_eq!(ColumnType::Boolean.coerce(&json!("false")), Ok(json!(false)));
        assert!(ColumnType::Boolean.coerce(&json!("yes")).is_err());
    }

    #[test]
    fn coerce_null_passes_through() {
        assert_eq!(ColumnType::Float.coerce(&Value::Null), Ok(Value::Null));
    }

    #[test]
    fn replay_columns_fixed_order() {
        let schema = EditSchema::new(&["id"], &["status", "notes"]);
        assert_eq!(
            schema.replay_columns(),
            vec![
                "id",
                "status",
                "notes",
                "validated",
                "comments",
                "last_edit_date",
                "last_edited_by",
                "last_action",
                "first_action"
            ]
        );
    }
}
