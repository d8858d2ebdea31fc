use serde_json::Value;

use crate::error::ReplayError;

/// Composite primary-key values for one row, in the order of the configured
/// primary-key column list.
///
/// The serialized form (v1) joins the field values with a unit separator
/// (0x1f), percent-escaping `%` and the separator inside values. A single
/// field key serializes to the bare escaped value. Parsing is strict: bad
/// escapes or an arity mismatch against the configured key columns fail with
/// [`ReplayError::MalformedKey`] so that corrupt logs are detected instead of
/// silently truncated.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowKey(Vec<String>);

const SEPARATOR: char = '\u{1f}';

impl RowKey {
    pub fn new(values: Vec<String>) -> Self {
        Self(values)
    }

    /// Builds a key from a row map, taking values in primary-key column
    /// order. Missing columns are an error: a key must always carry a value
    /// for every key column.
    pub fn from_row(row: &serde_json::Map<String, Value>, primary_keys: &[String]) -> anyhow::Result<Self> {
        let mut values = Vec::with_capacity(primary_keys.len());
        for pk in primary_keys {
            let value = row
                .get(pk)
                .ok_or_else(|| anyhow::anyhow!("Missing primary key column '{}'", pk))?;
            values.push(value_to_key_string(value));
        }
        Ok(Self(values))
    }

    pub fn serialize(&self) -> String {
        let escaped: Vec<String> = self.0.iter().map(|v| escape(v)).collect();
        escaped.join(&SEPARATOR.to_string())
    }

    pub fn parse(serialized: &str, arity: usize) -> Result<Self, ReplayError> {
        let mut values = Vec::new();
        for part in serialized.split(SEPARATOR) {
            values.push(unescape(part).map_err(|reason| ReplayError::MalformedKey {
                key: serialized.to_string(),
                reason,
            })?);
        }
        if values.len() != arity {
            return Err(ReplayError::MalformedKey {
                key: serialized.to_string(),
                reason: format!("expected {} key field(s), found {}", arity, values.len()),
            });
        }
        Ok(Self(values))
    }

    pub fn values(&self) -> &[String] {
        &self.0
    }
}

/// Canonical string form of a cell value used inside keys. Numbers keep
/// their shortest representation, booleans render as "true"/"false", null as
/// the empty string.
pub fn value_to_key_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '%' => out.push_str("%25"),
            SEPARATOR => out.push_str("%1F"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape(value: &str) -> Result<String, String> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let hi = chars.next();
        let lo = chars.next();
        match (hi, lo) {
            (Some(hi), Some(lo)) => {
                let code = u32::from_str_radix(&format!("{}{}", hi, lo), 16)
                    .map_err(|_| format!("invalid escape '%{}{}'", hi, lo))?;
                let c = char::from_u32(code)
                    .ok_or_else(|| format!("invalid escape '%{}{}'", hi, lo))?;
                out.push(c);
            }
            _ => return Err("truncated escape sequence".to_string()),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_field_round_trip() -> anyhow::Result<()> {
        let key = RowKey::new(vec!["A".to_string()]);
        assert_eq!(key.serialize(), "A");
        assert_eq!(RowKey::parse("A", 1)?, key);
        Ok(())
    }

    #[test]
    fn composite_round_trip() -> anyhow::Result<()> {
        let key = RowKey::new(vec!["cat".to_string(), "2022-12-21".to_string()]);
        let serialized = key.serialize();
        assert_eq!(RowKey::parse(&serialized, 2)?, key);
        Ok(())
    }

    #[test]
    fn separator_and_percent_are_escaped() -> anyhow::Result<()> {
        let key = RowKey::new(vec!["a\u{1f}b".to_string(), "50%".to_string()]);
        let serialized = key.serialize();
        assert_eq!(serialized, "a%1Fb\u{1f}50%25");
        assert_eq!(RowKey::parse(&serialized, 2)?, key);
        Ok(())
    }

    #[test]
    fn arity_mismatch_is_an_error() {
        let result = RowKey::parse("a\u{1f}b", 3);
        assert!(matches!(result, Err(ReplayError::MalformedKey { .. })));
    }

    #[test]
    fn truncated_escape_is_an_error() {
        let result = RowKey::parse("a%2", 1);
        assert!(matches!(result, Err(ReplayError::MalformedKey { .. })));
    }

    #[test]
    fn from_row_respects_key_column_order() -> anyhow::Result<()> {
        let mut row = serde_json::Map::new();
        row.insert("k2".to_string(), Value::String("second".to_string()));
        row.insert("k1".to_string(), Value::from(7));
        let key = RowKey::from_row(&row, &["k1".to_string(), "k2".to_string()])?;
        assert_eq!(key.values(), &["7".to_string(), "second".to_string()]);
        Ok(())
    }

    #[test]
    fn from_row_missing_key_column() {
        let row = serde_json::Map::new();
        assert!(RowKey::from_row(&row, &["id".to_string()]).is_err());
    }
}
