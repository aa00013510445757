//! Untyped result rows.

use crate::row::{ColumnInfo, Row};
use crate::value::Value;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::sync::Arc;

/// An ordered name/value map for one result row.
///
/// Rows of the same grid share their column list; setting a name that is
/// not a column appends it to this row's own copy.
#[derive(Debug, Clone)]
pub struct DynamicRow {
    columns: Arc<ColumnInfo>,
    values: Vec<Value>,
}

impl DynamicRow {
    pub fn from_row(row: &Row) -> Self {
        Self {
            columns: row.column_info(),
            values: row.values().cloned().collect(),
        }
    }

    /// Get a value by exact column name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns.index_of(name).and_then(|i| self.values.get(i))
    }

    /// Insert or overwrite a value.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        if let Some(i) = self.columns.index_of(name) {
            self.values[i] = value;
        } else {
            Arc::make_mut(&mut self.columns).push(name);
            self.values.push(value);
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over (name, value) pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Render as a JSON object in column order.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl Serialize for DynamicRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, &JsonValue(value))?;
        }
        map.end()
    }
}

/// Plain JSON rendering of a value, without the enum tag.
struct JsonValue<'a>(&'a Value);

impl Serialize for JsonValue<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Value::Null => serializer.serialize_none(),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::Byte(v) => serializer.serialize_u8(*v),
            Value::SmallInt(v) => serializer.serialize_i16(*v),
            Value::Int(v) => serializer.serialize_i32(*v),
            Value::BigInt(v) => serializer.serialize_i64(*v),
            Value::Float(v) => serializer.serialize_f32(*v),
            Value::Double(v) => serializer.serialize_f64(*v),
            Value::Array(items) => serializer.collect_seq(items.iter().map(JsonValue)),
            other => serializer.collect_str(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DynamicRow {
        DynamicRow::from_row(&Row::new(
            vec!["id".into(), "name".into(), "note".into()],
            vec![Value::Int(1), Value::from("Ann"), Value::Null],
        ))
    }

    #[test]
    fn test_set_overwrites_or_appends() {
        let mut row = sample();
        row.set("name", "Bob");
        row.set("extra", 5_i64);
        assert_eq!(row.get("name"), Some(&Value::from("Bob")));
        assert_eq!(row.get("extra"), Some(&Value::BigInt(5)));
        let names: Vec<_> = row.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["id", "name", "note", "extra"]);
    }

    #[test]
    fn test_json_keeps_column_order() {
        assert_eq!(
            sample().to_json().unwrap(),
            r#"{"id":1,"name":"Ann","note":null}"#
        );
    }
}
