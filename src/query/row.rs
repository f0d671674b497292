//! Column-order-preserving row container, replacing a `Map<String,Object>`
//! row representation with a typed accessor API (see SPEC_FULL.md / spec.md
//! §9's remark on reflection-heavy row shaping).

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    #[must_use]
    pub fn new() -> Self {
        Self { columns: Vec::new() }
    }

    pub fn push(&mut self, column: impl Into<String>, value: Value) {
        self.columns.push((column.into(), value));
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.iter().find(|(name, _)| name == column).map(|(_, v)| v)
    }

    #[must_use]
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// The first column of the row, read as a signed 64-bit integer — used
    /// by count-query materialization.
    #[must_use]
    pub fn first_as_i64(&self) -> Option<i64> {
        self.columns.first().and_then(|(_, v)| v.as_i64())
    }
}

impl Serialize for Row {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (key, value) in &self.columns {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = Row;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a JSON object representing one row")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Row, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut row = Row::new();
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    row.push(key, value);
                }
                Ok(row)
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_insertion_order_in_json() {
        let mut row = Row::new();
        row.push("b", Value::from(2));
        row.push("a", Value::from(1));
        let json = serde_json::to_string(&row).expect("serialize");
        assert_eq!(json, r#"{"b":2,"a":1}"#);
    }

    #[test]
    fn first_as_i64_reads_count_column() {
        let mut row = Row::new();
        row.push("count", Value::from(105));
        assert_eq!(row.first_as_i64(), Some(105));
    }
}
