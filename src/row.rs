use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::catalog::{self, ColumnType, Decoder, SemanticType};
use crate::database::RecordValue;
use crate::error::{Error, Result};

/// A decoded, typed column value. Absence of a value is `Option::None`
/// wherever a `Value` is carried, never an empty string or zero.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Byte(u8),
    Bool(bool),
    Double(f64),
    Float(f32),
    DateTime(NaiveDateTime),
    Guid(Uuid),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::Int16(n) => write!(f, "{n}"),
            Value::Int32(n) => write!(f, "{n}"),
            Value::Int64(n) => write!(f, "{n}"),
            Value::UInt16(n) => write!(f, "{n}"),
            Value::UInt32(n) => write!(f, "{n}"),
            Value::UInt64(n) => write!(f, "{n}"),
            Value::Byte(n) => write!(f, "{n}"),
            Value::Bool(b) => f.write_str(if *b { "True" } else { "False" }),
            Value::Double(x) => write!(f, "{x}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::DateTime(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S%.f")),
            Value::Guid(u) => write!(f, "{u}"),
        }
    }
}

/// One column of a table, with its decoder bound.
#[derive(Debug, Clone)]
pub struct ColumnDescriptor {
    pub name: String,
    pub column_type: ColumnType,
    pub semantic_type: SemanticType,
    /// Opaque per-table column id assigned by the storage reader.
    pub column_id: u32,
    pub decoder: Decoder,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, column_type: ColumnType, column_id: u32) -> Self {
        let (semantic_type, decoder) = catalog::resolve(column_type);
        Self {
            name: name.into(),
            column_type,
            semantic_type,
            column_id,
            decoder,
        }
    }
}

/// The ordered column descriptors of one table plus a name lookup.
/// Built once per table and shared by every row read from it.
#[derive(Debug)]
pub struct ColumnSet {
    columns: Vec<ColumnDescriptor>,
    by_name: HashMap<String, usize>,
}

impl ColumnSet {
    pub fn new(columns: Vec<ColumnDescriptor>) -> Self {
        let mut by_name = HashMap::with_capacity(columns.len());
        for (i, column) in columns.iter().enumerate() {
            by_name.entry(column.name.clone()).or_insert(i);
        }
        Self { columns, by_name }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ColumnDescriptor> {
        self.columns.iter()
    }

    pub fn get(&self, index: usize) -> Option<&ColumnDescriptor> {
        self.columns.get(index)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Decode raw values positionally; missing trailing values read as no value.
    pub fn decode(&self, raw: &[RecordValue]) -> Vec<Option<Value>> {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, column)| column.decoder.decode(raw.get(i).unwrap_or(&RecordValue::Null)))
            .collect()
    }
}

/// A decoded row. `ordinal` is its position in the traversal that produced
/// it and is not a stable identity across index changes.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<ColumnSet>,
    values: Vec<Option<Value>>,
    ordinal: usize,
}

impl Row {
    pub fn new(columns: Arc<ColumnSet>, values: Vec<Option<Value>>, ordinal: usize) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self {
            columns,
            values,
            ordinal,
        }
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    pub fn values(&self) -> &[Option<Value>] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Result<Option<&Value>> {
        self.values
            .get(index)
            .map(Option::as_ref)
            .ok_or(Error::ColumnOutOfRange {
                index,
                len: self.values.len(),
            })
    }

    pub fn get_by_name(&self, name: &str) -> Result<Option<&Value>> {
        let index = self
            .columns
            .position(name)
            .ok_or_else(|| Error::ColumnNotFound(name.to_string()))?;
        self.get(index)
    }

    /// (column name, value) pairs in declared order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Value>)> {
        self.columns
            .iter()
            .zip(&self.values)
            .map(|(column, value)| (column.name.as_str(), value.as_ref()))
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.ordinal == other.ordinal
            && self.values == other.values
            && self
                .columns
                .iter()
                .map(|c| &c.name)
                .eq(other.columns.iter().map(|c| &c.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Arc<ColumnSet> {
        Arc::new(ColumnSet::new(vec![
            ColumnDescriptor::new("id", ColumnType::LongLong, 1),
            ColumnDescriptor::new("name", ColumnType::Text, 2),
            ColumnDescriptor::new("flags", ColumnType::Bit, 3),
        ]))
    }

    #[test]
    fn name_and_position_lookups_agree() {
        let columns = columns();
        let values = columns.decode(&[
            RecordValue::Int(7),
            RecordValue::Text("ada".into()),
            RecordValue::Null,
        ]);
        let row = Row::new(columns.clone(), values, 0);

        for (i, column) in columns.iter().enumerate() {
            assert_eq!(row.get(i).unwrap(), row.get_by_name(&column.name).unwrap());
        }
        assert_eq!(row.get_by_name("name").unwrap(), Some(&Value::Text("ada".into())));
        assert_eq!(row.get_by_name("flags").unwrap(), None);
    }

    #[test]
    fn short_records_pad_with_no_value() {
        let columns = columns();
        let values = columns.decode(&[RecordValue::Int(1)]);
        assert_eq!(values, vec![Some(Value::Int64(1)), None, None]);
    }

    #[test]
    fn unknown_column_and_index_are_errors() {
        let columns = columns();
        let row = Row::new(columns.clone(), vec![None, None, None], 3);
        assert!(matches!(row.get_by_name("nope"), Err(Error::ColumnNotFound(_))));
        assert!(matches!(row.get(3), Err(Error::ColumnOutOfRange { index: 3, len: 3 })));
    }

    #[test]
    fn display_is_stable() {
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(Value::Double(1.5).to_string(), "1.5");
        let t = chrono::NaiveDate::from_ymd_opt(2021, 3, 4)
            .unwrap()
            .and_hms_opt(5, 6, 7)
            .unwrap();
        assert_eq!(Value::DateTime(t).to_string(), "2021-03-04 05:06:07");
    }
}
