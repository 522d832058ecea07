//! Result rows returned by a [`Connection`](crate::executor::Connection).

use indexmap::IndexMap;
use orm_rs_core::{OrmError, OrmResult};

use crate::value::Value;

/// A single result row: ordered column names and their values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    /// Creates a new row from column names and values.
    ///
    /// # Panics
    ///
    /// Panics if the number of columns does not match the number of values.
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        assert_eq!(
            columns.len(),
            values.len(),
            "Row column count must match value count"
        );
        Self { columns, values }
    }

    /// Builds a row from `(column, value)` pairs.
    ///
    /// ```
    /// use orm_rs_db::row::Row;
    ///
    /// let row = Row::from_pairs([("id", 1.into()), ("title", "Hello".into())]);
    /// assert_eq!(row.get::<i64>("id").unwrap(), 1);
    /// ```
    pub fn from_pairs<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let (columns, values) = pairs.into_iter().map(|(k, v)| (k.into(), v)).unzip();
        Self { columns, values }
    }

    /// Returns the column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Gets a typed value by column name.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::UnknownColumn`] if the column does not exist and
    /// [`OrmError::InvalidType`] if the value cannot be converted.
    pub fn get<T: FromValue>(&self, column: &str) -> OrmResult<T> {
        let value = self.get_value(column).ok_or_else(|| {
            OrmError::UnknownColumn(format!("Column '{column}' not found in row"))
        })?;
        T::from_value(value)
    }

    /// Returns a reference to the raw value at the given column name.
    pub fn get_value(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }

    /// Iterates over `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(String::as_str).zip(self.values.iter())
    }

    /// Consumes the row into an ordered column → value map.
    pub fn into_map(self) -> IndexMap<String, Value> {
        self.columns.into_iter().zip(self.values).collect()
    }
}

/// Trait for converting a [`Value`] to a concrete Rust type.
pub trait FromValue: Sized {
    /// Attempts to convert a value reference to this type.
    fn from_value(value: &Value) -> OrmResult<Self>;
}

fn unexpected(expected: &str, value: &Value) -> OrmError {
    OrmError::InvalidType(format!("Expected {expected}, got {value:?}"))
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Int(i) => Ok(*i),
            _ => Err(unexpected("Int", value)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Int(i) => i32::try_from(*i)
                .map_err(|e| OrmError::InvalidType(format!("Int value out of i32 range: {e}"))),
            _ => Err(unexpected("Int", value)),
        }
    }
}

impl FromValue for u64 {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Int(i) => u64::try_from(*i)
                .map_err(|e| OrmError::InvalidType(format!("Int value out of u64 range: {e}"))),
            _ => Err(unexpected("Int", value)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            _ => Err(unexpected("Float", value)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Int(0) => Ok(false),
            Value::Int(1) => Ok(true),
            _ => Err(unexpected("Bool", value)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::String(s) => Ok(s.clone()),
            _ => Err(unexpected("String", value)),
        }
    }
}

impl FromValue for uuid::Uuid {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Uuid(u) => Ok(*u),
            Value::String(s) => s
                .parse()
                .map_err(|e| OrmError::InvalidType(format!("Invalid UUID '{s}': {e}"))),
            _ => Err(unexpected("Uuid", value)),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> OrmResult<Self> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Null => Ok(None),
            _ => T::from_value(value).map(Some),
        }
    }
}
