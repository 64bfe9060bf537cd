//! Argument sources: where a command's values come from.

use std::any::Any;
use std::fmt;

use serde_json::Value as JsonValue;

use super::FilterOptions;
use crate::descriptor::{Record, RecordAccess};
use crate::error::{Error, Result};
use crate::metadata::{ColumnMetadata, TableOrViewMetadata};
use crate::rules::ArgumentView;
use crate::value::{SqlValue, ToSqlValue};

/// A string-keyed value map. Keys compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgumentMap {
    entries: Vec<(String, SqlValue)>,
}

impl ArgumentMap {
    /// Creates an empty map.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Returns the map with `name` set to `value`.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl ToSqlValue) -> Self {
        self.insert(name, value.to_sql_value());
        self
    }

    /// Sets `name`, replacing any value already stored under it.
    pub fn insert(&mut self, name: impl Into<String>, value: SqlValue) {
        let name = name.into();
        match self
            .entries
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Reads a value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    /// Iterates over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds a map from a flat JSON object.
    ///
    /// # Errors
    ///
    /// Fails when `value` is not an object or holds arrays or nested objects.
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        let JsonValue::Object(object) = value else {
            return Err(Error::InvalidArgument(
                "argument map must be built from a JSON object".to_string(),
            ));
        };
        let mut map = Self::new();
        for (key, value) in object {
            let value = match value {
                JsonValue::Null => SqlValue::Null,
                JsonValue::Bool(b) => SqlValue::Bool(*b),
                JsonValue::Number(n) => n
                    .as_i64()
                    .map(SqlValue::Int)
                    .or_else(|| n.as_f64().map(SqlValue::Float))
                    .ok_or_else(|| {
                        Error::InvalidArgument(format!("'{key}' holds an out-of-range number"))
                    })?,
                JsonValue::String(s) => SqlValue::Text(s.clone()),
                JsonValue::Array(_) | JsonValue::Object(_) => {
                    return Err(Error::InvalidArgument(format!(
                        "'{key}' holds a nested value; only scalars can be bound"
                    )));
                }
            };
            map.insert(key.clone(), value);
        }
        Ok(map)
    }
}

impl<K: Into<String>, V: ToSqlValue> FromIterator<(K, V)> for ArgumentMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.insert(key, value.to_sql_value());
        }
        map
    }
}

impl TryFrom<JsonValue> for ArgumentMap {
    type Error = Error;

    fn try_from(value: JsonValue) -> Result<Self> {
        Self::from_json(&value)
    }
}

/// Where a command's values or criteria come from.
pub enum ArgumentSource<'a> {
    /// A typed record; properties map to columns through its descriptor.
    Record(&'a dyn RecordAccess),
    /// A string-keyed map; keys map to columns by SQL or mapped name.
    Map(ArgumentMap),
    /// A filter: every supplied value becomes an equality condition.
    Filter(Box<ArgumentSource<'a>>, FilterOptions),
    /// Raw where text with portable `@name` markers and their values.
    WhereText(String, Box<ArgumentSource<'a>>),
}

impl<'a> ArgumentSource<'a> {
    /// Wraps a record.
    pub fn record<T: Record>(record: &'a T) -> Self {
        Self::Record(record)
    }

    /// Wraps filter values.
    pub fn filter(values: impl Into<Self>, options: FilterOptions) -> Self {
        Self::Filter(Box::new(values.into()), options)
    }

    /// Wraps where text without parameters.
    pub fn where_text(text: impl Into<String>) -> Self {
        Self::WhereText(text.into(), Box::new(Self::Map(ArgumentMap::new())))
    }

    /// Wraps where text with parameter values.
    pub fn where_text_with(text: impl Into<String>, parameters: impl Into<Self>) -> Self {
        Self::WhereText(text.into(), Box::new(parameters.into()))
    }

    /// Returns whether the source describes row criteria rather than values.
    #[must_use]
    pub const fn is_criteria(&self) -> bool {
        matches!(self, Self::Filter(..) | Self::WhereText(..))
    }

    /// Returns the type name of a record source, for error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Record(record) => record.record_descriptor().type_name(),
            Self::Map(_) => "map",
            Self::Filter(inner, _) | Self::WhereText(_, inner) => inner.type_name(),
        }
    }

    /// Returns the value the source supplies for `column`, if any.
    #[must_use]
    pub fn value_for(&self, column: &ColumnMetadata) -> Option<SqlValue> {
        match self {
            Self::Record(record) => {
                let descriptor = record.record_descriptor();
                let (index, _) = descriptor
                    .find_by_column(&column.sql_name)
                    .or_else(|| descriptor.find_by_column(&column.property_name))?;
                Some(record.read(index).unwrap_or(SqlValue::Null))
            }
            Self::Map(map) => map
                .get(&column.sql_name)
                .or_else(|| map.get(&column.property_name))
                .cloned(),
            Self::Filter(inner, _) | Self::WhereText(_, inner) => inner.value_for(column),
        }
    }

    /// Returns every `(name, value)` pair the source defines.
    #[must_use]
    pub fn named_values(&self) -> Vec<(String, SqlValue)> {
        match self {
            Self::Record(record) => record
                .record_descriptor()
                .properties()
                .iter()
                .enumerate()
                .map(|(i, p)| (p.column.clone(), record.read(i).unwrap_or(SqlValue::Null)))
                .collect(),
            Self::Map(map) => map.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            Self::Filter(inner, _) | Self::WhereText(_, inner) => inner.named_values(),
        }
    }

    /// Returns the names this source defines that match no column of `table`.
    #[must_use]
    pub fn unmapped_names(&self, table: &TableOrViewMetadata) -> Vec<String> {
        self.named_values()
            .into_iter()
            .map(|(name, _)| name)
            .filter(|name| table.column(name).is_none())
            .collect()
    }
}

impl<'a, T: Record> From<&'a T> for ArgumentSource<'a> {
    fn from(record: &'a T) -> Self {
        Self::Record(record)
    }
}

impl From<ArgumentMap> for ArgumentSource<'_> {
    fn from(map: ArgumentMap) -> Self {
        Self::Map(map)
    }
}

impl ArgumentView for ArgumentSource<'_> {
    fn value(&self, name: &str) -> Option<SqlValue> {
        match self {
            Self::Record(record) => {
                let descriptor = record.record_descriptor();
                let (index, _) = descriptor
                    .find_by_path(name)
                    .or_else(|| descriptor.find_by_column(name))?;
                Some(record.read(index).unwrap_or(SqlValue::Null))
            }
            Self::Map(map) => map.get(name).cloned(),
            Self::Filter(inner, _) | Self::WhereText(_, inner) => inner.value(name),
        }
    }

    fn record(&self) -> Option<&dyn Any> {
        match self {
            Self::Record(record) => Some(record.as_any()),
            Self::Map(_) => None,
            Self::Filter(inner, _) | Self::WhereText(_, inner) => inner.record(),
        }
    }
}

impl fmt::Debug for ArgumentSource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Record(record) => f
                .debug_tuple("Record")
                .field(&record.record_descriptor().type_name())
                .finish(),
            Self::Map(map) => f.debug_tuple("Map").field(map).finish(),
            Self::Filter(inner, options) => {
                f.debug_tuple("Filter").field(inner).field(options).finish()
            }
            Self::WhereText(text, inner) => {
                f.debug_tuple("WhereText").field(text).field(inner).finish()
            }
        }
    }
}
