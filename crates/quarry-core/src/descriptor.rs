//! Precomputed per-type descriptors.
//!
//! A [`TypeDescriptor`] lists every mapped property of a record type once,
//! flattened through decomposed sub-objects, so neither the SQL builder nor
//! the materializers discover properties ad hoc. Descriptors are produced by
//! `#[derive(Record)]` and cached for the process lifetime.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use crate::error::Result;
use crate::value::SqlValue;

/// The Rust-side type of a record property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyType {
    /// `bool`
    Bool,
    /// `i16`
    I16,
    /// `i32`
    I32,
    /// `i64`
    I64,
    /// `f32`
    F32,
    /// `f64`
    F64,
    /// `char`
    Char,
    /// `String`
    String,
    /// `Vec<u8>`
    Bytes,
    /// `chrono::NaiveDate`
    Date,
    /// `chrono::NaiveTime`
    Time,
    /// `chrono::NaiveDateTime`
    DateTime,
    /// `chrono::DateTime<FixedOffset>` or `DateTime<Utc>`
    DateTimeOffset,
    /// A raw `SqlValue`, accepted as-is.
    Any,
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One mapped property of a record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDescriptor {
    /// Dotted path from the root type, e.g. `address.city`.
    pub path: String,
    /// Column the property maps to.
    pub column: String,
    /// Property type.
    pub property_type: PropertyType,
    /// Whether the property accepts `NULL`.
    pub nullable: bool,
    /// Whether the property lives on a decomposed sub-object.
    pub decomposed: bool,
    /// Declared as a key with `#[column(key)]`.
    pub key: bool,
    /// Declared as database generated with `#[column(identity)]`.
    pub identity: bool,
    /// Never written by inserts.
    pub ignore_on_insert: bool,
    /// Never written by updates.
    pub ignore_on_update: bool,
}

impl PropertyDescriptor {
    /// Creates a descriptor for a plain property whose column shares its name.
    #[must_use]
    pub fn new(path: &str, column: &str, property_type: PropertyType, nullable: bool) -> Self {
        Self {
            path: path.to_string(),
            column: column.to_string(),
            property_type,
            nullable,
            decomposed: false,
            key: false,
            identity: false,
            ignore_on_insert: false,
            ignore_on_update: false,
        }
    }

    /// Marks the property as a key.
    #[must_use]
    pub const fn key(mut self) -> Self {
        self.key = true;
        self
    }

    /// Marks the property as database generated.
    #[must_use]
    pub const fn identity(mut self) -> Self {
        self.identity = true;
        self.ignore_on_insert = true;
        self.ignore_on_update = true;
        self
    }

    /// Excludes the property from inserts.
    #[must_use]
    pub const fn ignore_on_insert(mut self) -> Self {
        self.ignore_on_insert = true;
        self
    }

    /// Excludes the property from updates.
    #[must_use]
    pub const fn ignore_on_update(mut self) -> Self {
        self.ignore_on_update = true;
        self
    }

    /// Returns a copy nested under a decomposed parent property.
    #[must_use]
    pub fn nested_under(&self, parent: &str) -> Self {
        Self {
            path: format!("{parent}.{}", self.path),
            decomposed: true,
            ..self.clone()
        }
    }
}

/// The full, flattened property list of a record type.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    type_name: &'static str,
    table: Option<&'static str>,
    properties: Vec<PropertyDescriptor>,
    not_mapped: Vec<String>,
    by_column: HashMap<String, usize>,
    by_path: HashMap<String, usize>,
}

impl TypeDescriptor {
    /// Builds a descriptor from its flattened property list.
    #[must_use]
    pub fn new(
        type_name: &'static str,
        table: Option<&'static str>,
        properties: Vec<PropertyDescriptor>,
        not_mapped: Vec<String>,
    ) -> Self {
        let mut by_column = HashMap::with_capacity(properties.len());
        let mut by_path = HashMap::with_capacity(properties.len());
        for (index, property) in properties.iter().enumerate() {
            // first declaration wins when two properties share a column
            by_column
                .entry(property.column.to_lowercase())
                .or_insert(index);
            by_path.insert(property.path.to_lowercase(), index);
        }
        Self {
            type_name,
            table,
            properties,
            not_mapped,
            by_column,
            by_path,
        }
    }

    /// Returns the Rust type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns the table declared with `#[record(table = "...")]`.
    #[must_use]
    pub const fn table(&self) -> Option<&'static str> {
        self.table
    }

    /// Returns all properties in declaration order.
    #[must_use]
    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    /// Returns the number of mapped properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Returns whether the type maps no properties.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Returns the fields explicitly declared as not mapped.
    #[must_use]
    pub fn not_mapped(&self) -> &[String] {
        &self.not_mapped
    }

    /// Finds a property by column name, case-insensitively.
    #[must_use]
    pub fn find_by_column(&self, column: &str) -> Option<(usize, &PropertyDescriptor)> {
        self.by_column
            .get(&column.to_lowercase())
            .map(|&index| (index, &self.properties[index]))
    }

    /// Finds a property by its dotted path, case-insensitively.
    #[must_use]
    pub fn find_by_path(&self, path: &str) -> Option<(usize, &PropertyDescriptor)> {
        self.by_path
            .get(&path.to_lowercase())
            .map(|&index| (index, &self.properties[index]))
    }
}

/// A type whose properties can be read and written by descriptor index.
///
/// Implemented by `#[derive(Record)]`. Indices follow
/// [`TypeDescriptor::properties`], including decomposed sub-object
/// properties.
pub trait Record: Default + Send + Sync + 'static {
    /// Returns the cached descriptor for this type.
    fn descriptor() -> &'static TypeDescriptor;

    /// Reads the property at `index` as a SQL value.
    fn read_property(&self, index: usize) -> Option<SqlValue>;

    /// Writes an already-converted SQL value into the property at `index`.
    ///
    /// # Errors
    ///
    /// Returns a mapping error when the value does not fit the property.
    fn write_property(&mut self, index: usize, value: SqlValue) -> Result<()>;

    /// Change-tracking hook invoked once after materialization.
    fn accept_changes(&mut self) {}
}

/// Object-safe view over a [`Record`] value, used where the concrete type is
/// erased (argument sources, validators, the current user).
pub trait RecordAccess: Send + Sync {
    /// Returns the descriptor of the underlying type.
    fn record_descriptor(&self) -> &'static TypeDescriptor;

    /// Reads the property at `index`.
    fn read(&self, index: usize) -> Option<SqlValue>;

    /// Returns the value as `Any` so callers can downcast to the concrete type.
    fn as_any(&self) -> &dyn Any;
}

impl<T: Record> RecordAccess for T {
    fn record_descriptor(&self) -> &'static TypeDescriptor {
        T::descriptor()
    }

    fn read(&self, index: usize) -> Option<SqlValue> {
        self.read_property(index)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::new(
            "Customer",
            Some("Customer"),
            vec![
                PropertyDescriptor::new("id", "CustomerKey", PropertyType::I64, false).identity(),
                PropertyDescriptor::new("name", "FullName", PropertyType::String, false),
                PropertyDescriptor::new("city", "City", PropertyType::String, true)
                    .nested_under("address"),
            ],
            vec!["scratch".to_string()],
        )
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let d = descriptor();
        assert_eq!(d.find_by_column("fullname").map(|(i, _)| i), Some(1));
        assert_eq!(d.find_by_column("CUSTOMERKEY").map(|(i, _)| i), Some(0));
        assert!(d.find_by_column("missing").is_none());
    }

    #[test]
    fn test_nested_path() {
        let d = descriptor();
        let (index, property) = d.find_by_path("Address.City").unwrap();
        assert_eq!(index, 2);
        assert!(property.decomposed);
        assert_eq!(property.path, "address.city");
    }

    #[test]
    fn test_identity_implies_ignored_on_write() {
        let d = descriptor();
        let id = &d.properties()[0];
        assert!(id.identity && id.ignore_on_insert && id.ignore_on_update);
    }
}
