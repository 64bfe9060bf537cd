//! Database object metadata.
//!
//! Metadata is supplied by a [`Catalog`] collaborator and retained by the
//! [`MetadataCache`]. Entries are immutable once loaded; the cache hands out
//! shared `Arc`s until it is explicitly reset.

mod cache;
mod catalog;
mod name;

pub use cache::MetadataCache;
pub use catalog::{Catalog, CatalogCapabilities, StaticCatalog};
pub use name::ObjectName;

use crate::error::{Error, Result};
use crate::value::SqlType;

/// Describes one column of a table or view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetadata {
    /// Column name as the database knows it.
    pub sql_name: String,
    /// Name the column maps to on records and argument maps.
    pub property_name: String,
    /// Declared type.
    pub sql_type: SqlType,
    /// Whether the column accepts `NULL`.
    pub nullable: bool,
    /// Whether the column is part of the primary key.
    pub primary_key: bool,
    /// Database-generated identity column.
    pub identity: bool,
    /// Computed column.
    pub computed: bool,
}

impl ColumnMetadata {
    /// Creates an ordinary, nullable column.
    ///
    /// The mapped property name is the SQL name with characters that cannot
    /// appear in an identifier removed (`"Last Name"` maps to `LastName`).
    pub fn new(sql_name: impl Into<String>, sql_type: SqlType) -> Self {
        let sql_name = sql_name.into();
        let property_name = sql_name
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        Self {
            sql_name,
            property_name,
            sql_type,
            nullable: true,
            primary_key: false,
            identity: false,
            computed: false,
        }
    }

    /// Marks the column as part of the primary key (and therefore not null).
    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Marks the column as an identity column.
    #[must_use]
    pub const fn identity(mut self) -> Self {
        self.identity = true;
        self.nullable = false;
        self
    }

    /// Marks the column as computed.
    #[must_use]
    pub const fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    /// Marks the column as not null.
    #[must_use]
    pub const fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Returns whether callers may never write this column.
    #[must_use]
    pub const fn is_generated(&self) -> bool {
        self.identity || self.computed
    }

    /// Returns whether `name` refers to this column by SQL or mapped name.
    #[must_use]
    pub fn is_named(&self, name: &str) -> bool {
        self.sql_name.eq_ignore_ascii_case(name) || self.property_name.eq_ignore_ascii_case(name)
    }
}

/// Describes a table or view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOrViewMetadata {
    name: ObjectName,
    is_table: bool,
    columns: Vec<ColumnMetadata>,
}

impl TableOrViewMetadata {
    /// Creates table or view metadata.
    ///
    /// # Errors
    ///
    /// Fails when two columns share a name (case-insensitively).
    pub fn new(name: ObjectName, is_table: bool, columns: Vec<ColumnMetadata>) -> Result<Self> {
        for (i, column) in columns.iter().enumerate() {
            if columns[..i]
                .iter()
                .any(|c| c.sql_name.eq_ignore_ascii_case(&column.sql_name))
            {
                return Err(Error::InvalidArgument(format!(
                    "column '{}' appears more than once on '{name}'",
                    column.sql_name
                )));
            }
        }
        Ok(Self {
            name,
            is_table,
            columns,
        })
    }

    /// Returns the object name.
    #[must_use]
    pub const fn name(&self) -> &ObjectName {
        &self.name
    }

    /// Returns whether this is a table (as opposed to a view).
    #[must_use]
    pub const fn is_table(&self) -> bool {
        self.is_table
    }

    /// Returns the columns in ordinal order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    /// Returns the primary-key columns in ordinal order.
    pub fn primary_keys(&self) -> impl Iterator<Item = &ColumnMetadata> {
        self.columns.iter().filter(|c| c.primary_key)
    }

    /// Finds a column by SQL or mapped name, case-insensitively.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns
            .iter()
            .find(|c| c.sql_name.eq_ignore_ascii_case(name))
            .or_else(|| self.columns.iter().find(|c| c.is_named(name)))
    }
}

/// Direction of a routine parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterDirection {
    /// Input only.
    In,
    /// Output only.
    Out,
    /// Input and output.
    InOut,
}

/// Describes a stored procedure or table function parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterMetadata {
    /// Parameter name without any dialect prefix.
    pub name: String,
    /// Declared type.
    pub sql_type: SqlType,
    /// Direction.
    pub direction: ParameterDirection,
}

impl ParameterMetadata {
    /// Creates an input parameter.
    pub fn input(name: impl Into<String>, sql_type: SqlType) -> Self {
        let name: String = name.into();
        Self {
            name: name.trim_start_matches(['@', ':', '$']).to_string(),
            sql_type,
            direction: ParameterDirection::In,
        }
    }

    /// Sets the direction.
    #[must_use]
    pub const fn with_direction(mut self, direction: ParameterDirection) -> Self {
        self.direction = direction;
        self
    }
}

/// Describes a stored procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredProcedureMetadata {
    /// Procedure name.
    pub name: ObjectName,
    /// Parameters in declaration order.
    pub parameters: Vec<ParameterMetadata>,
}

/// Describes a table-valued function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableFunctionMetadata {
    /// Function name.
    pub name: ObjectName,
    /// Parameters in declaration order.
    pub parameters: Vec<ParameterMetadata>,
    /// Result columns.
    pub columns: Vec<ColumnMetadata>,
}
