//! Per-operation options and the desired-columns selector.

use serde::{Deserialize, Serialize};

use crate::descriptor::TypeDescriptor;

/// How a null-valued filter field is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterNullHandling {
    /// The field becomes `column IS NULL`.
    #[default]
    IsNull,
    /// The field is skipped.
    Ignore,
}

/// Options for filter-object criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterOptions {
    /// Treatment of null-valued fields.
    pub null_handling: FilterNullHandling,
    /// Permit a filter that yields no condition on update and delete.
    pub allow_unconditional: bool,
}

impl FilterOptions {
    /// Options with the given null handling.
    #[must_use]
    pub const fn with_null_handling(null_handling: FilterNullHandling) -> Self {
        Self {
            null_handling,
            allow_unconditional: false,
        }
    }
}

/// Options for inserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InsertOptions {
    /// Write caller values into identity columns.
    pub identity_insert: bool,
}

/// Options for keyed updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateOptions {
    /// Use the record's `#[column(key)]` properties instead of the table's
    /// primary key.
    pub use_key_attribute: bool,
    /// Project the pre-update image instead of the post-update image.
    pub return_old_values: bool,
    /// Do not expect exactly one affected row.
    pub ignore_rows_affected: bool,
}

/// Options for keyed deletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeleteOptions {
    /// Use the record's `#[column(key)]` properties instead of the table's
    /// primary key.
    pub use_key_attribute: bool,
    /// Expect exactly one affected row.
    pub check_rows_affected: bool,
}

/// Options for upserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpsertOptions {
    /// Write caller values into identity columns.
    pub identity_insert: bool,
}

/// Which columns a command projects back.
#[derive(Debug, Clone, Default)]
pub enum DesiredColumns {
    /// The primary key, or every column when the table has none.
    AutoSelect,
    /// No projection clause at all.
    #[default]
    NoColumns,
    /// Every column.
    All,
    /// The named columns, by SQL or mapped name.
    Explicit(Vec<String>),
    /// The columns the record type maps.
    Type(&'static TypeDescriptor),
}

impl DesiredColumns {
    /// Names the columns to project.
    pub fn explicit<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Explicit(names.into_iter().map(Into::into).collect())
    }

    /// Returns whether a projection clause is emitted.
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::NoColumns)
    }
}
