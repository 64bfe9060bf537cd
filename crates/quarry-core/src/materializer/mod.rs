//! Turning tabular results into records.
//!
//! Two strategies implement [`Materializer`]:
//!
//! - [`ReflectiveMaterializer`] looks every column up in the record's
//!   [`TypeDescriptor`](crate::descriptor::TypeDescriptor) and converts each
//!   value by its runtime type.
//! - [`CompiledMaterializer`] plans the column-to-property mapping once per
//!   record type and result shape, caches the plan, and replays it for every
//!   row.
//!
//! Both produce identical records for every row; they share [`Conversion`]
//! and the null handling in this module.

mod compiled;
mod convert;
mod reflective;

pub use compiled::{CompiledMaterializer, CompiledProjection};
pub use convert::{value_class, Conversion};
pub use reflective::ReflectiveMaterializer;

use crate::descriptor::{PropertyDescriptor, Record};
use crate::error::{Error, Result};
use crate::execution::{RowCursor, RowSet};
use crate::value::SqlValue;

/// Row-count tolerance for single-row materialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowOptions {
    /// Zero rows yield `None` instead of [`Error::MissingData`].
    pub allow_empty_results: bool,
    /// Rows after the first are ignored instead of raising
    /// [`Error::UnexpectedData`].
    pub discard_extra_rows: bool,
}

/// A strategy for building records from a row cursor.
pub trait Materializer: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Materializes up to `limit` rows, or every row when `limit` is `None`.
    ///
    /// Columns without a matching property are ignored and properties
    /// without a matching column keep their default value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Mapping`] for values that cannot be converted, and
    /// [`Error::Compile`] when a compiled projection cannot be planned.
    fn materialize<T: Record>(
        &self,
        cursor: &mut dyn RowCursor,
        limit: Option<usize>,
    ) -> Result<Vec<T>>;
}

/// Materializes every row of `rows`.
///
/// # Errors
///
/// See [`Materializer::materialize`].
pub fn collect<T: Record, M: Materializer>(materializer: &M, rows: &RowSet) -> Result<Vec<T>> {
    let mut cursor = rows.cursor();
    materializer.materialize(&mut cursor, None)
}

/// Materializes the only row of `rows`.
///
/// # Errors
///
/// Returns [`Error::MissingData`] for zero rows and
/// [`Error::UnexpectedData`] for more than one, unless `options` allows it.
pub fn single<T: Record, M: Materializer>(
    materializer: &M,
    rows: &RowSet,
    options: RowOptions,
) -> Result<Option<T>> {
    match rows.len() {
        0 if options.allow_empty_results => return Ok(None),
        0 => return Err(Error::MissingData),
        1 => {}
        actual if !options.discard_extra_rows => {
            return Err(Error::UnexpectedData {
                expected: 1,
                actual,
            });
        }
        _ => {}
    }
    let mut cursor = rows.cursor();
    Ok(materializer.materialize(&mut cursor, Some(1))?.pop())
}

/// Writes one column value into a property, resolving the conversion from
/// the value's runtime type.
///
/// `NULL` is written only into nullable properties; non-nullable ones keep
/// their default.
pub(crate) fn write_value<T: Record>(
    item: &mut T,
    index: usize,
    property: &PropertyDescriptor,
    column: &str,
    value: SqlValue,
) -> Result<()> {
    if value.is_null() {
        return if property.nullable {
            item.write_property(index, SqlValue::Null)
        } else {
            Ok(())
        };
    }
    let converted = Conversion::convert(value, property.property_type)
        .map_err(|err| column_error(column, property, &err))?;
    item.write_property(index, converted)
}

pub(crate) fn column_error(column: &str, property: &PropertyDescriptor, err: &Error) -> Error {
    Error::Mapping(format!(
        "column '{column}' cannot be read into '{}': {err}",
        property.path
    ))
}
