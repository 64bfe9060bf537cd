//! Row cursors and owned row sets.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::value::{SqlType, SqlValue};

/// Name, type and nullability of one result field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldShape {
    /// Column name as reported by the provider.
    pub name: String,
    /// Runtime type of the column.
    pub sql_type: SqlType,
    /// Whether the column may hold `NULL`. Providers that cannot tell report
    /// `true`.
    pub nullable: bool,
}

impl FieldShape {
    /// Creates a nullable field.
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            nullable: true,
        }
    }

    /// Marks the field as never `NULL`.
    #[must_use]
    pub const fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Ordered field list of a result; the key compiled projections are cached
/// under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShapeSignature(Arc<[FieldShape]>);

impl ShapeSignature {
    /// Creates a signature.
    #[must_use]
    pub fn new(fields: Vec<FieldShape>) -> Self {
        Self(fields.into())
    }

    /// Returns the fields in order.
    #[must_use]
    pub fn fields(&self) -> &[FieldShape] {
        &self.0
    }

    /// Returns the field count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether the result has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Finds a field by name, case-insensitively.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|f| f.name.eq_ignore_ascii_case(name))
    }
}

/// Forward-only access to a tabular result.
pub trait RowCursor {
    /// Shape of every row.
    fn shape(&self) -> &ShapeSignature;

    /// Moves to the next row; `false` once the rows are exhausted.
    fn next_row(&mut self) -> bool;

    /// Reads a field of the current row.
    fn get_value(&self, index: usize) -> SqlValue;

    /// Number of fields.
    fn field_count(&self) -> usize {
        self.shape().len()
    }

    /// Field name.
    fn name(&self, index: usize) -> &str {
        &self.shape().fields()[index].name
    }

    /// Field type.
    fn sql_type(&self, index: usize) -> SqlType {
        self.shape().fields()[index].sql_type
    }

    /// Returns whether a field of the current row is `NULL`.
    fn is_null(&self, index: usize) -> bool {
        self.get_value(index).is_null()
    }
}

/// A fully buffered result.
#[derive(Debug, Clone, PartialEq)]
pub struct RowSet {
    shape: ShapeSignature,
    rows: Vec<Vec<SqlValue>>,
}

impl RowSet {
    /// Creates a row set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when a row's width differs from the
    /// shape.
    pub fn new(shape: ShapeSignature, rows: Vec<Vec<SqlValue>>) -> Result<Self> {
        if let Some(bad) = rows.iter().position(|r| r.len() != shape.len()) {
            return Err(Error::InvalidArgument(format!(
                "row {bad} has {} values but the result has {} fields",
                rows[bad].len(),
                shape.len()
            )));
        }
        Ok(Self { shape, rows })
    }

    /// Creates a row set with no rows.
    #[must_use]
    pub fn empty(shape: ShapeSignature) -> Self {
        Self {
            shape,
            rows: Vec::new(),
        }
    }

    /// Returns the shape.
    #[must_use]
    pub const fn shape(&self) -> &ShapeSignature {
        &self.shape
    }

    /// Returns the rows.
    #[must_use]
    pub fn rows(&self) -> &[Vec<SqlValue>] {
        &self.rows
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns whether there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Reads a field by row index and column name.
    #[must_use]
    pub fn get(&self, row: usize, column: &str) -> Option<&SqlValue> {
        let index = self.shape.index_of(column)?;
        self.rows.get(row).map(|r| &r[index])
    }

    /// Returns a cursor positioned before the first row.
    #[must_use]
    pub fn cursor(&self) -> RowSetCursor<'_> {
        RowSetCursor {
            set: self,
            position: None,
        }
    }
}

/// Cursor over a [`RowSet`].
#[derive(Debug)]
pub struct RowSetCursor<'a> {
    set: &'a RowSet,
    position: Option<usize>,
}

impl RowCursor for RowSetCursor<'_> {
    fn shape(&self) -> &ShapeSignature {
        &self.set.shape
    }

    fn next_row(&mut self) -> bool {
        let next = self.position.map_or(0, |p| p + 1);
        self.position = Some(next.min(self.set.rows.len()));
        next < self.set.rows.len()
    }

    fn get_value(&self, index: usize) -> SqlValue {
        self.position
            .and_then(|p| self.set.rows.get(p))
            .and_then(|row| row.get(index))
            .cloned()
            .unwrap_or(SqlValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> RowSet {
        RowSet::new(
            ShapeSignature::new(vec![
                FieldShape::new("Id", SqlType::BigInt).not_null(),
                FieldShape::new("Name", SqlType::Text),
            ]),
            vec![
                vec![SqlValue::Int(1), SqlValue::Text("Ada".into())],
                vec![SqlValue::Int(2), SqlValue::Null],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_cursor_walks_rows() {
        let set = people();
        let mut cursor = set.cursor();
        assert_eq!(cursor.field_count(), 2);
        assert_eq!(cursor.name(1), "Name");
        assert!(cursor.next_row());
        assert_eq!(cursor.get_value(0), SqlValue::Int(1));
        assert!(cursor.next_row());
        assert!(cursor.is_null(1));
        assert!(!cursor.next_row());
        assert!(!cursor.next_row());
    }

    #[test]
    fn test_row_width_checked() {
        let result = RowSet::new(
            ShapeSignature::new(vec![FieldShape::new("Id", SqlType::BigInt)]),
            vec![vec![SqlValue::Int(1), SqlValue::Int(2)]],
        );
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_signature_distinguishes_types() {
        let a = ShapeSignature::new(vec![FieldShape::new("Id", SqlType::BigInt)]);
        let b = ShapeSignature::new(vec![FieldShape::new("Id", SqlType::Text)]);
        assert_ne!(a, b);
        assert_eq!(people().get(0, "name"), Some(&SqlValue::Text("Ada".into())));
    }
}
