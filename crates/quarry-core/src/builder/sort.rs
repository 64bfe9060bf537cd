//! Sort expressions for selects.

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::metadata::TableOrViewMetadata;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending (ASC).
    Ascending,
    /// Descending (DESC).
    Descending,
}

/// One `ORDER BY` term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortExpression {
    /// Column to sort by, by SQL or mapped name.
    pub column: String,
    /// Direction.
    pub direction: SortDirection,
}

impl SortExpression {
    /// Sorts ascending by `column`.
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Ascending,
        }
    }

    /// Sorts descending by `column`.
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Descending,
        }
    }

    /// Parses a column name; a leading `-` means descending.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        text.strip_prefix('-')
            .map_or_else(|| Self::asc(text), Self::desc)
    }

    /// Renders the term against `table`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Mapping`] when the column does not exist.
    pub fn render(&self, table: &TableOrViewMetadata, dialect: &dyn Dialect) -> Result<String> {
        let column = table.column(&self.column).ok_or_else(|| {
            Error::Mapping(format!(
                "cannot sort by '{}': no such column on '{}'",
                self.column,
                table.name()
            ))
        })?;
        let quoted = dialect.quote_identifier(&column.sql_name);
        Ok(match self.direction {
            SortDirection::Ascending => quoted,
            SortDirection::Descending => format!("{quoted} DESC"),
        })
    }
}

impl From<&str> for SortExpression {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}
