//! Aggregate functions for aggregate selects.

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::metadata::TableOrViewMetadata;

/// Aggregate function kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    /// COUNT
    Count,
    /// COUNT(DISTINCT ...)
    CountDistinct,
    /// SUM
    Sum,
    /// AVG
    Avg,
    /// MIN
    Min,
    /// MAX
    Max,
}

/// An aggregate column: a function over a column, projected under an alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    function: AggregateFunction,
    column: Option<String>,
    alias: String,
}

impl Aggregate {
    fn new(function: AggregateFunction, column: Option<&str>, alias: &str) -> Self {
        Self {
            function,
            column: column.map(str::to_string),
            alias: alias.to_string(),
        }
    }

    /// `COUNT(*)`.
    #[must_use]
    pub fn count_all(alias: &str) -> Self {
        Self::new(AggregateFunction::Count, None, alias)
    }

    /// `COUNT(column)`.
    #[must_use]
    pub fn count(column: &str, alias: &str) -> Self {
        Self::new(AggregateFunction::Count, Some(column), alias)
    }

    /// `COUNT(DISTINCT column)`.
    #[must_use]
    pub fn count_distinct(column: &str, alias: &str) -> Self {
        Self::new(AggregateFunction::CountDistinct, Some(column), alias)
    }

    /// `SUM(column)`.
    #[must_use]
    pub fn sum(column: &str, alias: &str) -> Self {
        Self::new(AggregateFunction::Sum, Some(column), alias)
    }

    /// `AVG(column)`.
    #[must_use]
    pub fn avg(column: &str, alias: &str) -> Self {
        Self::new(AggregateFunction::Avg, Some(column), alias)
    }

    /// `MIN(column)`.
    #[must_use]
    pub fn min(column: &str, alias: &str) -> Self {
        Self::new(AggregateFunction::Min, Some(column), alias)
    }

    /// `MAX(column)`.
    #[must_use]
    pub fn max(column: &str, alias: &str) -> Self {
        Self::new(AggregateFunction::Max, Some(column), alias)
    }

    /// Returns the aggregated column; `None` for `COUNT(*)`.
    #[must_use]
    pub fn column(&self) -> Option<&str> {
        self.column.as_deref()
    }

    /// Returns the alias the result is projected under.
    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Renders the aggregate against `table`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Mapping`] when the column does not exist.
    pub fn render(&self, table: &TableOrViewMetadata, dialect: &dyn Dialect) -> Result<String> {
        let argument = match &self.column {
            None => "*".to_string(),
            Some(name) => {
                let column = table.column(name).ok_or_else(|| {
                    Error::Mapping(format!(
                        "cannot aggregate '{name}': no such column on '{}'",
                        table.name()
                    ))
                })?;
                dialect.quote_identifier(&column.sql_name)
            }
        };
        let call = match self.function {
            AggregateFunction::Count => format!("COUNT({argument})"),
            AggregateFunction::CountDistinct => format!("COUNT(DISTINCT {argument})"),
            AggregateFunction::Sum => format!("SUM({argument})"),
            AggregateFunction::Avg => format!("AVG({argument})"),
            AggregateFunction::Min => format!("MIN({argument})"),
            AggregateFunction::Max => format!("MAX({argument})"),
        };
        Ok(format!("{call} AS {}", dialect.quote_identifier(&self.alias)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::GenericDialect;
    use crate::metadata::{ColumnMetadata, ObjectName};
    use crate::value::SqlType;

    fn table() -> TableOrViewMetadata {
        TableOrViewMetadata::new(
            ObjectName::new("Invoice"),
            true,
            vec![
                ColumnMetadata::new("InvoiceKey", SqlType::BigInt).primary_key(),
                ColumnMetadata::new("Amount", SqlType::Double),
                ColumnMetadata::new("CustomerKey", SqlType::BigInt),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_render_aggregates() {
        let d = GenericDialect::new();
        let t = table();
        assert_eq!(Aggregate::count_all("Total").render(&t, &d).unwrap(), "COUNT(*) AS \"Total\"");
        assert_eq!(
            Aggregate::count_distinct("customerkey", "Customers").render(&t, &d).unwrap(),
            "COUNT(DISTINCT \"CustomerKey\") AS \"Customers\""
        );
        assert_eq!(
            Aggregate::sum("Amount", "Sum").render(&t, &d).unwrap(),
            "SUM(\"Amount\") AS \"Sum\""
        );
    }

    #[test]
    fn test_unknown_column() {
        let err = Aggregate::max("Missing", "M")
            .render(&table(), &GenericDialect::new())
            .unwrap_err();
        assert!(matches!(err, Error::Mapping(_)));
    }
}
