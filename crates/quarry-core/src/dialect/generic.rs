//! Generic SQL dialect.

use super::Dialect;

/// A generic SQL dialect using ANSI SQL standards.
///
/// Parameters are positional `?` markers and writes cannot return rows.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericDialect;

impl GenericDialect {
    /// Creates a new generic dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for GenericDialect {
    fn name(&self) -> &'static str {
        "generic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{ArgumentMap, ArgumentSource, DesiredColumns, InsertOptions, ParameterList, SqlBuilder};
    use crate::dialect::{ParameterStyle, RowImage, RowTarget};
    use crate::error::Error;
    use crate::metadata::{ColumnMetadata, ObjectName, TableOrViewMetadata};
    use crate::rules::RuleContext;
    use crate::value::SqlType;

    fn product() -> TableOrViewMetadata {
        TableOrViewMetadata::new(
            ObjectName::new("Product"),
            true,
            vec![
                ColumnMetadata::new("ProductKey", SqlType::BigInt).primary_key(),
                ColumnMetadata::new("Name", SqlType::Text),
                ColumnMetadata::new("Price", SqlType::Double),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_generic_dialect() {
        let dialect = GenericDialect::new();
        assert_eq!(dialect.name(), "generic");
        assert_eq!(dialect.identifier_quote(), '"');
        assert_eq!(dialect.parameter_style(), ParameterStyle::Positional);
        assert!(!dialect.supports_returning());
        assert!(!dialect.supports_upsert());
        assert_eq!(dialect.quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_generic_insert_and_update() {
        let table = product();
        let dialect = GenericDialect::new();
        let args = ArgumentSource::from(
            ArgumentMap::new()
                .with("ProductKey", 7_i64)
                .with("Name", "Widget"),
        );
        let mut builder = SqlBuilder::new(&dialect, &table);
        builder.apply_argument(&args, false).unwrap();

        let mut params = ParameterList::new(dialect.parameter_style());
        let sql = dialect
            .insert(&builder, &mut params, &InsertOptions::default())
            .unwrap();
        assert_eq!(sql, "INSERT INTO \"Product\" (\"ProductKey\", \"Name\") VALUES (?, ?)");

        let mut params = ParameterList::new(dialect.parameter_style());
        let sql = dialect
            .update(&builder, &mut params, RowTarget::Key, RowImage::After)
            .unwrap();
        assert_eq!(sql, "UPDATE \"Product\" SET \"Name\" = ? WHERE \"ProductKey\" = ?");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_generic_cannot_return_rows() {
        let table = product();
        let dialect = GenericDialect::new();
        let mut builder = SqlBuilder::new(&dialect, &table);
        builder
            .apply_desired_columns(&DesiredColumns::AutoSelect, &RuleContext::default())
            .unwrap();
        let mut params = ParameterList::new(dialect.parameter_style());
        let err = dialect
            .insert(&builder, &mut params, &InsertOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }
}
