//! Update commands: by key and by criteria.

use super::{ArgumentSource, CommandContext, DesiredColumns, SqlBuilder, UpdateOptions};
use crate::command::CommandExecutionToken;
use crate::dialect::{RowImage, RowTarget};
use crate::error::{Error, Result};
use crate::metadata::TableOrViewMetadata;
use crate::rules::OperationTypes;

/// Updates the row located by key, or every row matched by criteria.
#[derive(Debug)]
pub struct UpdateCommand<'a> {
    values: ArgumentSource<'a>,
    criteria: Option<ArgumentSource<'a>>,
    desired: DesiredColumns,
    options: UpdateOptions,
    expected_rows: Option<u64>,
}

impl<'a> UpdateCommand<'a> {
    /// Updates the row whose key values `values` carries.
    pub fn by_key(values: impl Into<ArgumentSource<'a>>) -> Self {
        Self {
            values: values.into(),
            criteria: None,
            desired: DesiredColumns::NoColumns,
            options: UpdateOptions::default(),
            expected_rows: None,
        }
    }

    /// Writes `values` into every row matched by a filter or where text.
    pub fn by_criteria(
        values: impl Into<ArgumentSource<'a>>,
        criteria: ArgumentSource<'a>,
    ) -> Self {
        Self {
            criteria: Some(criteria),
            ..Self::by_key(values)
        }
    }

    /// Sets the columns projected back from the updated rows.
    #[must_use]
    pub fn with_columns(mut self, desired: DesiredColumns) -> Self {
        self.desired = desired;
        self
    }

    /// Returns the projected columns.
    #[must_use]
    pub const fn desired(&self) -> &DesiredColumns {
        &self.desired
    }

    /// Sets the update options.
    #[must_use]
    pub const fn with_options(mut self, options: UpdateOptions) -> Self {
        self.options = options;
        self
    }

    /// Requires exactly `rows` affected rows.
    #[must_use]
    pub const fn expect_rows(mut self, rows: u64) -> Self {
        self.expected_rows = Some(rows);
        self
    }

    fn expected_row_count(&self) -> Option<u64> {
        if self.expected_rows.is_some() {
            return self.expected_rows;
        }
        match (&self.criteria, self.options.ignore_rows_affected) {
            (None, false) => Some(1),
            _ => None,
        }
    }

    /// Builds the command against `table`.
    ///
    /// # Errors
    ///
    /// Fails on validation, mapping, restriction, key, conflict, and dialect
    /// errors before any SQL is emitted.
    pub fn build(
        &self,
        context: &CommandContext<'_>,
        table: &TableOrViewMetadata,
    ) -> Result<CommandExecutionToken> {
        let operation = OperationTypes::UPDATE;
        context.rules.rules().check_validation(&self.values, operation)?;

        let mut builder = SqlBuilder::new(context.dialect, table);
        builder.apply_argument(&self.values, context.strict_mode)?;
        if self.options.use_key_attribute {
            let ArgumentSource::Record(record) = &self.values else {
                return Err(Error::InvalidArgument(
                    "key attributes can only be read from a record".to_string(),
                ));
            };
            builder.use_key_attribute(record.record_descriptor())?;
        }
        builder.apply_rules(context.rules, operation)?;
        builder.check_restrictions(context.rules, operation, false)?;
        let target = match &self.criteria {
            Some(criteria) => {
                builder.set_criteria(criteria, context.strict_mode)?;
                RowTarget::Criteria
            }
            None => RowTarget::Key,
        };
        builder.apply_desired_columns(&self.desired, context.rules)?;

        let image = if self.options.return_old_values {
            RowImage::Before
        } else {
            RowImage::After
        };
        let mut params = context.parameters();
        let sql = context.dialect.update(&builder, &mut params, target, image)?;
        let name = match target {
            RowTarget::Key => "update",
            RowTarget::Criteria => "update_set",
        };
        Ok(context
            .token(name, operation, table.name(), sql, params)
            .with_expected_row_count(self.expected_row_count()))
    }
}
