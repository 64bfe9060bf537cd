//! Delete commands: by key and by criteria.
//!
//! On tables carrying the column of an active soft-delete rule a delete is
//! rewritten into an update that writes only rule-generated values, so the
//! row is flagged rather than removed.

use tracing::debug;

use super::{ArgumentSource, CommandContext, DeleteOptions, DesiredColumns, SqlBuilder};
use crate::command::CommandExecutionToken;
use crate::dialect::{RowImage, RowTarget};
use crate::error::{Error, Result};
use crate::metadata::TableOrViewMetadata;
use crate::rules::OperationTypes;

/// Deletes the row located by key, or every row matched by criteria.
#[derive(Debug)]
pub struct DeleteCommand<'a> {
    target: DeleteTarget<'a>,
    desired: DesiredColumns,
    options: DeleteOptions,
    expected_rows: Option<u64>,
}

#[derive(Debug)]
enum DeleteTarget<'a> {
    Key(ArgumentSource<'a>),
    Criteria(ArgumentSource<'a>),
}

impl<'a> DeleteCommand<'a> {
    /// Deletes the row whose key values `arguments` carries.
    pub fn by_key(arguments: impl Into<ArgumentSource<'a>>) -> Self {
        Self::with_target(DeleteTarget::Key(arguments.into()))
    }

    /// Deletes every row matched by a filter or where text.
    #[must_use]
    pub fn by_criteria(criteria: ArgumentSource<'a>) -> Self {
        Self::with_target(DeleteTarget::Criteria(criteria))
    }

    fn with_target(target: DeleteTarget<'a>) -> Self {
        Self {
            target,
            desired: DesiredColumns::NoColumns,
            options: DeleteOptions::default(),
            expected_rows: None,
        }
    }

    /// Sets the columns projected back from the deleted rows.
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

    /// Sets the delete options.
    #[must_use]
    pub const fn with_options(mut self, options: DeleteOptions) -> Self {
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
        match (&self.target, self.expected_rows) {
            (_, Some(rows)) => Some(rows),
            (DeleteTarget::Key(_), None) if self.options.check_rows_affected => Some(1),
            _ => None,
        }
    }

    /// Builds the command against `table`.
    ///
    /// # Errors
    ///
    /// Fails on mapping, restriction, key, and dialect errors before any SQL
    /// is emitted.
    pub fn build(
        &self,
        context: &CommandContext<'_>,
        table: &TableOrViewMetadata,
    ) -> Result<CommandExecutionToken> {
        let operation = OperationTypes::DELETE;
        let mut builder = SqlBuilder::new(context.dialect, table);
        let target = match &self.target {
            DeleteTarget::Key(arguments) => {
                builder.apply_argument(arguments, context.strict_mode)?;
                if self.options.use_key_attribute {
                    let ArgumentSource::Record(record) = arguments else {
                        return Err(Error::InvalidArgument(
                            "key attributes can only be read from a record".to_string(),
                        ));
                    };
                    builder.use_key_attribute(record.record_descriptor())?;
                }
                RowTarget::Key
            }
            DeleteTarget::Criteria(criteria) => {
                builder.set_criteria(criteria, context.strict_mode)?;
                RowTarget::Criteria
            }
        };
        builder.apply_desired_columns(&self.desired, context.rules)?;

        let soft_delete = context.rules.rules().use_soft_delete(table);
        let mut params = context.parameters();
        let sql = if soft_delete {
            debug!(object = %table.name(), "Delete rewritten as a soft delete");
            builder.retain_generated_values();
            builder.apply_rules(context.rules, operation)?;
            builder.check_restrictions(context.rules, operation, false)?;
            let image = if context.dialect.supports_old_values() {
                RowImage::Before
            } else {
                RowImage::After
            };
            context.dialect.update(&builder, &mut params, target, image)?
        } else {
            context.dialect.delete(&builder, &mut params, target)?
        };

        let name = match target {
            RowTarget::Key => "delete",
            RowTarget::Criteria => "delete_set",
        };
        Ok(context
            .token(name, operation, table.name(), sql, params)
            .with_expected_row_count(self.expected_row_count()))
    }
}
