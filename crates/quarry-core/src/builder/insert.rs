//! Insert command.

use super::{ArgumentSource, CommandContext, DesiredColumns, InsertOptions, SqlBuilder};
use crate::command::CommandExecutionToken;
use crate::error::Result;
use crate::metadata::TableOrViewMetadata;
use crate::rules::OperationTypes;

/// Inserts one row built from a record or map.
#[derive(Debug)]
pub struct InsertCommand<'a> {
    arguments: ArgumentSource<'a>,
    desired: DesiredColumns,
    options: InsertOptions,
}

impl<'a> InsertCommand<'a> {
    /// Creates an insert of `arguments`.
    pub fn new(arguments: impl Into<ArgumentSource<'a>>) -> Self {
        Self {
            arguments: arguments.into(),
            desired: DesiredColumns::NoColumns,
            options: InsertOptions::default(),
        }
    }

    /// Sets the columns projected back from the new row.
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

    /// Sets the insert options.
    #[must_use]
    pub const fn with_options(mut self, options: InsertOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the argument source.
    #[must_use]
    pub const fn arguments(&self) -> &ArgumentSource<'a> {
        &self.arguments
    }

    /// Builds the command against `table`.
    ///
    /// # Errors
    ///
    /// Fails on validation, mapping, restriction, and dialect errors; nothing
    /// is emitted when any of them fires.
    pub fn build(
        &self,
        context: &CommandContext<'_>,
        table: &TableOrViewMetadata,
    ) -> Result<CommandExecutionToken> {
        let operation = OperationTypes::INSERT;
        context.rules.rules().check_validation(&self.arguments, operation)?;

        let mut builder = SqlBuilder::new(context.dialect, table);
        builder.apply_argument(&self.arguments, context.strict_mode)?;
        builder.apply_rules(context.rules, operation)?;
        builder.check_restrictions(context.rules, operation, self.options.identity_insert)?;
        builder.apply_desired_columns(&self.desired, context.rules)?;

        let mut params = context.parameters();
        let sql = context.dialect.insert(&builder, &mut params, &self.options)?;
        Ok(context.token("insert", operation, table.name(), sql, params))
    }
}
