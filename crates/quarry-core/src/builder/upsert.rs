//! Insert-or-update command.

use super::{ArgumentSource, CommandContext, DesiredColumns, SqlBuilder, UpsertOptions};
use crate::command::CommandExecutionToken;
use crate::error::{Error, Result};
use crate::metadata::TableOrViewMetadata;
use crate::rules::OperationTypes;

/// Inserts a row, or updates it when a row with the same key exists.
#[derive(Debug)]
pub struct UpsertCommand<'a> {
    arguments: ArgumentSource<'a>,
    desired: DesiredColumns,
    options: UpsertOptions,
}

impl<'a> UpsertCommand<'a> {
    /// Creates an upsert of `arguments`.
    pub fn new(arguments: impl Into<ArgumentSource<'a>>) -> Self {
        Self {
            arguments: arguments.into(),
            desired: DesiredColumns::NoColumns,
            options: UpsertOptions::default(),
        }
    }

    /// Sets the columns projected back from the written row.
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

    /// Sets the upsert options.
    #[must_use]
    pub const fn with_options(mut self, options: UpsertOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds the command against `table`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] for dialects without upsert, and the
    /// same failures as inserts and updates otherwise.
    pub fn build(
        &self,
        context: &CommandContext<'_>,
        table: &TableOrViewMetadata,
    ) -> Result<CommandExecutionToken> {
        if !context.dialect.supports_upsert() {
            return Err(Error::Unsupported(format!(
                "the {} dialect has no upsert",
                context.dialect.name()
            )));
        }
        let operation = OperationTypes::INSERT_OR_UPDATE;
        context.rules.rules().check_validation(&self.arguments, operation)?;

        let mut builder = SqlBuilder::new(context.dialect, table);
        builder.apply_argument(&self.arguments, context.strict_mode)?;
        builder.apply_rules(context.rules, operation)?;
        builder.check_restrictions(context.rules, operation, self.options.identity_insert)?;
        builder.apply_desired_columns(&self.desired, context.rules)?;

        let mut params = context.parameters();
        let sql = context.dialect.upsert(&builder, &mut params, &self.options)?;
        Ok(context.token("upsert", operation, table.name(), sql, params))
    }
}
