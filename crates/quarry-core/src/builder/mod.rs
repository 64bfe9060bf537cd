//! Command builders.
//!
//! A command describes one logical operation (insert, update, select, ...)
//! over caller arguments. Building it against resolved metadata runs the
//! audit rules, classifies every column through a [`SqlBuilder`] and lets the
//! dialect assemble a parameterized [`CommandExecutionToken`].
//!
//! # Example
//!
//! ```rust
//! use quarry_core::builder::{ArgumentMap, CommandContext, InsertCommand};
//! use quarry_core::dialect::PostgresDialect;
//! use quarry_core::metadata::{ColumnMetadata, ObjectName, TableOrViewMetadata};
//! use quarry_core::rules::RuleContext;
//! use quarry_core::value::SqlType;
//!
//! let table = TableOrViewMetadata::new(
//!     ObjectName::new("users"),
//!     true,
//!     vec![
//!         ColumnMetadata::new("id", SqlType::BigInt).identity().primary_key(),
//!         ColumnMetadata::new("name", SqlType::Text),
//!     ],
//! )
//! .unwrap();
//!
//! let dialect = PostgresDialect::new();
//! let rules = RuleContext::default();
//! let context = CommandContext::new(&dialect, &rules);
//! let token = InsertCommand::new(ArgumentMap::new().with("name", "alice"))
//!     .build(&context, &table)
//!     .unwrap();
//!
//! assert_eq!(token.command_text(), "INSERT INTO \"users\" (\"name\") VALUES ($1)");
//! ```

mod aggregate;
mod argument;
mod delete;
mod insert;
mod options;
mod params;
mod routine;
mod select;
mod sort;
mod sql_builder;
mod update;
mod upsert;

pub use aggregate::{Aggregate, AggregateFunction};
pub use argument::{ArgumentMap, ArgumentSource};
pub use delete::DeleteCommand;
pub use insert::InsertCommand;
pub use options::{
    DeleteOptions, DesiredColumns, FilterNullHandling, FilterOptions, InsertOptions,
    UpdateOptions, UpsertOptions,
};
pub use params::{referenced_markers, rewrite_markers, ParameterList};
pub use routine::{ProcedureCall, TableFunctionCall};
pub use select::SelectCommand;
pub use sort::{SortDirection, SortExpression};
pub use sql_builder::{EntryValue, SqlBuilder, SqlBuilderEntry};
pub use update::UpdateCommand;
pub use upsert::UpsertCommand;

use tracing::debug;

use crate::command::CommandExecutionToken;
use crate::dialect::Dialect;
use crate::metadata::ObjectName;
use crate::rules::{OperationTypes, RuleContext};

/// What every command needs besides its own arguments.
#[derive(Clone, Copy)]
pub struct CommandContext<'a> {
    /// Target dialect.
    pub dialect: &'a dyn Dialect,
    /// Audit rules, current user, and clock.
    pub rules: &'a RuleContext,
    /// Reject record properties that match no column.
    pub strict_mode: bool,
}

impl<'a> CommandContext<'a> {
    /// Creates a non-strict context.
    #[must_use]
    pub fn new(dialect: &'a dyn Dialect, rules: &'a RuleContext) -> Self {
        Self {
            dialect,
            rules,
            strict_mode: false,
        }
    }

    /// Sets strict mode.
    #[must_use]
    pub const fn strict(mut self, strict_mode: bool) -> Self {
        self.strict_mode = strict_mode;
        self
    }

    pub(crate) fn parameters(&self) -> ParameterList {
        ParameterList::new(self.dialect.parameter_style())
    }

    pub(crate) fn token(
        &self,
        operation_name: &str,
        operation: OperationTypes,
        object: &ObjectName,
        sql: String,
        params: ParameterList,
    ) -> CommandExecutionToken {
        debug!(
            operation = operation_name,
            object = %object,
            dialect = self.dialect.name(),
            parameters = params.len(),
            sql = %sql,
            "Built command"
        );
        CommandExecutionToken::new(
            operation_name,
            operation,
            object.clone(),
            sql,
            params.into_parameters(),
        )
    }
}

impl std::fmt::Debug for CommandContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandContext")
            .field("dialect", &self.dialect.name())
            .field("strict_mode", &self.strict_mode)
            .finish_non_exhaustive()
    }
}
