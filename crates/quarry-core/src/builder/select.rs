//! Select command: rows or aggregates from a table or view.

use super::{
    Aggregate, ArgumentSource, CommandContext, DesiredColumns, SortExpression, SqlBuilder,
};
use crate::command::CommandExecutionToken;
use crate::dialect::SelectClauses;
use crate::error::{Error, Result};
use crate::metadata::TableOrViewMetadata;
use crate::rules::OperationTypes;

/// Reads rows from a table or view.
///
/// Soft-deleted rows are hidden whenever a soft-delete rule covering selects
/// has its column on the table.
#[derive(Debug, Default)]
pub struct SelectCommand<'a> {
    criteria: Option<ArgumentSource<'a>>,
    desired: DesiredColumns,
    sort: Vec<SortExpression>,
    limit: Option<u64>,
    offset: Option<u64>,
    aggregates: Vec<Aggregate>,
    group_by: Vec<String>,
}

impl<'a> SelectCommand<'a> {
    /// Selects every row.
    #[must_use]
    pub fn new() -> Self {
        Self {
            desired: DesiredColumns::All,
            ..Self::default()
        }
    }

    /// Restricts rows with a filter or where text.
    #[must_use]
    pub fn with_criteria(mut self, criteria: ArgumentSource<'a>) -> Self {
        self.criteria = Some(criteria);
        self
    }

    /// Sets the projected columns.
    #[must_use]
    pub fn with_columns(mut self, desired: DesiredColumns) -> Self {
        self.desired = desired;
        self
    }

    /// Appends sort expressions.
    #[must_use]
    pub fn with_sorting<I, S>(mut self, sort: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SortExpression>,
    {
        self.sort.extend(sort.into_iter().map(Into::into));
        self
    }

    /// Limits the number of rows.
    #[must_use]
    pub const fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips rows.
    #[must_use]
    pub const fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Projects aggregates instead of rows.
    #[must_use]
    pub fn with_aggregates(mut self, aggregates: impl IntoIterator<Item = Aggregate>) -> Self {
        self.aggregates.extend(aggregates);
        self
    }

    /// Groups aggregates by columns, which are projected ahead of them.
    #[must_use]
    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Returns the projected columns.
    #[must_use]
    pub const fn desired(&self) -> &DesiredColumns {
        &self.desired
    }

    /// Builds the command against `table`.
    ///
    /// # Errors
    ///
    /// Fails on unknown columns, restricted columns, marker rewriting, and
    /// dialect errors.
    pub fn build(
        &self,
        context: &CommandContext<'_>,
        table: &TableOrViewMetadata,
    ) -> Result<CommandExecutionToken> {
        let operation = OperationTypes::SELECT;
        let mut builder = SqlBuilder::new(context.dialect, table);
        if let Some(criteria) = &self.criteria {
            builder.set_criteria(criteria, context.strict_mode)?;
        }

        let mut clauses = SelectClauses {
            limit: self.limit,
            offset: self.offset,
            ..SelectClauses::default()
        };
        if self.aggregates.is_empty() {
            if !self.group_by.is_empty() {
                return Err(Error::InvalidArgument(
                    "grouping requires at least one aggregate".to_string(),
                ));
            }
            builder.apply_desired_columns(&self.desired, context.rules)?;
        } else {
            // restrictions are enforced on every column the aggregates read
            let read: Vec<String> = self
                .group_by
                .iter()
                .cloned()
                .chain(self.aggregates.iter().filter_map(|a| a.column().map(str::to_string)))
                .collect();
            builder.apply_desired_columns(&DesiredColumns::Explicit(read), context.rules)?;
            let mut projection = Vec::with_capacity(self.group_by.len() + self.aggregates.len());
            for name in &self.group_by {
                let column = self.column(table, name)?;
                let quoted = context.dialect.quote_identifier(column);
                projection.push(quoted.clone());
                clauses.group_by.push(quoted);
            }
            for aggregate in &self.aggregates {
                projection.push(aggregate.render(table, context.dialect)?);
            }
            clauses.projection = Some(projection.join(", "));
        }
        for sort in &self.sort {
            clauses.order_by.push(sort.render(table, context.dialect)?);
        }

        let mut params = context.parameters();
        let mut conditions = Vec::new();
        if let Some(condition) = builder.criteria_condition(&mut params, operation)? {
            conditions.push(format!("({condition})"));
        }
        if let Some(condition) = builder.soft_delete_condition(context.rules, &mut params) {
            conditions.push(condition);
        }
        let sql = context.dialect.select(&builder, &mut params, &conditions, &clauses)?;
        Ok(context.token("select", operation, table.name(), sql, params))
    }

    fn column<'t>(&self, table: &'t TableOrViewMetadata, name: &str) -> Result<&'t str> {
        table.column(name).map(|c| c.sql_name.as_str()).ok_or_else(|| {
            Error::Mapping(format!(
                "cannot group by '{name}': no such column on '{}'",
                table.name()
            ))
        })
    }
}
