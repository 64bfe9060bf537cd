//! SQL Dialect support.
//!
//! Different databases have slightly different SQL syntax. A [`Dialect`]
//! assembles statements from the clause primitives of a [`SqlBuilder`]; the
//! default methods emit ANSI SQL and each engine overrides what differs:
//! identifier quoting, parameter markers, how written rows are projected
//! back, paging, and upsert.

mod generic;
mod mysql;
mod postgres;
mod sqlserver;

pub use generic::GenericDialect;
pub use mysql::MySqlDialect;
pub use postgres::PostgresDialect;
pub use sqlserver::SqlServerDialect;

use crate::builder::{InsertOptions, ParameterList, SqlBuilder, UpsertOptions};
use crate::command::CommandKind;
use crate::error::{Error, Result};
use crate::metadata::ObjectName;
use crate::rules::OperationTypes;

/// Parameter placeholder style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterStyle {
    /// `?`, one parameter per reference.
    Positional,
    /// A prefix followed by the 1-based index (`$1`, `?1`).
    Numbered(&'static str),
    /// A prefix followed by the parameter name (`@name`).
    Named(&'static str),
}

/// How a dialect projects rows touched by a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStyle {
    /// Writes cannot return rows.
    None,
    /// A trailing `RETURNING` clause.
    Returning,
    /// An `OUTPUT Inserted.*` / `OUTPUT Deleted.*` clause.
    OutputClause,
}

/// Which row image an update projects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowImage {
    /// The row after the write.
    After,
    /// The row before the write.
    Before,
}

/// Which rows an update or delete targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowTarget {
    /// The row identified by the key entries.
    Key,
    /// The rows matched by the attached filter or where text.
    Criteria,
}

/// Select clauses beyond the projection and conditions.
#[derive(Debug, Clone, Default)]
pub struct SelectClauses {
    /// Rendered projection; `None` projects the builder's output columns.
    pub projection: Option<String>,
    /// Rendered `ORDER BY` terms.
    pub order_by: Vec<String>,
    /// Rendered `GROUP BY` terms.
    pub group_by: Vec<String>,
    /// Maximum rows.
    pub limit: Option<u64>,
    /// Rows to skip.
    pub offset: Option<u64>,
}

/// Trait for SQL dialect-specific behavior.
pub trait Dialect: Send + Sync {
    /// Returns the name of the dialect.
    fn name(&self) -> &'static str;

    /// Returns the identifier quote character (e.g., `"` for standard SQL, `` ` `` for MySQL).
    fn identifier_quote(&self) -> char {
        '"'
    }

    /// Returns the parameter placeholder style.
    fn parameter_style(&self) -> ParameterStyle {
        ParameterStyle::Positional
    }

    /// Returns how writes project rows back.
    fn output_style(&self) -> OutputStyle {
        OutputStyle::None
    }

    /// Returns whether the dialect supports RETURNING clause.
    fn supports_returning(&self) -> bool {
        self.output_style() == OutputStyle::Returning
    }

    /// Returns whether an update can project the pre-update image.
    fn supports_old_values(&self) -> bool {
        self.output_style() == OutputStyle::OutputClause
    }

    /// Returns whether the dialect supports upsert.
    fn supports_upsert(&self) -> bool {
        false
    }

    /// Returns whether the dialect has stored procedures.
    fn supports_stored_procedures(&self) -> bool {
        true
    }

    /// Quotes an identifier, doubling embedded quote characters.
    fn quote_identifier(&self, name: &str) -> String {
        let quote = self.identifier_quote();
        let escaped = name.replace(quote, &format!("{quote}{quote}"));
        format!("{quote}{escaped}{quote}")
    }

    /// Quotes a possibly schema-qualified object name.
    fn quote_object(&self, name: &ObjectName) -> String {
        match &name.schema {
            Some(schema) => format!(
                "{}.{}",
                self.quote_identifier(schema),
                self.quote_identifier(&name.name)
            ),
            None => self.quote_identifier(&name.name),
        }
    }

    /// Builds an insert.
    ///
    /// # Errors
    ///
    /// Fails when rows are requested back and the dialect cannot return them.
    fn insert(
        &self,
        builder: &SqlBuilder<'_>,
        params: &mut ParameterList,
        options: &InsertOptions,
    ) -> Result<String> {
        let columns = builder.insert_columns(options.identity_insert);
        let mut sql = format!("INSERT INTO {}", builder.table_name());
        if !columns.is_empty() {
            sql.push_str(&format!(" ({})", builder.column_list(&columns)));
        }
        if builder.has_output() {
            match self.output_style() {
                OutputStyle::OutputClause => {
                    sql.push_str(&format!(" OUTPUT {}", builder.output_list(Some("Inserted"))));
                }
                OutputStyle::Returning => {}
                OutputStyle::None => return Err(no_output(self.name(), "insert")),
            }
        }
        if columns.is_empty() {
            sql.push_str(" DEFAULT VALUES");
        } else {
            sql.push_str(&format!(" VALUES ({})", builder.values_list(&columns, params)));
        }
        if builder.has_output() && self.output_style() == OutputStyle::Returning {
            sql.push_str(&format!(" RETURNING {}", builder.output_list(None)));
        }
        Ok(sql)
    }

    /// Builds an update.
    ///
    /// # Errors
    ///
    /// Fails when there is nothing to set, the target condition cannot be
    /// built, or the requested image cannot be projected.
    fn update(
        &self,
        builder: &SqlBuilder<'_>,
        params: &mut ParameterList,
        target: RowTarget,
        image: RowImage,
    ) -> Result<String> {
        if builder.update_columns().is_empty() {
            return Err(Error::InvalidArgument(format!(
                "nothing to update on '{}'",
                builder.table().name()
            )));
        }
        if builder.has_output() && image == RowImage::Before && !self.supports_old_values() {
            return Err(Error::Unsupported(format!(
                "the {} dialect cannot return pre-update values",
                self.name()
            )));
        }
        let mut sql = format!("UPDATE {} SET {}", builder.table_name(), builder.set_list(params));
        if builder.has_output() {
            match self.output_style() {
                OutputStyle::OutputClause => {
                    let qualifier = match image {
                        RowImage::After => "Inserted",
                        RowImage::Before => "Deleted",
                    };
                    sql.push_str(&format!(" OUTPUT {}", builder.output_list(Some(qualifier))));
                }
                OutputStyle::Returning => {}
                OutputStyle::None => return Err(no_output(self.name(), "update")),
            }
        }
        let condition = target_condition(builder, params, target, OperationTypes::UPDATE)?;
        if let Some(condition) = condition {
            sql.push_str(&format!(" WHERE {condition}"));
        }
        if builder.has_output() && self.output_style() == OutputStyle::Returning {
            sql.push_str(&format!(" RETURNING {}", builder.output_list(None)));
        }
        Ok(sql)
    }

    /// Builds a delete. Projected rows are the deleted rows.
    ///
    /// # Errors
    ///
    /// Fails when the target condition cannot be built or rows are requested
    /// back and the dialect cannot return them.
    fn delete(
        &self,
        builder: &SqlBuilder<'_>,
        params: &mut ParameterList,
        target: RowTarget,
    ) -> Result<String> {
        let mut sql = format!("DELETE FROM {}", builder.table_name());
        if builder.has_output() {
            match self.output_style() {
                OutputStyle::OutputClause => {
                    sql.push_str(&format!(" OUTPUT {}", builder.output_list(Some("Deleted"))));
                }
                OutputStyle::Returning => {}
                OutputStyle::None => return Err(no_output(self.name(), "delete")),
            }
        }
        let condition = target_condition(builder, params, target, OperationTypes::DELETE)?;
        if let Some(condition) = condition {
            sql.push_str(&format!(" WHERE {condition}"));
        }
        if builder.has_output() && self.output_style() == OutputStyle::Returning {
            sql.push_str(&format!(" RETURNING {}", builder.output_list(None)));
        }
        Ok(sql)
    }

    /// Builds an insert-or-update on the key.
    ///
    /// # Errors
    ///
    /// The default reports the dialect as unsupported.
    fn upsert(
        &self,
        _builder: &SqlBuilder<'_>,
        _params: &mut ParameterList,
        _options: &UpsertOptions,
    ) -> Result<String> {
        Err(Error::Unsupported(format!("the {} dialect has no upsert", self.name())))
    }

    /// Builds a select over the builder's table.
    ///
    /// # Errors
    ///
    /// Fails when the conditions or paging clause cannot be built.
    fn select(
        &self,
        builder: &SqlBuilder<'_>,
        params: &mut ParameterList,
        conditions: &[String],
        clauses: &SelectClauses,
    ) -> Result<String> {
        let projection = match &clauses.projection {
            Some(projection) => projection.clone(),
            None if builder.has_output() => builder.output_list(None),
            None => "1".to_string(),
        };
        let mut sql = format!("SELECT {projection} FROM {}", builder.table_name());
        if !conditions.is_empty() {
            sql.push_str(&format!(" WHERE {}", conditions.join(" AND ")));
        }
        if !clauses.group_by.is_empty() {
            sql.push_str(&format!(" GROUP BY {}", clauses.group_by.join(", ")));
        }
        if !clauses.order_by.is_empty() {
            sql.push_str(&format!(" ORDER BY {}", clauses.order_by.join(", ")));
        }
        let ordered = !clauses.order_by.is_empty();
        sql.push_str(&self.paging_clause(clauses.limit, clauses.offset, ordered, params)?);
        Ok(sql)
    }

    /// Renders paging, including its leading space.
    ///
    /// # Errors
    ///
    /// Dialect-specific; the default never fails.
    fn paging_clause(
        &self,
        limit: Option<u64>,
        offset: Option<u64>,
        _ordered: bool,
        _params: &mut ParameterList,
    ) -> Result<String> {
        Ok(match (limit, offset) {
            (None, None) => String::new(),
            (Some(limit), None) => format!(" LIMIT {limit}"),
            (Some(limit), Some(offset)) => format!(" LIMIT {limit} OFFSET {offset}"),
            (None, Some(offset)) => format!(" OFFSET {offset}"),
        })
    }

    /// Builds a stored procedure call from rendered argument placeholders.
    fn procedure_call(&self, name: &ObjectName, arguments: &[String]) -> (String, CommandKind) {
        (
            format!("CALL {}({})", self.quote_object(name), arguments.join(", ")),
            CommandKind::Text,
        )
    }

    /// Builds a select over a table-valued function.
    fn table_function(&self, name: &ObjectName, projection: &str, arguments: &[String]) -> String {
        format!(
            "SELECT {projection} FROM {}({})",
            self.quote_object(name),
            arguments.join(", ")
        )
    }
}

/// Renders the condition locating the rows of an update or delete.
///
/// # Errors
///
/// Propagates key and criteria failures.
pub fn target_condition(
    builder: &SqlBuilder<'_>,
    params: &mut ParameterList,
    target: RowTarget,
    operation: OperationTypes,
) -> Result<Option<String>> {
    match target {
        RowTarget::Key => builder.key_condition(params, None).map(Some),
        RowTarget::Criteria => builder.criteria_condition(params, operation),
    }
}

fn no_output(dialect: &str, operation: &str) -> Error {
    Error::Unsupported(format!("the {dialect} dialect cannot return rows from {operation} statements"))
}
