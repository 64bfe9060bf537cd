//! Stored procedure and table-valued function calls.

use super::{ArgumentSource, CommandContext, DesiredColumns, ParameterList, SqlBuilder};
use crate::command::CommandExecutionToken;
use crate::error::{Error, Result};
use crate::metadata::{
    ParameterMetadata, StoredProcedureMetadata, TableFunctionMetadata, TableOrViewMetadata,
};
use crate::rules::{ArgumentView, OperationTypes};
use crate::value::SqlValue;

/// Binds routine parameters in declaration order from `arguments`.
///
/// Parameters the arguments do not mention are bound as `NULL`; arguments
/// naming no parameter are a mapping error.
fn bind_routine_arguments(
    routine: &str,
    declared: &[ParameterMetadata],
    arguments: &ArgumentSource<'_>,
    params: &mut ParameterList,
) -> Result<Vec<String>> {
    if let Some((name, _)) = arguments
        .named_values()
        .into_iter()
        .find(|(name, _)| !declared.iter().any(|p| p.name.eq_ignore_ascii_case(name)))
    {
        return Err(Error::Mapping(format!(
            "'{name}' does not match any parameter of '{routine}'"
        )));
    }
    let mut placeholders = Vec::with_capacity(declared.len());
    for parameter in declared {
        let value = arguments.value(&parameter.name).unwrap_or(SqlValue::Null);
        placeholders.push(params.bind(&parameter.name, value, parameter.sql_type));
    }
    Ok(placeholders)
}

/// Calls a stored procedure.
#[derive(Debug)]
pub struct ProcedureCall<'a> {
    arguments: ArgumentSource<'a>,
}

impl<'a> ProcedureCall<'a> {
    /// Creates a call with `arguments` keyed by parameter name.
    pub fn new(arguments: impl Into<ArgumentSource<'a>>) -> Self {
        Self {
            arguments: arguments.into(),
        }
    }

    /// Builds the call against `procedure`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] when the dialect has no stored
    /// procedures and [`Error::Mapping`] for unknown arguments.
    pub fn build(
        &self,
        context: &CommandContext<'_>,
        procedure: &StoredProcedureMetadata,
    ) -> Result<CommandExecutionToken> {
        if !context.dialect.supports_stored_procedures() {
            return Err(Error::Unsupported(format!(
                "the {} dialect has no stored procedures",
                context.dialect.name()
            )));
        }
        let routine = procedure.name.to_string();
        let mut params = context.parameters();
        let placeholders =
            bind_routine_arguments(&routine, &procedure.parameters, &self.arguments, &mut params)?;
        for (index, declared) in procedure.parameters.iter().enumerate() {
            params.set_direction(index, declared.direction);
        }
        let (text, kind) = context.dialect.procedure_call(&procedure.name, &placeholders);
        Ok(context
            .token("call", OperationTypes::ALL, &procedure.name, text, params)
            .with_kind(kind))
    }
}

/// Selects from a table-valued function.
#[derive(Debug)]
pub struct TableFunctionCall<'a> {
    arguments: ArgumentSource<'a>,
    desired: DesiredColumns,
}

impl<'a> TableFunctionCall<'a> {
    /// Creates a call with `arguments` keyed by parameter name.
    pub fn new(arguments: impl Into<ArgumentSource<'a>>) -> Self {
        Self {
            arguments: arguments.into(),
            desired: DesiredColumns::All,
        }
    }

    /// Sets the projected columns.
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

    /// Builds the call against `function`.
    ///
    /// # Errors
    ///
    /// Fails on unknown arguments, unknown or restricted columns.
    pub fn build(
        &self,
        context: &CommandContext<'_>,
        function: &TableFunctionMetadata,
    ) -> Result<CommandExecutionToken> {
        let result = TableOrViewMetadata::new(function.name.clone(), false, function.columns.clone())?;
        let mut builder = SqlBuilder::new(context.dialect, &result);
        builder.apply_desired_columns(&self.desired, context.rules)?;
        let projection = if builder.has_output() {
            builder.output_list(None)
        } else {
            "*".to_string()
        };

        let routine = function.name.to_string();
        let mut params = context.parameters();
        let placeholders =
            bind_routine_arguments(&routine, &function.parameters, &self.arguments, &mut params)?;
        let sql = context
            .dialect
            .table_function(&function.name, &projection, &placeholders);
        Ok(context.token("table_function", OperationTypes::SELECT, &function.name, sql, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ArgumentMap;
    use crate::command::CommandKind;
    use crate::dialect::{GenericDialect, PostgresDialect, SqlServerDialect};
    use crate::metadata::{ColumnMetadata, ObjectName, ParameterDirection};
    use crate::rules::RuleContext;
    use crate::value::SqlType;

    fn procedure() -> StoredProcedureMetadata {
        StoredProcedureMetadata {
            name: ObjectName::qualified("Sales", "CustomerWithOrdersByState"),
            parameters: vec![
                ParameterMetadata::input("@State", SqlType::Text),
                ParameterMetadata::input("@Total", SqlType::Double)
                    .with_direction(ParameterDirection::Out),
            ],
        }
    }

    #[test]
    fn test_sql_server_procedure_call() {
        let dialect = SqlServerDialect::new();
        let rules = RuleContext::default();
        let context = CommandContext::new(&dialect, &rules);
        let token = ProcedureCall::new(ArgumentMap::new().with("State", "CA"))
            .build(&context, &procedure())
            .unwrap();
        assert_eq!(token.kind(), CommandKind::StoredProcedure);
        assert_eq!(token.command_text(), "[Sales].[CustomerWithOrdersByState]");
        assert_eq!(token.parameters()[0].value, SqlValue::Text("CA".into()));
        assert_eq!(token.parameters()[1].value, SqlValue::Null);
        assert_eq!(token.parameters()[1].direction, ParameterDirection::Out);
    }

    #[test]
    fn test_text_procedure_call() {
        let dialect = PostgresDialect::new();
        let rules = RuleContext::default();
        let context = CommandContext::new(&dialect, &rules);
        let token = ProcedureCall::new(ArgumentMap::new().with("state", "CA"))
            .build(&context, &procedure())
            .unwrap();
        assert_eq!(token.kind(), CommandKind::Text);
        assert_eq!(
            token.command_text(),
            "CALL \"Sales\".\"CustomerWithOrdersByState\"($1, $2)"
        );
    }

    #[test]
    fn test_unknown_argument() {
        let dialect = GenericDialect::new();
        let rules = RuleContext::default();
        let context = CommandContext::new(&dialect, &rules);
        let err = ProcedureCall::new(ArgumentMap::new().with("Region", "West"))
            .build(&context, &procedure())
            .unwrap_err();
        assert!(matches!(err, Error::Mapping(ref m) if m.contains("Region")));
    }

    #[test]
    fn test_table_function_projection() {
        let function = TableFunctionMetadata {
            name: ObjectName::new("orders_by_customer"),
            parameters: vec![ParameterMetadata::input("customer", SqlType::BigInt)],
            columns: vec![
                ColumnMetadata::new("order_id", SqlType::BigInt),
                ColumnMetadata::new("total", SqlType::Double),
            ],
        };
        let dialect = PostgresDialect::new();
        let rules = RuleContext::default();
        let context = CommandContext::new(&dialect, &rules);
        let token = TableFunctionCall::new(ArgumentMap::new().with("customer", 4_i64))
            .with_columns(DesiredColumns::explicit(["total"]))
            .build(&context, &function)
            .unwrap();
        assert_eq!(
            token.command_text(),
            "SELECT \"total\" FROM \"orders_by_customer\"($1)"
        );
        assert!(token.is_read_only());
    }
}
