//! Command execution tokens: the immutable output of the builder.

use std::fmt;

use crate::metadata::{ObjectName, ParameterDirection};
use crate::rules::OperationTypes;
use crate::value::{SqlType, SqlValue};

/// How the provider should interpret the command text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Plain SQL text.
    Text,
    /// The text is the name of a stored procedure.
    StoredProcedure,
}

/// A bound command parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Parameter name without any dialect prefix.
    pub name: String,
    /// Bound value.
    pub value: SqlValue,
    /// Database type the value is sent as.
    pub sql_type: SqlType,
    /// Direction, for stored procedure parameters.
    pub direction: ParameterDirection,
}

impl Parameter {
    /// Creates an input parameter.
    pub fn new(name: impl Into<String>, value: SqlValue, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            value,
            sql_type,
            direction: ParameterDirection::In,
        }
    }
}

/// Everything a provider needs to execute one command.
///
/// Tokens are immutable once built. The expected row count is recorded here
/// and checked by the execution layer, never by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandExecutionToken {
    operation_name: String,
    operation: OperationTypes,
    object_name: ObjectName,
    command_text: String,
    parameters: Vec<Parameter>,
    kind: CommandKind,
    expected_row_count: Option<u64>,
}

impl CommandExecutionToken {
    /// Creates a text command.
    pub fn new(
        operation_name: impl Into<String>,
        operation: OperationTypes,
        object_name: ObjectName,
        command_text: impl Into<String>,
        parameters: Vec<Parameter>,
    ) -> Self {
        Self {
            operation_name: operation_name.into(),
            operation,
            object_name,
            command_text: command_text.into(),
            parameters,
            kind: CommandKind::Text,
            expected_row_count: None,
        }
    }

    /// Sets the command kind.
    #[must_use]
    pub const fn with_kind(mut self, kind: CommandKind) -> Self {
        self.kind = kind;
        self
    }

    /// Records the number of rows the command must affect.
    #[must_use]
    pub const fn with_expected_row_count(mut self, expected: Option<u64>) -> Self {
        self.expected_row_count = expected;
        self
    }

    /// Name of the logical operation (`insert`, `update`, ...).
    #[must_use]
    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    /// Operation class of the command.
    #[must_use]
    pub const fn operation(&self) -> OperationTypes {
        self.operation
    }

    /// Returns whether the command only reads.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.operation == OperationTypes::SELECT
    }

    /// Table, view, or routine the command targets.
    #[must_use]
    pub const fn object_name(&self) -> &ObjectName {
        &self.object_name
    }

    /// SQL text, or the procedure name for stored procedures.
    #[must_use]
    pub fn command_text(&self) -> &str {
        &self.command_text
    }

    /// Ordered parameters.
    #[must_use]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Command kind.
    #[must_use]
    pub const fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Expected affected-row count, if the command recorded one.
    #[must_use]
    pub const fn expected_row_count(&self) -> Option<u64> {
        self.expected_row_count
    }
}

impl fmt::Display for CommandExecutionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.operation_name, self.object_name, self.command_text)
    }
}
