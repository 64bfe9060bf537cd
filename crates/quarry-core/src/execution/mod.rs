//! Execution of command tokens.
//!
//! The [`Executor`] trait is the provider collaborator: it performs the
//! network I/O for one [`CommandExecutionToken`] and returns rows, an
//! affected-row count, or both. An [`ExecutionChain`] wraps an executor with
//! an ordered list of [`Stage`]s; each stage receives a [`Next`] and may
//! either call through or short-circuit with its own result.
//!
//! ```
//! use std::sync::Arc;
//! use quarry_core::execution::{ExecutionChain, ExecutionMode, RecordingExecutor, TracingStage};
//! use quarry_core::CommandExecutionToken;
//! use quarry_core::metadata::ObjectName;
//! use quarry_core::rules::OperationTypes;
//!
//! # futures::executor::block_on(async {
//! let chain = ExecutionChain::new(Arc::new(RecordingExecutor::new()))
//!     .with_stage(Arc::new(TracingStage));
//! let token = CommandExecutionToken::new(
//!     "delete",
//!     OperationTypes::DELETE,
//!     ObjectName::new("Invoice"),
//!     "DELETE FROM Invoice",
//!     Vec::new(),
//! );
//! let result = chain.execute(&token, ExecutionMode::NonQuery).await.unwrap();
//! assert_eq!(result.rows_affected, Some(0));
//! # });
//! ```

mod cache;
mod cancel;
mod chain;
mod recording;
mod rows;

pub use cache::CachingStage;
pub use cancel::CancelToken;
pub use chain::{ExecutionChain, Next, Stage, TracingStage};
pub use recording::RecordingExecutor;
pub use rows::{FieldShape, RowCursor, RowSet, RowSetCursor, ShapeSignature};

use futures::future::BoxFuture;

use crate::command::CommandExecutionToken;
use crate::error::Result;

/// What the caller wants back from a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionMode {
    /// Read the rows the command produces.
    Rows,
    /// Only the affected-row count matters.
    NonQuery,
}

/// Outcome of executing one command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionResult {
    /// Rows produced by the command, if any were read.
    pub rows: Option<RowSet>,
    /// Affected-row count reported by the provider.
    pub rows_affected: Option<u64>,
}

impl ExecutionResult {
    /// A result carrying rows.
    #[must_use]
    pub const fn with_rows(rows: RowSet) -> Self {
        Self {
            rows: Some(rows),
            rows_affected: None,
        }
    }

    /// A result carrying only an affected-row count.
    #[must_use]
    pub const fn affected(rows_affected: u64) -> Self {
        Self {
            rows: None,
            rows_affected: Some(rows_affected),
        }
    }

    /// Sets the affected-row count.
    #[must_use]
    pub const fn and_affected(mut self, rows_affected: u64) -> Self {
        self.rows_affected = Some(rows_affected);
        self
    }

    /// The row count used for expectation checks: the provider's affected
    /// count, or the number of returned rows when none was reported.
    #[must_use]
    pub fn row_count(&self) -> Option<u64> {
        self.rows_affected
            .or_else(|| self.rows.as_ref().map(|r| r.len() as u64))
    }
}

/// The provider collaborator that runs commands against a database.
pub trait Executor: Send + Sync {
    /// Executes `token`.
    fn execute<'a>(
        &'a self,
        token: &'a CommandExecutionToken,
        mode: ExecutionMode,
    ) -> BoxFuture<'a, Result<ExecutionResult>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{SqlType, SqlValue};

    #[test]
    fn test_row_count_prefers_provider_count() {
        let rows = RowSet::new(
            ShapeSignature::new(vec![FieldShape::new("Id", SqlType::BigInt)]),
            vec![vec![SqlValue::Int(1)], vec![SqlValue::Int(2)]],
        )
        .unwrap();
        assert_eq!(ExecutionResult::with_rows(rows.clone()).row_count(), Some(2));
        assert_eq!(
            ExecutionResult::with_rows(rows).and_affected(5).row_count(),
            Some(5)
        );
        assert_eq!(ExecutionResult::default().row_count(), None);
    }
}
