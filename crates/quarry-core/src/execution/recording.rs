//! A scripted executor for tests and dry runs.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;

use super::{ExecutionMode, ExecutionResult, Executor, RowSet, ShapeSignature};
use crate::command::CommandExecutionToken;
use crate::error::{Error, Result};

enum Scripted {
    Result(ExecutionResult),
    Failure(String),
}

/// Records every token it receives and replies from a script.
///
/// Scripted replies are consumed in order. Once the script is exhausted,
/// row reads get an empty row set and non-queries report zero affected rows.
#[derive(Default)]
pub struct RecordingExecutor {
    script: Mutex<VecDeque<Scripted>>,
    executed: Mutex<Vec<CommandExecutionToken>>,
    delay: Option<Duration>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RecordingExecutor {
    /// Creates an executor with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a reply.
    #[must_use]
    pub fn respond_with(self, result: ExecutionResult) -> Self {
        lock(&self.script).push_back(Scripted::Result(result));
        self
    }

    /// Queues a provider failure.
    #[must_use]
    pub fn fail_with(self, message: impl Into<String>) -> Self {
        lock(&self.script).push_back(Scripted::Failure(message.into()));
        self
    }

    /// Waits `delay` before every reply.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Tokens received so far, in order.
    #[must_use]
    pub fn executed(&self) -> Vec<CommandExecutionToken> {
        lock(&self.executed).clone()
    }

    /// Number of tokens received so far.
    #[must_use]
    pub fn execution_count(&self) -> usize {
        lock(&self.executed).len()
    }
}

impl std::fmt::Debug for RecordingExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingExecutor")
            .field("scripted", &lock(&self.script).len())
            .field("executed", &self.execution_count())
            .field("delay", &self.delay)
            .finish()
    }
}

impl Executor for RecordingExecutor {
    fn execute<'a>(
        &'a self,
        token: &'a CommandExecutionToken,
        mode: ExecutionMode,
    ) -> BoxFuture<'a, Result<ExecutionResult>> {
        Box::pin(async move {
            lock(&self.executed).push(token.clone());
            let reply = lock(&self.script).pop_front();
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match reply {
                Some(Scripted::Result(result)) => Ok(result),
                Some(Scripted::Failure(message)) => {
                    Err(Error::provider(std::io::Error::other(message)))
                }
                None => Ok(match mode {
                    ExecutionMode::Rows => {
                        ExecutionResult::with_rows(RowSet::empty(ShapeSignature::new(Vec::new())))
                    }
                    ExecutionMode::NonQuery => ExecutionResult::affected(0),
                }),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ObjectName;
    use crate::rules::OperationTypes;

    #[tokio::test]
    async fn test_script_then_fallback() {
        let executor = RecordingExecutor::new()
            .respond_with(ExecutionResult::affected(3))
            .fail_with("connection reset");
        let token = CommandExecutionToken::new(
            "update_set",
            OperationTypes::UPDATE,
            ObjectName::new("Invoice"),
            "UPDATE Invoice SET Paid = 1",
            Vec::new(),
        );
        let first = executor.execute(&token, ExecutionMode::NonQuery).await.unwrap();
        assert_eq!(first.rows_affected, Some(3));
        let second = executor.execute(&token, ExecutionMode::NonQuery).await;
        assert!(matches!(second, Err(Error::Provider(_))));
        let third = executor.execute(&token, ExecutionMode::Rows).await.unwrap();
        assert!(third.rows.is_some_and(|r| r.is_empty()));
        assert_eq!(executor.executed().len(), 3);
    }
}
