//! The ordered execution middleware chain.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use super::{CancelToken, ExecutionMode, ExecutionResult, Executor};
use crate::command::CommandExecutionToken;
use crate::error::{Error, Result};

/// One stage of an [`ExecutionChain`].
///
/// A stage either calls `next.run(..)` to continue toward the executor, or
/// returns a result of its own without calling it, which skips every inner
/// stage and the executor.
pub trait Stage: Send + Sync {
    /// Handles one command.
    fn handle<'a>(
        &'a self,
        token: &'a CommandExecutionToken,
        mode: ExecutionMode,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<ExecutionResult>>;
}

/// The remainder of the chain after the current stage.
pub struct Next<'a> {
    stages: &'a [Arc<dyn Stage>],
    executor: &'a dyn Executor,
}

impl<'a> Next<'a> {
    /// Runs the remaining stages, then the executor.
    #[must_use]
    pub fn run(
        self,
        token: &'a CommandExecutionToken,
        mode: ExecutionMode,
    ) -> BoxFuture<'a, Result<ExecutionResult>> {
        match self.stages.split_first() {
            Some((stage, rest)) => stage.handle(
                token,
                mode,
                Next {
                    stages: rest,
                    executor: self.executor,
                },
            ),
            None => self.executor.execute(token, mode),
        }
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining_stages", &self.stages.len())
            .finish_non_exhaustive()
    }
}

/// Stages wrapped around an executor, outermost first.
#[derive(Clone)]
pub struct ExecutionChain {
    stages: Vec<Arc<dyn Stage>>,
    executor: Arc<dyn Executor>,
}

impl ExecutionChain {
    /// Creates a chain with no stages.
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            stages: Vec::new(),
            executor,
        }
    }

    /// Appends a stage inside the existing ones.
    #[must_use]
    pub fn with_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns the executor at the bottom of the chain.
    #[must_use]
    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    /// Runs `token` through every stage.
    ///
    /// # Errors
    ///
    /// Propagates stage and executor failures.
    pub async fn execute(
        &self,
        token: &CommandExecutionToken,
        mode: ExecutionMode,
    ) -> Result<ExecutionResult> {
        let next = Next {
            stages: &self.stages,
            executor: self.executor.as_ref(),
        };
        next.run(token, mode).await
    }

    /// Runs `token`, abandoning it as soon as `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] when cancellation was requested before or
    /// during the call.
    pub async fn execute_cancellable(
        &self,
        token: &CommandExecutionToken,
        mode: ExecutionMode,
        cancel: &CancelToken,
    ) -> Result<ExecutionResult> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(operation = token.operation_name(), "Command cancelled");
                Err(Error::Cancelled)
            }
            result = self.execute(token, mode) => result,
        }
    }
}

impl fmt::Debug for ExecutionChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionChain")
            .field("stages", &self.stages.len())
            .finish_non_exhaustive()
    }
}

/// Logs every command with its outcome and duration.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingStage;

impl Stage for TracingStage {
    fn handle<'a>(
        &'a self,
        token: &'a CommandExecutionToken,
        mode: ExecutionMode,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<ExecutionResult>> {
        Box::pin(async move {
            debug!(
                operation = token.operation_name(),
                object = %token.object_name(),
                sql = token.command_text(),
                ?mode,
                "Executing command"
            );
            let started = Instant::now();
            let result = next.run(token, mode).await;
            let elapsed_ms = started.elapsed().as_millis();
            match &result {
                Ok(outcome) => debug!(
                    operation = token.operation_name(),
                    rows = outcome.rows.as_ref().map(super::RowSet::len),
                    rows_affected = outcome.rows_affected,
                    elapsed_ms,
                    "Command finished"
                ),
                Err(err) if err.is_cancelled() => {
                    debug!(operation = token.operation_name(), elapsed_ms, "Command cancelled");
                }
                Err(err) => warn!(
                    operation = token.operation_name(),
                    error = %err,
                    elapsed_ms,
                    "Command failed"
                ),
            }
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::execution::RecordingExecutor;
    use crate::metadata::ObjectName;
    use crate::rules::OperationTypes;

    fn token() -> CommandExecutionToken {
        CommandExecutionToken::new(
            "select",
            OperationTypes::SELECT,
            ObjectName::new("Product"),
            "SELECT 1",
            Vec::new(),
        )
    }

    struct ShortCircuit;

    impl Stage for ShortCircuit {
        fn handle<'a>(
            &'a self,
            _token: &'a CommandExecutionToken,
            _mode: ExecutionMode,
            _next: Next<'a>,
        ) -> BoxFuture<'a, Result<ExecutionResult>> {
            Box::pin(async { Ok(ExecutionResult::affected(42)) })
        }
    }

    struct Counting(AtomicUsize);

    impl Stage for Counting {
        fn handle<'a>(
            &'a self,
            token: &'a CommandExecutionToken,
            mode: ExecutionMode,
            next: Next<'a>,
        ) -> BoxFuture<'a, Result<ExecutionResult>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            next.run(token, mode)
        }
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let executor = Arc::new(RecordingExecutor::new());
        let counting = Arc::new(Counting(AtomicUsize::new(0)));
        let chain = ExecutionChain::new(executor.clone())
            .with_stage(Arc::new(TracingStage))
            .with_stage(counting.clone());
        chain.execute(&token(), ExecutionMode::Rows).await.unwrap();
        assert_eq!(counting.0.load(Ordering::SeqCst), 1);
        assert_eq!(executor.execution_count(), 1);
    }

    #[tokio::test]
    async fn test_short_circuit_skips_inner_stages() {
        let executor = Arc::new(RecordingExecutor::new());
        let counting = Arc::new(Counting(AtomicUsize::new(0)));
        let chain = ExecutionChain::new(executor.clone())
            .with_stage(Arc::new(ShortCircuit))
            .with_stage(counting.clone());
        let result = chain.execute(&token(), ExecutionMode::Rows).await.unwrap();
        assert_eq!(result.rows_affected, Some(42));
        assert_eq!(counting.0.load(Ordering::SeqCst), 0);
        assert_eq!(executor.execution_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_call() {
        let executor = Arc::new(RecordingExecutor::new());
        let chain = ExecutionChain::new(executor.clone());
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = chain
            .execute_cancellable(&token(), ExecutionMode::Rows, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(executor.execution_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_during_call() {
        let executor = Arc::new(RecordingExecutor::new().with_delay(Duration::from_secs(30)));
        let chain = ExecutionChain::new(executor);
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let err = chain
            .execute_cancellable(&token(), ExecutionMode::Rows, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
