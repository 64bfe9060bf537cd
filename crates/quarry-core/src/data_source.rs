//! The data source facade.
//!
//! A [`DataSource`] ties a dialect, a metadata cache, an execution chain,
//! the rule context and [`Settings`] together. Each operation method returns
//! an [`Operation`]; choosing a result shape (`to_collection`, `to_object`,
//! `as_non_query`, ...) yields a [`Pending`] that runs with `execute`,
//! `execute_with` or `execute_blocking`.
//!
//! ```
//! use std::sync::Arc;
//! use quarry_core::builder::ArgumentMap;
//! use quarry_core::dialect::PostgresDialect;
//! use quarry_core::execution::{ExecutionResult, RecordingExecutor};
//! use quarry_core::metadata::{ColumnMetadata, ObjectName, StaticCatalog, TableOrViewMetadata};
//! use quarry_core::value::SqlType;
//! use quarry_core::DataSource;
//!
//! let catalog = StaticCatalog::new().with_table(
//!     TableOrViewMetadata::new(
//!         ObjectName::new("Invoice"),
//!         true,
//!         vec![
//!             ColumnMetadata::new("InvoiceKey", SqlType::BigInt).primary_key(),
//!             ColumnMetadata::new("Paid", SqlType::Bool),
//!         ],
//!     )
//!     .unwrap(),
//! );
//! let executor = Arc::new(RecordingExecutor::new().respond_with(ExecutionResult::affected(1)));
//! let source = DataSource::new(Arc::new(PostgresDialect::new()), Arc::new(catalog), executor.clone());
//!
//! let affected = source
//!     .update("Invoice", ArgumentMap::new().with("InvoiceKey", 7_i64).with("Paid", true))
//!     .to_rows_affected()
//!     .execute_blocking()
//!     .unwrap();
//! assert_eq!(affected, 1);
//! assert_eq!(
//!     executor.executed()[0].command_text(),
//!     "UPDATE \"Invoice\" SET \"Paid\" = $1 WHERE \"InvoiceKey\" = $2"
//! );
//! ```

use std::sync::Arc;

use tracing::{debug, warn};

use crate::builder::{
    ArgumentSource, CommandContext, DeleteCommand, DesiredColumns, InsertCommand, ProcedureCall,
    SelectCommand, TableFunctionCall, UpdateCommand, UpsertCommand,
};
use crate::command::CommandExecutionToken;
use crate::config::Settings;
use crate::descriptor::{Record, TypeDescriptor};
use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::execution::{
    CachingStage, CancelToken, ExecutionChain, ExecutionMode, ExecutionResult, Executor, RowSet,
    Stage,
};
use crate::materializer::{self, CompiledMaterializer, ReflectiveMaterializer, RowOptions};
use crate::metadata::{Catalog, MetadataCache};
use crate::rules::{AuditRule, Clock, CurrentUser, RuleContext};

/// Entry point for building and executing commands against one database.
///
/// Cloning is cheap. Clones made through [`with_user`](Self::with_user),
/// [`with_rules`](Self::with_rules) and [`with_clock`](Self::with_clock)
/// share the metadata and projection caches with their origin.
#[derive(Clone)]
pub struct DataSource {
    dialect: Arc<dyn Dialect>,
    metadata: Arc<MetadataCache>,
    chain: ExecutionChain,
    rules: RuleContext,
    settings: Settings,
    projections: Arc<CompiledMaterializer>,
}

impl DataSource {
    /// Creates a data source with default settings and no rules.
    pub fn new(
        dialect: Arc<dyn Dialect>,
        catalog: Arc<dyn Catalog>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            dialect,
            metadata: Arc::new(MetadataCache::new(catalog)),
            chain: ExecutionChain::new(executor),
            rules: RuleContext::default(),
            settings: Settings::default(),
            projections: Arc::new(CompiledMaterializer::new()),
        }
    }

    /// Replaces the settings.
    #[must_use]
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Appends an execution stage inside the existing ones.
    #[must_use]
    pub fn with_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.chain = self.chain.with_stage(stage);
        self
    }

    /// Appends a read-result cache expiring after the configured TTL.
    #[must_use]
    pub fn with_result_cache(self) -> Self {
        let cache = self
            .settings
            .cache_ttl()
            .map_or_else(CachingStage::new, CachingStage::with_ttl);
        self.with_stage(Arc::new(cache))
    }

    /// Returns a copy acting for `user`.
    #[must_use]
    pub fn with_user(&self, user: impl CurrentUser) -> Self {
        Self {
            rules: self.rules.with_user(Arc::new(user)),
            ..self.clone()
        }
    }

    /// Returns a copy with additional audit rules.
    #[must_use]
    pub fn with_rules(&self, rules: impl IntoIterator<Item = AuditRule>) -> Self {
        Self {
            rules: self.rules.with_rules(rules),
            ..self.clone()
        }
    }

    /// Returns a copy reading time from `clock`.
    #[must_use]
    pub fn with_clock(&self, clock: Arc<dyn Clock>) -> Self {
        Self {
            rules: self.rules.with_clock(clock),
            ..self.clone()
        }
    }

    /// The dialect.
    #[must_use]
    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// The metadata cache.
    #[must_use]
    pub fn metadata(&self) -> &MetadataCache {
        &self.metadata
    }

    /// The settings.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The rule context.
    #[must_use]
    pub const fn rules(&self) -> &RuleContext {
        &self.rules
    }

    /// The execution chain.
    #[must_use]
    pub const fn chain(&self) -> &ExecutionChain {
        &self.chain
    }

    /// Wraps filter values with the configured null handling.
    pub fn filter<'a>(&self, values: impl Into<ArgumentSource<'a>>) -> ArgumentSource<'a> {
        ArgumentSource::filter(values, self.settings.filter_options())
    }

    /// Inserts a row.
    pub fn insert<'a>(
        &'a self,
        table: &str,
        arguments: impl Into<ArgumentSource<'a>>,
    ) -> Operation<'a> {
        self.command(table, InsertCommand::new(arguments))
    }

    /// Updates the row located by the key values in `values`.
    pub fn update<'a>(&'a self, table: &str, values: impl Into<ArgumentSource<'a>>) -> Operation<'a> {
        self.command(table, UpdateCommand::by_key(values))
    }

    /// Writes `values` into every row matched by `criteria`.
    pub fn update_set<'a>(
        &'a self,
        table: &str,
        values: impl Into<ArgumentSource<'a>>,
        criteria: ArgumentSource<'a>,
    ) -> Operation<'a> {
        self.command(table, UpdateCommand::by_criteria(values, criteria))
    }

    /// Deletes the row located by the key values in `arguments`.
    pub fn delete<'a>(
        &'a self,
        table: &str,
        arguments: impl Into<ArgumentSource<'a>>,
    ) -> Operation<'a> {
        self.command(table, DeleteCommand::by_key(arguments))
    }

    /// Deletes every row matched by `criteria`.
    pub fn delete_set<'a>(&'a self, table: &str, criteria: ArgumentSource<'a>) -> Operation<'a> {
        self.command(table, DeleteCommand::by_criteria(criteria))
    }

    /// Inserts a row or updates the row with the same key.
    pub fn upsert<'a>(
        &'a self,
        table: &str,
        arguments: impl Into<ArgumentSource<'a>>,
    ) -> Operation<'a> {
        self.command(table, UpsertCommand::new(arguments))
    }

    /// Selects every row of a table or view.
    pub fn from<'a>(&'a self, table_or_view: &str) -> Operation<'a> {
        self.command(table_or_view, SelectCommand::new())
    }

    /// Selects the rows of a table or view matched by `criteria`.
    pub fn from_where<'a>(&'a self, table_or_view: &str, criteria: ArgumentSource<'a>) -> Operation<'a> {
        self.command(table_or_view, SelectCommand::new().with_criteria(criteria))
    }

    /// Calls a stored procedure.
    pub fn call_procedure<'a>(
        &'a self,
        procedure: &str,
        arguments: impl Into<ArgumentSource<'a>>,
    ) -> Operation<'a> {
        self.command(procedure, ProcedureCall::new(arguments))
    }

    /// Selects from a table-valued function.
    pub fn table_function<'a>(
        &'a self,
        function: &str,
        arguments: impl Into<ArgumentSource<'a>>,
    ) -> Operation<'a> {
        self.command(function, TableFunctionCall::new(arguments))
    }

    /// Runs a fully configured command against `object`.
    pub fn command<'a>(&'a self, object: &str, command: impl Into<Command<'a>>) -> Operation<'a> {
        Operation {
            source: self,
            object: object.to_string(),
            command: command.into(),
        }
    }

    fn collect<T: Record>(&self, rows: &RowSet) -> Result<Vec<T>> {
        if self.settings.compiled_materializer {
            materializer::collect(self.projections.as_ref(), rows)
        } else {
            materializer::collect(&ReflectiveMaterializer, rows)
        }
    }

    fn single<T: Record>(&self, rows: &RowSet, options: RowOptions) -> Result<Option<T>> {
        if self.settings.compiled_materializer {
            materializer::single(self.projections.as_ref(), rows, options)
        } else {
            materializer::single(&ReflectiveMaterializer, rows, options)
        }
    }
}

impl std::fmt::Debug for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSource")
            .field("dialect", &self.dialect.name())
            .field("chain", &self.chain)
            .field("rules", &self.rules)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Any command a data source can run.
#[derive(Debug)]
pub enum Command<'a> {
    /// Insert.
    Insert(InsertCommand<'a>),
    /// Update by key or criteria.
    Update(UpdateCommand<'a>),
    /// Delete by key or criteria.
    Delete(DeleteCommand<'a>),
    /// Insert or update.
    Upsert(UpsertCommand<'a>),
    /// Select or aggregate.
    Select(SelectCommand<'a>),
    /// Stored procedure call.
    Procedure(ProcedureCall<'a>),
    /// Table-valued function.
    TableFunction(TableFunctionCall<'a>),
}

macro_rules! impl_from_command {
    ($($variant:ident => $ty:ident),+ $(,)?) => {
        $(
            impl<'a> From<$ty<'a>> for Command<'a> {
                fn from(command: $ty<'a>) -> Self {
                    Self::$variant(command)
                }
            }
        )+
    };
}

impl_from_command!(
    Insert => InsertCommand,
    Update => UpdateCommand,
    Delete => DeleteCommand,
    Upsert => UpsertCommand,
    Select => SelectCommand,
    Procedure => ProcedureCall,
    TableFunction => TableFunctionCall,
);

const fn inferable(desired: &DesiredColumns) -> bool {
    matches!(desired, DesiredColumns::NoColumns | DesiredColumns::All)
}

impl Command<'_> {
    /// Projects the columns of the record type unless the caller chose
    /// columns.
    fn project_record(self, descriptor: &'static TypeDescriptor) -> Self {
        let columns = DesiredColumns::Type(descriptor);
        match self {
            Self::Insert(c) if inferable(c.desired()) => Self::Insert(c.with_columns(columns)),
            Self::Update(c) if inferable(c.desired()) => Self::Update(c.with_columns(columns)),
            Self::Delete(c) if inferable(c.desired()) => Self::Delete(c.with_columns(columns)),
            Self::Upsert(c) if inferable(c.desired()) => Self::Upsert(c.with_columns(columns)),
            Self::Select(c) if inferable(c.desired()) => Self::Select(c.with_columns(columns)),
            Self::TableFunction(c) if inferable(c.desired()) => {
                Self::TableFunction(c.with_columns(columns))
            }
            other => other,
        }
    }
}

/// A command bound to a data source, waiting for a result shape.
#[derive(Debug)]
pub struct Operation<'a> {
    source: &'a DataSource,
    object: String,
    command: Command<'a>,
}

impl<'a> Operation<'a> {
    /// Resolves metadata and builds the command without executing it.
    ///
    /// # Errors
    ///
    /// Fails on unknown objects and on every build-time error of the command.
    pub async fn prepare(&self) -> Result<CommandExecutionToken> {
        let source = self.source;
        let context = CommandContext::new(source.dialect.as_ref(), &source.rules)
            .strict(source.settings.strict_mode);
        let metadata = &source.metadata;
        let object = self.object.as_str();
        match &self.command {
            Command::Insert(c) => c.build(&context, &*metadata.get_table_or_view(object).await?),
            Command::Update(c) => c.build(&context, &*metadata.get_table_or_view(object).await?),
            Command::Delete(c) => c.build(&context, &*metadata.get_table_or_view(object).await?),
            Command::Upsert(c) => c.build(&context, &*metadata.get_table_or_view(object).await?),
            Command::Select(c) => c.build(&context, &*metadata.get_table_or_view(object).await?),
            Command::Procedure(c) => {
                c.build(&context, &*metadata.get_stored_procedure(object).await?)
            }
            Command::TableFunction(c) => {
                c.build(&context, &*metadata.get_table_function(object).await?)
            }
        }
    }

    /// Materializes every returned row as `T`.
    pub fn to_collection<T: Record>(self) -> Pending<'a, Vec<T>> {
        self.records::<T>()
            .pending(ExecutionMode::Rows, RowOptions::default(), finish_collection::<T>)
    }

    /// Materializes the only returned row as `T`.
    pub fn to_object<T: Record>(self) -> Pending<'a, T> {
        self.to_object_with(RowOptions::default())
    }

    /// Materializes one returned row as `T` with explicit row tolerances.
    ///
    /// An empty result is still an error; use
    /// [`to_optional_object`](Self::to_optional_object) to accept it.
    pub fn to_object_with<T: Record>(self, options: RowOptions) -> Pending<'a, T> {
        self.records::<T>()
            .pending(ExecutionMode::Rows, options, finish_object::<T>)
    }

    /// Materializes at most one returned row as `T`.
    pub fn to_optional_object<T: Record>(self) -> Pending<'a, Option<T>> {
        let options = RowOptions {
            allow_empty_results: true,
            discard_extra_rows: false,
        };
        self.records::<T>()
            .pending(ExecutionMode::Rows, options, finish_optional::<T>)
    }

    /// Returns the raw rows.
    pub fn to_row_set(self) -> Pending<'a, RowSet> {
        self.pending(ExecutionMode::Rows, RowOptions::default(), finish_row_set)
    }

    /// Returns the affected-row count.
    pub fn to_rows_affected(self) -> Pending<'a, u64> {
        self.pending(ExecutionMode::NonQuery, RowOptions::default(), finish_rows_affected)
    }

    /// Executes for side effects only.
    pub fn as_non_query(self) -> Pending<'a, ()> {
        self.pending(ExecutionMode::NonQuery, RowOptions::default(), finish_non_query)
    }

    fn records<T: Record>(self) -> Self {
        Self {
            command: self.command.project_record(T::descriptor()),
            ..self
        }
    }

    fn pending<R>(self, mode: ExecutionMode, options: RowOptions, finish: Finish<R>) -> Pending<'a, R> {
        Pending {
            operation: self,
            mode,
            options,
            finish,
        }
    }
}

type Finish<R> = fn(&DataSource, ExecutionResult, RowOptions) -> Result<R>;

/// An operation with a chosen result shape, ready to execute.
pub struct Pending<'a, R> {
    operation: Operation<'a>,
    mode: ExecutionMode,
    options: RowOptions,
    finish: Finish<R>,
}

impl<R> Pending<'_, R> {
    /// Resolves metadata and builds the command without executing it.
    ///
    /// # Errors
    ///
    /// See [`Operation::prepare`].
    pub async fn prepare(&self) -> Result<CommandExecutionToken> {
        self.operation.prepare().await
    }

    /// Executes asynchronously, honoring the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns build, provider, row-count and materialization errors, and
    /// [`Error::Timeout`] when the timeout elapses.
    pub async fn execute(self) -> Result<R> {
        self.run(None, true).await
    }

    /// Executes asynchronously, abandoning the call when `cancel` fires.
    ///
    /// # Errors
    ///
    /// As [`execute`](Self::execute), plus [`Error::Cancelled`].
    pub async fn execute_with(self, cancel: &CancelToken) -> Result<R> {
        self.run(Some(cancel), true).await
    }

    /// Executes on the current thread, blocking until the result is ready.
    ///
    /// The command timeout is not applied on this path.
    ///
    /// # Errors
    ///
    /// As [`execute`](Self::execute), without the timeout.
    pub fn execute_blocking(self) -> Result<R> {
        futures::executor::block_on(self.run(None, false))
    }

    async fn run(self, cancel: Option<&CancelToken>, timed: bool) -> Result<R> {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(Error::Cancelled);
        }
        let source = self.operation.source;
        let mode = self.mode;
        let token = self.operation.prepare().await?;
        let chain = &source.chain;
        let execution = async {
            match cancel {
                Some(cancel) => chain.execute_cancellable(&token, mode, cancel).await,
                None => chain.execute(&token, mode).await,
            }
        };
        let result = match source.settings.command_timeout().filter(|_| timed) {
            Some(limit) => tokio::time::timeout(limit, execution).await.map_err(|_| {
                warn!(operation = token.operation_name(), object = %token.object_name(), "Command timed out");
                Error::Timeout {
                    seconds: limit.as_secs(),
                }
            })??,
            None => execution.await?,
        };
        check_row_count(&token, &result)?;
        (self.finish)(source, result, self.options)
    }
}

impl<R> std::fmt::Debug for Pending<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pending")
            .field("operation", &self.operation)
            .field("mode", &self.mode)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

fn check_row_count(token: &CommandExecutionToken, result: &ExecutionResult) -> Result<()> {
    let Some(expected) = token.expected_row_count() else {
        return Ok(());
    };
    let Some(actual) = result.row_count() else {
        debug!(
            operation = token.operation_name(),
            "Provider reported no row count; expectation not checked"
        );
        return Ok(());
    };
    if actual == expected {
        return Ok(());
    }
    warn!(
        operation = token.operation_name(),
        object = %token.object_name(),
        expected,
        actual,
        "Affected row count mismatch"
    );
    Err(Error::RowCountMismatch { expected, actual })
}

fn rows_of(result: ExecutionResult) -> Result<RowSet> {
    result
        .rows
        .ok_or_else(|| Error::Mapping("the command returned no result set".to_string()))
}

fn finish_collection<T: Record>(
    source: &DataSource,
    result: ExecutionResult,
    _: RowOptions,
) -> Result<Vec<T>> {
    source.collect(&rows_of(result)?)
}

fn finish_object<T: Record>(
    source: &DataSource,
    result: ExecutionResult,
    options: RowOptions,
) -> Result<T> {
    let options = RowOptions {
        allow_empty_results: false,
        ..options
    };
    source
        .single(&rows_of(result)?, options)?
        .ok_or(Error::MissingData)
}

fn finish_optional<T: Record>(
    source: &DataSource,
    result: ExecutionResult,
    options: RowOptions,
) -> Result<Option<T>> {
    source.single(&rows_of(result)?, options)
}

fn finish_row_set(_: &DataSource, result: ExecutionResult, _: RowOptions) -> Result<RowSet> {
    rows_of(result)
}

fn finish_rows_affected(_: &DataSource, result: ExecutionResult, _: RowOptions) -> Result<u64> {
    Ok(result.row_count().unwrap_or(0))
}

fn finish_non_query(_: &DataSource, _: ExecutionResult, _: RowOptions) -> Result<()> {
    Ok(())
}
