//! Executes command tokens against a SQLite pool.

use futures::future::BoxFuture;
use quarry_core::command::CommandKind;
use quarry_core::execution::{
    ExecutionMode, ExecutionResult, Executor, FieldShape, RowSet, ShapeSignature,
};
use quarry_core::{CommandExecutionToken, Error, Result, SqlType, SqlValue};
use sqlx::sqlite::{Sqlite, SqliteArguments, SqlitePool, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tracing::debug;

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Runs tokens on a [`SqlitePool`].
///
/// Values come back in their SQLite storage class (`INTEGER`, `REAL`,
/// `TEXT`, `BLOB`); the declared column type is reported in the row shape so
/// the materializer can convert, e.g. `TEXT` stored dates into `NaiveDate`.
#[derive(Debug, Clone)]
pub struct SqliteExecutor {
    pool: SqlitePool,
}

impl SqliteExecutor {
    /// Creates an executor over `pool`.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run(&self, token: &CommandExecutionToken, mode: ExecutionMode) -> Result<ExecutionResult> {
        if token.kind() == CommandKind::StoredProcedure {
            return Err(Error::Unsupported(
                "SQLite cannot execute stored procedures".to_string(),
            ));
        }
        debug!(
            operation = token.operation_name(),
            sql = token.command_text(),
            parameters = token.parameters().len(),
            "Executing on SQLite"
        );
        let query = token
            .parameters()
            .iter()
            .fold(sqlx::query(token.command_text()), |query, parameter| {
                bind_value(query, &parameter.value)
            });
        match mode {
            ExecutionMode::NonQuery => {
                let done = query.execute(&self.pool).await.map_err(Error::provider)?;
                Ok(ExecutionResult::affected(done.rows_affected()))
            }
            ExecutionMode::Rows => {
                let rows = query.fetch_all(&self.pool).await.map_err(Error::provider)?;
                Ok(ExecutionResult::with_rows(row_set(&rows)?))
            }
        }
    }
}

impl Executor for SqliteExecutor {
    fn execute<'a>(
        &'a self,
        token: &'a CommandExecutionToken,
        mode: ExecutionMode,
    ) -> BoxFuture<'a, Result<ExecutionResult>> {
        Box::pin(self.run(token, mode))
    }
}

fn bind_value<'q>(query: SqliteQuery<'q>, value: &SqlValue) -> SqliteQuery<'q> {
    match value.clone() {
        SqlValue::Null => query.bind(Option::<i64>::None),
        SqlValue::Bool(b) => query.bind(b),
        SqlValue::Int(i) => query.bind(i),
        SqlValue::Float(f) => query.bind(f),
        SqlValue::Text(s) => query.bind(s),
        SqlValue::Blob(b) => query.bind(b),
        SqlValue::Date(d) => query.bind(d),
        SqlValue::Time(t) => query.bind(t),
        SqlValue::Timestamp(ts) => query.bind(ts),
        SqlValue::TimestampTz(ts) => query.bind(ts),
    }
}

/// Builds a row set from fetched rows. An empty result has an empty shape.
fn row_set(rows: &[SqliteRow]) -> Result<RowSet> {
    let Some(first) = rows.first() else {
        return Ok(RowSet::empty(ShapeSignature::new(Vec::new())));
    };
    let shape = ShapeSignature::new(
        first
            .columns()
            .iter()
            .map(|column| {
                FieldShape::new(column.name(), SqlType::from_declared(column.type_info().name()))
            })
            .collect(),
    );
    let mut values = Vec::with_capacity(rows.len());
    for row in rows {
        let mut record = Vec::with_capacity(shape.len());
        for index in 0..shape.len() {
            record.push(read_value(row, index)?);
        }
        values.push(record);
    }
    RowSet::new(shape, values)
}

fn read_value(row: &SqliteRow, index: usize) -> Result<SqlValue> {
    let raw = row.try_get_raw(index).map_err(Error::provider)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let storage = raw.type_info().name().to_string();
    let value = match storage.as_str() {
        "INTEGER" | "BOOLEAN" => SqlValue::Int(row.try_get_unchecked(index).map_err(Error::provider)?),
        "REAL" => SqlValue::Float(row.try_get_unchecked(index).map_err(Error::provider)?),
        "BLOB" => SqlValue::Blob(row.try_get_unchecked(index).map_err(Error::provider)?),
        _ => SqlValue::Text(row.try_get_unchecked(index).map_err(Error::provider)?),
    };
    Ok(value)
}
