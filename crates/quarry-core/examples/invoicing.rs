//! Invoicing - Dry-Run Example
//!
//! This example builds the commands of a small invoicing workflow against
//! every bundled dialect without touching a database:
//! - Audit columns stamped from the current user and clock
//! - Soft deletes instead of physical deletes
//! - A filtered, sorted and paged listing
//!
//! A recording executor stands in for the database and the generated SQL is
//! printed instead of executed.
//!
//! Run with: cargo run --example invoicing

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use quarry_core::builder::{ArgumentMap, SelectCommand};
use quarry_core::dialect::{Dialect, GenericDialect, MySqlDialect, PostgresDialect, SqlServerDialect};
use quarry_core::execution::{ExecutionResult, RecordingExecutor};
use quarry_core::metadata::StaticCatalog;
use quarry_core::rules::{
    DateTimeKind, DateTimeRule, FixedClock, OperationTypes, SoftDeleteRule, UserDataRule,
};
use quarry_core::{DataSource, SqlValue};
use quarry_derive::Record;

// =============================================================================
// SCHEMA
// =============================================================================

/// An invoice sent to a client.
#[derive(Debug, Default, Clone, Record)]
#[record(table = "billing.invoices")]
pub struct Invoice {
    #[column(key, identity)]
    pub id: i64,
    pub client_id: i64,
    pub number: String,
    pub status: String,
    pub total: f64,
    pub issued_on: Option<NaiveDate>,
    #[column(ignore_on_update)]
    pub created_by: Option<i64>,
    pub updated_by: Option<i64>,
    pub updated_at: Option<chrono::NaiveDateTime>,
    pub deleted: bool,
}

// =============================================================================
// WORKFLOW
// =============================================================================

fn source(dialect: Arc<dyn Dialect>, executor: Arc<RecordingExecutor>) -> quarry_core::Result<DataSource> {
    let catalog = StaticCatalog::new().register_record::<Invoice>()?;
    let clock = NaiveDate::from_ymd_opt(2025, 1, 15)
        .and_then(|d| d.and_hms_opt(9, 30, 0))
        .map(FixedClock::at_utc)
        .ok_or_else(|| quarry_core::Error::InvalidArgument("bad clock".to_string()))?;
    let accountant = BTreeMap::from([("id".to_string(), SqlValue::Int(42))]);

    Ok(DataSource::new(dialect, Arc::new(catalog), executor)
        .with_rules([
            UserDataRule::new("created_by", "id", OperationTypes::INSERT).into(),
            UserDataRule::new("updated_by", "id", OperationTypes::INSERT_OR_UPDATE).into(),
            DateTimeRule::new("updated_at", DateTimeKind::Utc, OperationTypes::INSERT_OR_UPDATE)
                .into(),
            SoftDeleteRule::new("deleted", SqlValue::Bool(true)).into(),
        ])
        .with_clock(Arc::new(clock))
        .with_user(accountant))
}

async fn run(dialect: Arc<dyn Dialect>) -> quarry_core::Result<()> {
    let executor = Arc::new(
        RecordingExecutor::new()
            .respond_with(ExecutionResult::affected(1))
            .respond_with(ExecutionResult::affected(1))
            .respond_with(ExecutionResult::affected(1)),
    );
    let name = dialect.name();
    let source = source(dialect, Arc::clone(&executor))?;

    let draft = Invoice {
        client_id: 7,
        number: "INV-2025-0001".into(),
        status: "draft".into(),
        total: 1_250.0,
        issued_on: NaiveDate::from_ymd_opt(2025, 1, 15),
        ..Invoice::default()
    };
    source.insert("billing.invoices", &draft).as_non_query().execute().await?;

    source
        .update(
            "billing.invoices",
            ArgumentMap::new().with("id", 1_i64).with("status", "sent"),
        )
        .as_non_query()
        .execute()
        .await?;

    source
        .delete("billing.invoices", ArgumentMap::new().with("id", 1_i64))
        .as_non_query()
        .execute()
        .await?;

    let listing = SelectCommand::new()
        .with_criteria(source.filter(ArgumentMap::new().with("client_id", 7_i64)))
        .with_sorting(["-issued_on", "number"])
        .with_limit(20)
        .with_offset(40);
    let _: Vec<Invoice> = source
        .command("billing.invoices", listing)
        .to_collection()
        .execute()
        .await?;

    println!("== {name} ==");
    for token in executor.executed() {
        println!("{:>10}: {}", token.operation_name(), token.command_text());
        for parameter in token.parameters() {
            println!("{:>12}{} = {}", "", parameter.name, parameter.value.to_sql_inline());
        }
    }
    println!();
    Ok(())
}

#[tokio::main]
async fn main() -> quarry_core::Result<()> {
    let dialects: [Arc<dyn Dialect>; 4] = [
        Arc::new(GenericDialect::new()),
        Arc::new(PostgresDialect::new()),
        Arc::new(MySqlDialect::new()),
        Arc::new(SqlServerDialect::new()),
    ];
    for dialect in dialects {
        run(dialect).await?;
    }
    Ok(())
}
