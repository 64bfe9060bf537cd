//! End-to-end tests against an in-memory SQLite database.

use std::sync::Arc;

use chrono::NaiveDate;
use quarry_core::builder::{ArgumentMap, ArgumentSource};
use quarry_core::execution::ExecutionMode;
use quarry_core::materializer::Conversion;
use quarry_core::metadata::ObjectName;
use quarry_core::rules::{DateTimeKind, DateTimeRule, FixedClock, OperationTypes, SoftDeleteRule};
use quarry_core::Record as _;
use quarry_core::{CommandExecutionToken, DataSource, Error, PropertyType, SqlType, SqlValue};
use quarry_derive::Record;
use quarry_sqlite::SqliteConfig;

const SCHEMA: &str = r"
CREATE TABLE Customer (
    CustomerKey INTEGER PRIMARY KEY,
    FullName TEXT NOT NULL,
    State TEXT,
    Joined DATE,
    Active BOOLEAN NOT NULL DEFAULT 1,
    Deleted BOOLEAN NOT NULL DEFAULT 0,
    ModifiedAt DATETIME
)
";

#[derive(Debug, Default, Clone, PartialEq, Record)]
#[record(table = "Customer")]
struct Customer {
    #[column(name = "CustomerKey", key, identity)]
    id: i64,
    #[column(name = "FullName")]
    name: String,
    #[column(name = "State")]
    state: Option<String>,
    #[column(name = "Joined")]
    joined: Option<NaiveDate>,
    #[column(name = "Active")]
    active: bool,
}

fn customer(name: &str, state: &str) -> Customer {
    Customer {
        name: name.to_string(),
        state: Some(state.to_string()),
        joined: NaiveDate::from_ymd_opt(2024, 3, 1),
        active: true,
        ..Customer::default()
    }
}

async fn create_schema(source: &DataSource) {
    // DDL goes straight to the executor; the catalog only sees the table afterwards
    let token = CommandExecutionToken::new(
        "ddl",
        OperationTypes::NONE,
        ObjectName::new("Customer"),
        SCHEMA,
        Vec::new(),
    );
    source
        .chain()
        .executor()
        .execute(&token, ExecutionMode::NonQuery)
        .await
        .expect("Failed to create schema");
}

async fn seeded() -> DataSource {
    let source = quarry_sqlite::connect(&SqliteConfig::in_memory())
        .await
        .expect("Failed to open in-memory SQLite database");
    create_schema(&source).await;
    for (name, state) in [("Ada", "CA"), ("Brendan", "WA"), ("Cleo", "CA")] {
        source
            .insert("Customer", &customer(name, state))
            .as_non_query()
            .execute()
            .await
            .unwrap();
    }
    source
}

#[tokio::test]
async fn test_catalog_describes_rowid_key() {
    let source = seeded().await;
    let table = source.metadata().get_table_or_view("customer").await.unwrap();
    assert!(table.is_table());
    assert_eq!(table.name().name, "Customer");
    let key = table.column("CustomerKey").unwrap();
    assert!(key.primary_key && key.identity);
    let name = table.column("FullName").unwrap();
    assert!(!name.nullable);
    assert_eq!(table.column("Joined").unwrap().sql_type, SqlType::Date);
}

#[tokio::test]
async fn test_insert_returns_generated_key() {
    let source = seeded().await;
    let inserted: Customer = source
        .insert("Customer", &customer("Dara", "OR"))
        .to_object()
        .execute()
        .await
        .unwrap();
    assert_eq!(inserted.id, 4);
    assert_eq!(inserted.name, "Dara");
    assert_eq!(inserted.joined, NaiveDate::from_ymd_opt(2024, 3, 1));
    assert!(inserted.active);
}

#[tokio::test]
async fn test_filter_materializes_records() {
    let source = seeded().await;
    let mut found: Vec<Customer> = source
        .from_where("Customer", source.filter(ArgumentMap::new().with("State", "CA")))
        .to_collection()
        .execute()
        .await
        .unwrap();
    found.sort_by_key(|c| c.id);
    let names: Vec<&str> = found.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Ada", "Cleo"]);
    assert!(found.iter().all(|c| c.active));
}

#[tokio::test]
async fn test_update_checks_affected_rows() {
    let source = seeded().await;
    let mut ada: Customer = source
        .from_where("Customer", source.filter(ArgumentMap::new().with("FullName", "Ada")))
        .to_object()
        .execute()
        .await
        .unwrap();
    ada.state = None;
    source
        .update("Customer", &ada)
        .as_non_query()
        .execute()
        .await
        .unwrap();

    let missing = Customer {
        id: 99,
        ..ada.clone()
    };
    let err = source
        .update("Customer", &missing)
        .as_non_query()
        .execute()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RowCountMismatch { expected: 1, actual: 0 }));

    let reloaded: Option<Customer> = source
        .from_where("Customer", source.filter(ArgumentMap::new().with("CustomerKey", ada.id)))
        .to_optional_object()
        .execute()
        .await
        .unwrap();
    assert_eq!(reloaded.unwrap().state, None);
}

#[tokio::test]
async fn test_upsert_inserts_then_updates() {
    let source = seeded().await;
    let values = || {
        ArgumentMap::new()
            .with("CustomerKey", 10_i64)
            .with("FullName", "Eli")
            .with("Active", false)
    };
    source.upsert("Customer", values()).as_non_query().execute().await.unwrap();
    let renamed = values().with("FullName", "Elias");
    let stored: Customer = source
        .upsert("Customer", renamed)
        .to_object()
        .execute()
        .await
        .unwrap();
    assert_eq!(stored.id, 10);
    assert_eq!(stored.name, "Elias");
    assert!(!stored.active);
}

#[tokio::test]
async fn test_soft_delete_hides_rows() {
    let base = seeded().await;
    let source = base.with_rules([SoftDeleteRule::new("Deleted", SqlValue::Bool(true)).into()]);
    source
        .delete("Customer", ArgumentMap::new().with("CustomerKey", 2_i64))
        .as_non_query()
        .execute()
        .await
        .unwrap();

    let visible: Vec<Customer> = source.from("Customer").to_collection().execute().await.unwrap();
    assert_eq!(visible.len(), 2);
    assert!(visible.iter().all(|c| c.id != 2));

    // without the rule the flagged row is still there
    let flagged = base
        .from_where(
            "Customer",
            ArgumentSource::where_text_with("Deleted = @Deleted", ArgumentMap::new().with("Deleted", true)),
        )
        .to_row_set()
        .execute()
        .await
        .unwrap();
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged.get(0, "CustomerKey"), Some(&SqlValue::Int(2)));
}

#[tokio::test]
async fn test_stamped_columns_on_update() {
    let stamp = NaiveDate::from_ymd_opt(2025, 1, 2)
        .and_then(|d| d.and_hms_opt(8, 30, 0))
        .unwrap();
    let source = seeded()
        .await
        .with_rules([DateTimeRule::new("ModifiedAt", DateTimeKind::Utc, OperationTypes::UPDATE).into()])
        .with_clock(Arc::new(FixedClock::at_utc(stamp)));
    source
        .update("Customer", ArgumentMap::new().with("CustomerKey", 1_i64).with("State", "NV"))
        .as_non_query()
        .execute()
        .await
        .unwrap();

    let rows = source
        .from_where("Customer", source.filter(ArgumentMap::new().with("CustomerKey", 1_i64)))
        .to_row_set()
        .execute()
        .await
        .unwrap();
    let modified = rows.get(0, "ModifiedAt").unwrap();
    assert_eq!(
        Conversion::convert(modified.clone(), PropertyType::DateTime).unwrap(),
        SqlValue::Timestamp(stamp)
    );
}

#[tokio::test]
async fn test_unknown_table() {
    let source = seeded().await;
    let err = source.from("Invoice").to_row_set().execute().await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[test]
fn test_descriptor_maps_columns() {
    let descriptor = Customer::descriptor();
    assert_eq!(descriptor.table(), Some("Customer"));
    let (_, id) = descriptor.find_by_column("customerkey").unwrap();
    assert!(id.identity && id.ignore_on_insert);
}
