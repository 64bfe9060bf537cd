//! End-to-end tests of the data source facade over a recording executor.
//!
//! These tests verify that:
//! - Audit rules stamp, restrict and soft-delete through every operation
//! - Affected-row expectations are enforced
//! - The result cache serves repeated reads and drops them on writes
//! - Both materializers produce the same records from provider rows

mod common;

use std::sync::Arc;

use chrono::NaiveDate;
use common::{data_source, loose_customer_rows, rows_result, user, Customer};
use quarry_core::builder::{ArgumentMap, ArgumentSource};
use quarry_core::dialect::PostgresDialect;
use quarry_core::execution::{ExecutionResult, FieldShape, RecordingExecutor, RowSet, ShapeSignature};
use quarry_core::rules::{
    AuditRule, CurrentUser, DateTimeKind, DateTimeRule, FixedClock, OperationTypes, RestrictColumn,
    SoftDeleteRule, UserDataRule,
};
use quarry_core::{CommandExecutionToken, DataSource, Error, Settings, SqlType, SqlValue};

fn postgres(executor: &Arc<RecordingExecutor>) -> DataSource {
    data_source(Arc::new(PostgresDialect::new()), Arc::clone(executor))
}

fn parameter<'t>(token: &'t CommandExecutionToken, name: &str) -> Option<&'t SqlValue> {
    token
        .parameters()
        .iter()
        .find(|p| p.name == name)
        .map(|p| &p.value)
}

fn audit_rules() -> Vec<AuditRule> {
    vec![
        UserDataRule::new("CreatedBy", "UserKey", OperationTypes::INSERT).into(),
        UserDataRule::new("UpdatedBy", "UserKey", OperationTypes::INSERT_OR_UPDATE).into(),
        DateTimeRule::new("UpdatedAt", DateTimeKind::Utc, OperationTypes::INSERT_OR_UPDATE).into(),
    ]
}

fn is_admin(user: Option<&dyn CurrentUser>) -> bool {
    user.and_then(|u| u.field("Role")) == Some(SqlValue::Text("admin".into()))
}

fn inserted_row(id: i64, name: &str) -> RowSet {
    RowSet::new(
        ShapeSignature::new(vec![
            FieldShape::new("CustomerKey", SqlType::BigInt).not_null(),
            FieldShape::new("FullName", SqlType::Text),
        ]),
        vec![vec![SqlValue::Int(id), SqlValue::Text(name.into())]],
    )
    .unwrap()
}

fn ada() -> Customer {
    Customer {
        id: 41,
        name: "Ada".into(),
        credit_limit: 100.0,
        since: NaiveDate::from_ymd_opt(2021, 6, 1),
        ..Customer::default()
    }
}

// =============================================================================
// Test: audit rules
// =============================================================================

#[tokio::test]
async fn test_insert_record_stamps_audit_columns() {
    let stamp = NaiveDate::from_ymd_opt(2025, 2, 3)
        .and_then(|d| d.and_hms_opt(10, 0, 0))
        .unwrap();
    let executor =
        Arc::new(RecordingExecutor::new().respond_with(rows_result(inserted_row(41, "Ada"))));
    let source = postgres(&executor)
        .with_rules(audit_rules())
        .with_clock(Arc::new(FixedClock::at_utc(stamp)))
        .with_user(user(7, "clerk"));

    let inserted: Customer = source
        .insert("Sales.Customer", &ada())
        .to_object()
        .execute()
        .await
        .unwrap();
    assert_eq!(inserted.id, 41);
    assert!(inserted.loaded);

    let token = &executor.executed()[0];
    assert!(token
        .command_text()
        .starts_with("INSERT INTO \"Sales\".\"Customer\" (\"FullName\", "));
    assert!(token.command_text().contains(" RETURNING \"CustomerKey\", \"FullName\""));
    assert_eq!(parameter(token, "CustomerKey"), None);
    assert_eq!(parameter(token, "CreatedBy"), Some(&SqlValue::Int(7)));
    assert_eq!(parameter(token, "UpdatedBy"), Some(&SqlValue::Int(7)));
    assert_eq!(parameter(token, "UpdatedAt"), Some(&SqlValue::Timestamp(stamp)));
    assert_eq!(parameter(token, "Since"), Some(&SqlValue::Date(ada().since.unwrap())));
}

#[tokio::test]
async fn test_rule_value_overrides_caller_value() {
    let executor = Arc::new(RecordingExecutor::new());
    let source = postgres(&executor)
        .with_rules(audit_rules())
        .with_user(user(7, "clerk"));
    source
        .insert(
            "Sales.Customer",
            ArgumentMap::new().with("FullName", "Ada").with("CreatedBy", 99_i64),
        )
        .as_non_query()
        .execute()
        .await
        .unwrap();
    let token = &executor.executed()[0];
    assert_eq!(parameter(token, "CreatedBy"), Some(&SqlValue::Int(7)));
}

#[tokio::test]
async fn test_rules_outside_their_mask_are_ignored() {
    let executor = Arc::new(RecordingExecutor::new().respond_with(ExecutionResult::affected(1)));
    let source = postgres(&executor)
        .with_rules(audit_rules())
        .with_user(user(7, "clerk"));
    source
        .update("Sales.Customer", ArgumentMap::new().with("CustomerKey", 41_i64).with("FullName", "Ada"))
        .as_non_query()
        .execute()
        .await
        .unwrap();
    let token = &executor.executed()[0];
    assert_eq!(parameter(token, "CreatedBy"), None);
    assert_eq!(parameter(token, "UpdatedBy"), Some(&SqlValue::Int(7)));
}

#[tokio::test]
async fn test_user_rule_requires_a_user() {
    let executor = Arc::new(RecordingExecutor::new());
    let source = postgres(&executor).with_rules(audit_rules());
    let err = source
        .insert("Sales.Customer", &ada())
        .as_non_query()
        .execute()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoCurrentUser { .. }));
    assert_eq!(executor.execution_count(), 0);
}

// =============================================================================
// Test: column restrictions
// =============================================================================

#[tokio::test]
async fn test_restricted_column_left_out_of_projection() {
    let executor = Arc::new(RecordingExecutor::new());
    let base = postgres(&executor).with_rules([RestrictColumn::global(
        "CreditLimit",
        OperationTypes::SELECT | OperationTypes::UPDATE,
        is_admin,
    )
    .into()]);

    let clerk = base.with_user(user(7, "clerk"));
    let _: Vec<Customer> = clerk.from("Sales.Customer").to_collection().execute().await.unwrap();
    let admin = base.with_user(user(1, "admin"));
    let _: Vec<Customer> = admin.from("Sales.Customer").to_collection().execute().await.unwrap();

    let executed = executor.executed();
    assert!(!executed[0].command_text().contains("CreditLimit"));
    assert!(executed[1].command_text().contains("\"CreditLimit\""));
}

#[tokio::test]
async fn test_restricted_column_write_fails() {
    let executor = Arc::new(RecordingExecutor::new());
    let source = postgres(&executor)
        .with_rules([RestrictColumn::global("CreditLimit", OperationTypes::UPDATE, is_admin).into()])
        .with_user(user(7, "clerk"));
    let err = source
        .update_set(
            "Sales.Customer",
            ArgumentMap::new().with("CreditLimit", 1_000.0_f64),
            source.filter(ArgumentMap::new().with("City", "Oslo")),
        )
        .as_non_query()
        .execute()
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::RestrictedColumn { ref column, .. } if column == "CreditLimit"
    ));
    assert_eq!(executor.execution_count(), 0);
}

// =============================================================================
// Test: soft delete
// =============================================================================

#[tokio::test]
async fn test_soft_delete_flags_and_hides_rows() {
    let executor = Arc::new(RecordingExecutor::new());
    let source = postgres(&executor)
        .with_rules([SoftDeleteRule::new("Deleted", SqlValue::Bool(true)).into()]);

    source
        .delete("Sales.Customer", ArgumentMap::new().with("CustomerKey", 41_i64))
        .as_non_query()
        .execute()
        .await
        .unwrap();
    source.from("Sales.Customer").to_row_set().execute().await.unwrap();

    let executed = executor.executed();
    assert_eq!(
        executed[0].command_text(),
        "UPDATE \"Sales\".\"Customer\" SET \"Deleted\" = $1 WHERE \"CustomerKey\" = $2"
    );
    assert_eq!(executed[0].operation(), OperationTypes::DELETE);
    assert!(executed[1]
        .command_text()
        .ends_with("WHERE (\"Deleted\" IS NULL OR \"Deleted\" <> $1)"));
    assert_eq!(executed[1].parameters()[0].value, SqlValue::Bool(true));
}

// =============================================================================
// Test: build-time errors
// =============================================================================

#[tokio::test]
async fn test_update_without_key_value() {
    let executor = Arc::new(RecordingExecutor::new());
    let source = postgres(&executor);
    let err = source
        .update("Sales.Customer", ArgumentMap::new().with("FullName", "Ada"))
        .as_non_query()
        .execute()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingPrimaryKey { .. }));
}

#[tokio::test]
async fn test_where_text_name_conflict() {
    let executor = Arc::new(RecordingExecutor::new());
    let source = postgres(&executor);
    let err = source
        .update_set(
            "Sales.Customer",
            ArgumentMap::new().with("FullName", "Ada"),
            ArgumentSource::where_text_with(
                "FullName = @FullName",
                ArgumentMap::new().with("FullName", "Ada Lovelace"),
            ),
        )
        .as_non_query()
        .execute()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(ref name) if name == "FullName"));
}

#[tokio::test]
async fn test_prepare_does_not_execute() {
    let executor = Arc::new(RecordingExecutor::new());
    let source = postgres(&executor);
    let token = source
        .from_where("Sales.Customer", source.filter(ArgumentMap::new().with("City", "Oslo")))
        .to_collection::<Customer>()
        .prepare()
        .await
        .unwrap();
    assert!(token.is_read_only());
    assert!(token.command_text().ends_with("WHERE (\"City\" = $1)"));
    assert_eq!(executor.execution_count(), 0);
}

// =============================================================================
// Test: affected rows
// =============================================================================

#[tokio::test]
async fn test_update_record_expects_one_row() {
    for (affected, ok) in [(1, true), (0, false), (2, false)] {
        let executor =
            Arc::new(RecordingExecutor::new().respond_with(ExecutionResult::affected(affected)));
        let source = postgres(&executor);
        let result = source
            .update("Sales.Customer", &ada())
            .as_non_query()
            .execute()
            .await;
        assert_eq!(result.is_ok(), ok, "affected = {affected}");
        if let Err(err) = result {
            assert!(matches!(
                err,
                Error::RowCountMismatch { expected: 1, actual } if actual == affected
            ));
        }
        let token = &executor.executed()[0];
        assert!(token.command_text().contains("WHERE \"CustomerKey\" = $"));
        assert!(!token.command_text().contains("RETURNING"));
        assert_eq!(parameter(token, "CustomerKey"), Some(&SqlValue::Int(41)));
    }
}

#[tokio::test]
async fn test_rows_affected_of_update_set() {
    let executor = Arc::new(RecordingExecutor::new().respond_with(ExecutionResult::affected(12)));
    let source = postgres(&executor);
    let affected = source
        .update_set(
            "Sales.Customer",
            ArgumentMap::new().with("Preferred", true),
            source.filter(ArgumentMap::new().with("City", "Oslo")),
        )
        .to_rows_affected()
        .execute()
        .await
        .unwrap();
    assert_eq!(affected, 12);
}

// =============================================================================
// Test: caching and metadata
// =============================================================================

#[tokio::test]
async fn test_result_cache_hit_and_invalidation() {
    let executor = Arc::new(RecordingExecutor::new());
    let source = postgres(&executor).with_result_cache();
    let read = || async {
        source
            .from_where("Sales.Customer", source.filter(ArgumentMap::new().with("City", "Oslo")))
            .to_row_set()
            .execute()
            .await
            .unwrap()
    };

    read().await;
    read().await;
    assert_eq!(executor.execution_count(), 1);

    source
        .update_set(
            "Sales.Customer",
            ArgumentMap::new().with("Preferred", true),
            source.filter(ArgumentMap::new().with("City", "Oslo")),
        )
        .as_non_query()
        .execute()
        .await
        .unwrap();
    read().await;
    assert_eq!(executor.execution_count(), 3);
}

#[tokio::test]
async fn test_metadata_is_cached_and_shared() {
    let executor = Arc::new(RecordingExecutor::new());
    let source = postgres(&executor);
    let first = source.metadata().get_table_or_view("Sales.Customer").await.unwrap();
    let again = source.metadata().get_table_or_view("sales.customer").await.unwrap();
    assert!(Arc::ptr_eq(&first, &again));

    let clerk = source.with_user(user(7, "clerk"));
    let shared = clerk.metadata().get_table_or_view("Sales.Customer").await.unwrap();
    assert!(Arc::ptr_eq(&first, &shared));
}

// =============================================================================
// Test: materialization
// =============================================================================

#[tokio::test]
async fn test_collection_agrees_across_materializers() {
    let compiled_executor =
        Arc::new(RecordingExecutor::new().respond_with(rows_result(loose_customer_rows())));
    let reflective_executor =
        Arc::new(RecordingExecutor::new().respond_with(rows_result(loose_customer_rows())));

    let compiled: Vec<Customer> = postgres(&compiled_executor)
        .from("Sales.Customer")
        .to_collection()
        .execute()
        .await
        .unwrap();
    let reflective: Vec<Customer> = postgres(&reflective_executor)
        .with_settings(Settings {
            compiled_materializer: false,
            ..Settings::default()
        })
        .from("Sales.Customer")
        .to_collection()
        .execute()
        .await
        .unwrap();

    assert_eq!(compiled.len(), 2);
    assert_eq!(compiled, reflective);
    assert_eq!(compiled[0].since, NaiveDate::from_ymd_opt(2020, 1, 31));
    assert!(compiled[0].preferred && !compiled[1].preferred);
}

#[tokio::test]
async fn test_optional_object_tolerates_no_rows() {
    let executor = Arc::new(RecordingExecutor::new());
    let source = postgres(&executor);
    let found: Option<Customer> = source
        .from_where("Sales.Customer", source.filter(ArgumentMap::new().with("CustomerKey", 404_i64)))
        .to_optional_object()
        .execute()
        .await
        .unwrap();
    assert!(found.is_none());

    let err = source
        .from_where("Sales.Customer", source.filter(ArgumentMap::new().with("CustomerKey", 404_i64)))
        .to_object::<Customer>()
        .execute()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingData));
}
