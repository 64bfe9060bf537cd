#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use quarry_core::dialect::Dialect;
use quarry_core::execution::{ExecutionResult, FieldShape, RecordingExecutor, RowSet, ShapeSignature};
use quarry_core::metadata::{ColumnMetadata, ObjectName, StaticCatalog, TableOrViewMetadata};
use quarry_core::{DataSource, SqlType, SqlValue};
use quarry_derive::Record;

#[derive(Debug, Default, Clone, PartialEq, Record)]
pub struct Address {
    #[column(name = "City")]
    pub city: String,
    #[column(name = "PostalCode")]
    pub postal_code: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Record)]
#[record(table = "Sales.Customer", accept_changes = "mark_loaded")]
pub struct Customer {
    #[column(name = "CustomerKey", key, identity)]
    pub id: i64,
    #[column(name = "FullName")]
    pub name: String,
    #[column(name = "CreditLimit")]
    pub credit_limit: f64,
    #[column(name = "Preferred")]
    pub preferred: bool,
    #[column(name = "Since")]
    pub since: Option<NaiveDate>,
    #[column(decompose)]
    pub address: Address,
    #[column(not_mapped)]
    pub loaded: bool,
}

impl Customer {
    fn mark_loaded(&mut self) {
        self.loaded = true;
    }
}

pub fn customer_table() -> TableOrViewMetadata {
    TableOrViewMetadata::new(
        ObjectName::qualified("Sales", "Customer"),
        true,
        vec![
            ColumnMetadata::new("CustomerKey", SqlType::BigInt)
                .identity()
                .primary_key(),
            ColumnMetadata::new("FullName", SqlType::Text).not_null(),
            ColumnMetadata::new("CreditLimit", SqlType::Double),
            ColumnMetadata::new("Preferred", SqlType::Bool),
            ColumnMetadata::new("Since", SqlType::Date),
            ColumnMetadata::new("City", SqlType::Text),
            ColumnMetadata::new("PostalCode", SqlType::Text),
            ColumnMetadata::new("CreatedBy", SqlType::BigInt),
            ColumnMetadata::new("UpdatedBy", SqlType::BigInt),
            ColumnMetadata::new("UpdatedAt", SqlType::Timestamp),
            ColumnMetadata::new("Deleted", SqlType::Bool),
            ColumnMetadata::new("TaxId", SqlType::Text),
        ],
    )
    .expect("valid customer table")
}

pub fn data_source(dialect: Arc<dyn Dialect>, executor: Arc<RecordingExecutor>) -> DataSource {
    let catalog = StaticCatalog::new().with_table(customer_table());
    DataSource::new(dialect, Arc::new(catalog), executor)
}

pub fn user(id: i64, role: &str) -> BTreeMap<String, SqlValue> {
    BTreeMap::from([
        ("UserKey".to_string(), SqlValue::Int(id)),
        ("Role".to_string(), SqlValue::Text(role.to_string())),
    ])
}

/// Rows as a SQLite-like provider returns them: integers for booleans and
/// text for dates.
pub fn loose_customer_rows() -> RowSet {
    RowSet::new(
        ShapeSignature::new(vec![
            FieldShape::new("CustomerKey", SqlType::BigInt).not_null(),
            FieldShape::new("FullName", SqlType::Text),
            FieldShape::new("CreditLimit", SqlType::BigInt),
            FieldShape::new("Preferred", SqlType::Integer),
            FieldShape::new("Since", SqlType::Text),
            FieldShape::new("City", SqlType::Text),
            FieldShape::new("PostalCode", SqlType::Text),
            FieldShape::new("Unmapped", SqlType::Text),
        ]),
        vec![
            vec![
                SqlValue::Int(1),
                SqlValue::Text("Ada".into()),
                SqlValue::Int(500),
                SqlValue::Int(1),
                SqlValue::Text("2020-01-31".into()),
                SqlValue::Text("Oslo".into()),
                SqlValue::Text("0150".into()),
                SqlValue::Text("ignored".into()),
            ],
            vec![
                SqlValue::Int(2),
                SqlValue::Text("Brendan".into()),
                SqlValue::Null,
                SqlValue::Int(0),
                SqlValue::Null,
                SqlValue::Text("Lima".into()),
                SqlValue::Null,
                SqlValue::Null,
            ],
        ],
    )
    .expect("rows match the shape")
}

pub fn rows_result(rows: RowSet) -> ExecutionResult {
    ExecutionResult::with_rows(rows)
}
