//! Integration tests for record materialization.
//!
//! Both strategies are run over the same row sets and must agree.

mod common;

use chrono::NaiveDate;
use common::{loose_customer_rows, Address, Customer};
use quarry_core::execution::{FieldShape, RowSet, ShapeSignature};
use quarry_core::materializer::{
    collect, single, CompiledMaterializer, ReflectiveMaterializer, RowOptions,
};
use quarry_core::{Error, SqlType, SqlValue};

fn expected_customers() -> Vec<Customer> {
    vec![
        Customer {
            id: 1,
            name: "Ada".into(),
            credit_limit: 500.0,
            preferred: true,
            since: NaiveDate::from_ymd_opt(2020, 1, 31),
            address: Address {
                city: "Oslo".into(),
                postal_code: Some("0150".into()),
            },
            loaded: true,
        },
        Customer {
            id: 2,
            name: "Brendan".into(),
            credit_limit: 0.0,
            preferred: false,
            since: None,
            address: Address {
                city: "Lima".into(),
                postal_code: None,
            },
            loaded: true,
        },
    ]
}

fn one_customer(count: usize) -> RowSet {
    RowSet::new(
        ShapeSignature::new(vec![
            FieldShape::new("CustomerKey", SqlType::BigInt),
            FieldShape::new("FullName", SqlType::Text),
        ]),
        (0..count)
            .map(|i| vec![SqlValue::Int(i as i64 + 1), SqlValue::Text(format!("c{i}"))])
            .collect(),
    )
    .unwrap()
}

// =============================================================================
// Test: strategies agree
// =============================================================================

#[test]
fn test_reflective_converts_loose_types() {
    let customers: Vec<Customer> = collect(&ReflectiveMaterializer, &loose_customer_rows()).unwrap();
    assert_eq!(customers, expected_customers());
}

#[test]
fn test_compiled_matches_reflective() {
    let rows = loose_customer_rows();
    let compiled = CompiledMaterializer::new();
    let from_compiled: Vec<Customer> = collect(&compiled, &rows).unwrap();
    let from_reflective: Vec<Customer> = collect(&ReflectiveMaterializer, &rows).unwrap();
    assert_eq!(from_compiled, from_reflective);
}

#[test]
fn test_compiled_plan_is_reused_per_shape() {
    let compiled = CompiledMaterializer::new();
    let rows = loose_customer_rows();
    let _: Vec<Customer> = collect(&compiled, &rows).unwrap();
    let _: Vec<Customer> = collect(&compiled, &rows).unwrap();
    assert_eq!(compiled.len(), 1);

    let _: Vec<Customer> = collect(&compiled, &one_customer(1)).unwrap();
    assert_eq!(compiled.len(), 2);
}

#[test]
fn test_missing_columns_keep_defaults() {
    let customers: Vec<Customer> = collect(&CompiledMaterializer::new(), &one_customer(2)).unwrap();
    assert_eq!(customers.len(), 2);
    assert_eq!(customers[1].name, "c1");
    assert_eq!(customers[1].address, Address::default());
    assert!(customers.iter().all(|c| c.loaded));
}

#[test]
fn test_unconvertible_column_fails_both_ways() {
    let rows = RowSet::new(
        ShapeSignature::new(vec![FieldShape::new("Since", SqlType::Blob)]),
        vec![vec![SqlValue::Blob(vec![1, 2])]],
    )
    .unwrap();

    let reflective = collect::<Customer, _>(&ReflectiveMaterializer, &rows).unwrap_err();
    assert!(matches!(reflective, Error::Mapping(_)));

    let compiled = collect::<Customer, _>(&CompiledMaterializer::new(), &rows).unwrap_err();
    assert!(matches!(compiled, Error::Compile { .. }));
}

#[test]
fn test_unparseable_date_text() {
    let rows = RowSet::new(
        ShapeSignature::new(vec![FieldShape::new("Since", SqlType::Text)]),
        vec![vec![SqlValue::Text("yesterday".into())]],
    )
    .unwrap();
    let err = collect::<Customer, _>(&CompiledMaterializer::new(), &rows).unwrap_err();
    assert!(matches!(err, Error::Mapping(_)));
}

// =============================================================================
// Test: single-row tolerances
// =============================================================================

#[test]
fn test_single_row() {
    let found: Option<Customer> =
        single(&ReflectiveMaterializer, &one_customer(1), RowOptions::default()).unwrap();
    assert_eq!(found.map(|c| c.id), Some(1));
}

#[test]
fn test_single_row_empty() {
    let err = single::<Customer, _>(&ReflectiveMaterializer, &one_customer(0), RowOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::MissingData));

    let options = RowOptions {
        allow_empty_results: true,
        ..RowOptions::default()
    };
    let found: Option<Customer> = single(&ReflectiveMaterializer, &one_customer(0), options).unwrap();
    assert!(found.is_none());
}

#[test]
fn test_single_row_extra_rows() {
    let compiled = CompiledMaterializer::new();
    let err =
        single::<Customer, _>(&compiled, &one_customer(3), RowOptions::default()).unwrap_err();
    assert!(matches!(
        err,
        Error::UnexpectedData {
            expected: 1,
            actual: 3
        }
    ));

    let options = RowOptions {
        discard_extra_rows: true,
        ..RowOptions::default()
    };
    let first: Option<Customer> = single(&compiled, &one_customer(3), options).unwrap();
    assert_eq!(first.map(|c| c.name), Some("c0".to_string()));
}
