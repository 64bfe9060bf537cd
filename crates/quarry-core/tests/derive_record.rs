//! Tests for the `#[derive(Record)]` macro output.
//!
//! These tests verify that the derive macro generates:
//! - A flattened descriptor, including decomposed sub-records
//! - Index-based property reads and writes that agree with the descriptor
//! - The change-tracking hook

use chrono::NaiveDate;
use quarry_core::Record as _;
use quarry_core::{PropertyType, SqlValue};
use quarry_derive::Record;

// =============================================================================
// Test records
// =============================================================================

#[derive(Debug, Default, Clone, PartialEq, Record)]
struct Address {
    #[column(name = "City")]
    city: String,
    #[column(name = "PostalCode")]
    postal_code: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Record)]
#[record(table = "Sales.Customer", accept_changes = "mark_loaded")]
struct Customer {
    #[column(name = "CustomerKey", key, identity)]
    id: i64,
    #[column(name = "FullName")]
    name: String,
    #[column(name = "CreditLimit")]
    credit_limit: f64,
    #[column(name = "Preferred")]
    preferred: bool,
    #[column(name = "Since")]
    since: Option<NaiveDate>,
    #[column(decompose)]
    address: Address,
    #[column(name = "Rating", nullable)]
    rating: i32,
    #[column(not_mapped)]
    loaded: bool,
}

impl Customer {
    fn mark_loaded(&mut self) {
        self.loaded = true;
    }
}

#[derive(Debug, Default, Record)]
struct AuditStamp {
    #[column(ignore_on_update)]
    created_by: String,
    #[column(ignore_on_insert)]
    modified_by: Option<String>,
    payload: SqlValue,
}

// =============================================================================
// Test: descriptor layout
// =============================================================================

#[test]
fn test_descriptor_flattens_decomposed_fields() {
    let descriptor = Customer::descriptor();
    assert_eq!(descriptor.type_name(), "Customer");
    assert_eq!(descriptor.table(), Some("Sales.Customer"));
    let paths: Vec<&str> = descriptor.properties().iter().map(|p| p.path.as_str()).collect();
    assert_eq!(
        paths,
        [
            "id",
            "name",
            "credit_limit",
            "preferred",
            "since",
            "address.city",
            "address.postal_code",
            "rating",
        ]
    );
    assert_eq!(descriptor.not_mapped(), ["loaded".to_string()]);
}

#[test]
fn test_descriptor_properties() {
    let descriptor = Customer::descriptor();

    let (_, id) = descriptor.find_by_column("customerkey").unwrap();
    assert!(id.key && id.identity);
    assert!(id.ignore_on_insert && id.ignore_on_update);
    assert_eq!(id.property_type, PropertyType::I64);
    assert!(!id.nullable);

    let (index, city) = descriptor.find_by_path("Address.City").unwrap();
    assert_eq!(index, 5);
    assert!(city.decomposed);
    assert_eq!(city.column, "City");

    let (_, since) = descriptor.find_by_column("Since").unwrap();
    assert_eq!(since.property_type, PropertyType::Date);
    assert!(since.nullable);

    let (_, rating) = descriptor.find_by_column("Rating").unwrap();
    assert!(rating.nullable);
    assert_eq!(rating.property_type, PropertyType::I32);
}

#[test]
fn test_default_column_names_and_write_flags() {
    let descriptor = AuditStamp::descriptor();
    assert_eq!(descriptor.table(), None);
    let (_, created) = descriptor.find_by_column("created_by").unwrap();
    assert!(created.ignore_on_update && !created.ignore_on_insert);
    let (_, modified) = descriptor.find_by_column("modified_by").unwrap();
    assert!(modified.ignore_on_insert && !modified.ignore_on_update);
    let (_, payload) = descriptor.find_by_column("payload").unwrap();
    assert_eq!(payload.property_type, PropertyType::Any);
}

#[test]
fn test_descriptor_is_cached() {
    assert!(std::ptr::eq(Customer::descriptor(), Customer::descriptor()));
}

// =============================================================================
// Test: property access
// =============================================================================

#[test]
fn test_read_property_by_index() {
    let customer = Customer {
        id: 7,
        name: "Ada".into(),
        credit_limit: 250.0,
        preferred: true,
        since: NaiveDate::from_ymd_opt(2020, 1, 31),
        address: Address {
            city: "Oslo".into(),
            postal_code: None,
        },
        rating: 4,
        loaded: false,
    };
    assert_eq!(customer.read_property(0), Some(SqlValue::Int(7)));
    assert_eq!(customer.read_property(1), Some(SqlValue::Text("Ada".into())));
    assert_eq!(customer.read_property(3), Some(SqlValue::Bool(true)));
    assert_eq!(
        customer.read_property(4),
        NaiveDate::from_ymd_opt(2020, 1, 31).map(SqlValue::Date)
    );
    assert_eq!(customer.read_property(5), Some(SqlValue::Text("Oslo".into())));
    assert_eq!(customer.read_property(6), Some(SqlValue::Null));
    assert_eq!(customer.read_property(7), Some(SqlValue::Int(4)));
    assert_eq!(customer.read_property(8), None);
}

#[test]
fn test_write_property_by_index() {
    let mut customer = Customer::default();
    customer.write_property(1, SqlValue::Text("Brendan".into())).unwrap();
    customer.write_property(6, SqlValue::Text("0150".into())).unwrap();
    customer.write_property(7, SqlValue::Int(3)).unwrap();
    assert_eq!(customer.name, "Brendan");
    assert_eq!(customer.address.postal_code.as_deref(), Some("0150"));
    assert_eq!(customer.rating, 3);

    // declared nullable without Option: NULL resets to the default
    customer.write_property(7, SqlValue::Null).unwrap();
    assert_eq!(customer.rating, 0);
}

#[test]
fn test_write_property_type_mismatch() {
    let mut customer = Customer::default();
    let err = customer
        .write_property(0, SqlValue::Text("seven".into()))
        .unwrap_err();
    assert!(matches!(err, quarry_core::Error::Mapping(_)));
}

#[test]
fn test_accept_changes_hook() {
    let mut customer = Customer::default();
    assert!(!customer.loaded);
    customer.accept_changes();
    assert!(customer.loaded);
}
