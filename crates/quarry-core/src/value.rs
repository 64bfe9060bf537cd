//! SQL values and parameter handling.
//!
//! Every value that reaches a command travels as a [`SqlValue`] parameter; it
//! is never spliced into command text.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::descriptor::PropertyType;
use crate::error::{Error, Result};

/// Declared database type of a column, parameter, or result field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    /// Boolean / bit.
    Bool,
    /// 16-bit integer.
    SmallInt,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInt,
    /// Single-precision float.
    Real,
    /// Double-precision float.
    Double,
    /// Character data.
    Text,
    /// Binary data.
    Blob,
    /// Calendar date.
    Date,
    /// Time of day.
    Time,
    /// Date and time without offset.
    Timestamp,
    /// Date and time with offset.
    TimestampTz,
    /// Type not known until a value is read (e.g. SQLite expressions).
    Unknown,
}

impl SqlType {
    /// Parses a declared column type name into a type tag.
    ///
    /// Follows the affinity rules most engines share: anything containing
    /// `INT` is an integer, `CHAR`/`TEXT`/`CLOB` is text, and so on.
    #[must_use]
    pub fn from_declared(declared: &str) -> Self {
        let upper = declared.trim().to_ascii_uppercase();
        if upper.is_empty() {
            return Self::Unknown;
        }
        if upper.starts_with("BOOL") || upper == "BIT" {
            Self::Bool
        } else if upper.contains("SMALLINT") || upper == "INT2" || upper == "TINYINT" {
            Self::SmallInt
        } else if upper.contains("BIGINT") || upper == "INT8" || upper == "INTEGER" {
            // SQLite INTEGER is 64-bit
            Self::BigInt
        } else if upper.contains("INT") {
            Self::Integer
        } else if upper == "REAL" || upper == "FLOAT4" {
            Self::Real
        } else if upper.contains("DOUB") || upper.contains("FLOA") || upper.contains("NUMERIC") {
            Self::Double
        } else if upper.contains("CHAR") || upper.contains("TEXT") || upper.contains("CLOB") {
            Self::Text
        } else if upper.contains("BLOB") || upper.contains("BINARY") || upper == "BYTEA" {
            Self::Blob
        } else if upper.contains("TIMESTAMPTZ")
            || upper.contains("WITH TIME ZONE")
            || upper.contains("DATETIMEOFFSET")
        {
            Self::TimestampTz
        } else if upper.contains("TIMESTAMP") || upper.contains("DATETIME") {
            Self::Timestamp
        } else if upper == "DATE" {
            Self::Date
        } else if upper.starts_with("TIME") {
            Self::Time
        } else {
            Self::Unknown
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::SmallInt => "smallint",
            Self::Integer => "integer",
            Self::BigInt => "bigint",
            Self::Real => "real",
            Self::Double => "double",
            Self::Text => "text",
            Self::Blob => "blob",
            Self::Date => "date",
            Self::Time => "time",
            Self::Timestamp => "timestamp",
            Self::TimestampTz => "timestamptz",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A SQL value that can be used as a parameter.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SqlValue {
    /// NULL value.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// Text value.
    Text(String),
    /// Binary blob value.
    Blob(Vec<u8>),
    /// Calendar date.
    Date(NaiveDate),
    /// Time of day.
    Time(NaiveTime),
    /// Date and time without offset.
    Timestamp(NaiveDateTime),
    /// Date and time with offset.
    TimestampTz(DateTime<FixedOffset>),
}

impl SqlValue {
    /// Returns whether this is `NULL`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the natural type tag for this value.
    #[must_use]
    pub const fn sql_type(&self) -> SqlType {
        match self {
            Self::Null => SqlType::Unknown,
            Self::Bool(_) => SqlType::Bool,
            Self::Int(_) => SqlType::BigInt,
            Self::Float(_) => SqlType::Double,
            Self::Text(_) => SqlType::Text,
            Self::Blob(_) => SqlType::Blob,
            Self::Date(_) => SqlType::Date,
            Self::Time(_) => SqlType::Time,
            Self::Timestamp(_) => SqlType::Timestamp,
            Self::TimestampTz(_) => SqlType::TimestampTz,
        }
    }

    /// Returns the SQL representation for inline use (escaped).
    ///
    /// **Warning**: Prefer using parameterized commands instead. This exists
    /// for diagnostics such as cache keys and rendered projection source.
    #[must_use]
    pub fn to_sql_inline(&self) -> String {
        match self {
            Self::Null => String::from("NULL"),
            Self::Bool(b) => {
                if *b {
                    String::from("TRUE")
                } else {
                    String::from("FALSE")
                }
            }
            Self::Int(n) => format!("{n}"),
            Self::Float(f) => format!("{f}"),
            Self::Text(s) => {
                // Escape single quotes by doubling them
                let escaped = s.replace('\'', "''");
                format!("'{escaped}'")
            }
            Self::Blob(b) => {
                let hex: String = b.iter().map(|byte| format!("{byte:02X}")).collect();
                format!("X'{hex}'")
            }
            Self::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
            Self::Time(t) => format!("'{}'", t.format("%H:%M:%S%.f")),
            Self::Timestamp(ts) => format!("'{}'", ts.format("%Y-%m-%d %H:%M:%S%.f")),
            Self::TimestampTz(ts) => format!("'{}'", ts.to_rfc3339()),
        }
    }
}

/// Trait for types that can be converted to SQL values.
pub trait ToSqlValue {
    /// Converts the value to a `SqlValue`.
    fn to_sql_value(self) -> SqlValue;
}

impl ToSqlValue for SqlValue {
    fn to_sql_value(self) -> SqlValue {
        self
    }
}

impl ToSqlValue for bool {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Bool(self)
    }
}

impl ToSqlValue for i64 {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Int(self)
    }
}

impl ToSqlValue for i32 {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Int(i64::from(self))
    }
}

impl ToSqlValue for i16 {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Int(i64::from(self))
    }
}

impl ToSqlValue for u32 {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Int(i64::from(self))
    }
}

impl ToSqlValue for f64 {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Float(self)
    }
}

impl ToSqlValue for f32 {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Float(f64::from(self))
    }
}

impl ToSqlValue for char {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Text(self.to_string())
    }
}

impl ToSqlValue for String {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Text(self)
    }
}

impl ToSqlValue for &str {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Text(String::from(self))
    }
}

impl ToSqlValue for Vec<u8> {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Blob(self)
    }
}

impl ToSqlValue for &[u8] {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Blob(self.to_vec())
    }
}

impl ToSqlValue for NaiveDate {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Date(self)
    }
}

impl ToSqlValue for NaiveTime {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Time(self)
    }
}

impl ToSqlValue for NaiveDateTime {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Timestamp(self)
    }
}

impl ToSqlValue for DateTime<FixedOffset> {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::TimestampTz(self)
    }
}

impl ToSqlValue for DateTime<Utc> {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::TimestampTz(self.fixed_offset())
    }
}

impl<T: ToSqlValue> ToSqlValue for Option<T> {
    fn to_sql_value(self) -> SqlValue {
        match self {
            Some(v) => v.to_sql_value(),
            None => SqlValue::Null,
        }
    }
}

/// Trait for types that can be read back from SQL values.
pub trait FromSqlValue: Sized {
    /// Converts a `SqlValue` into `Self`, failing with a mapping error when
    /// the value has the wrong shape.
    fn from_sql_value(value: SqlValue) -> Result<Self>;
}

fn mismatch<T>(expected: &str, value: &SqlValue) -> Result<T> {
    Err(Error::Mapping(format!(
        "cannot convert {} to {expected}",
        value.to_sql_inline()
    )))
}

impl FromSqlValue for SqlValue {
    fn from_sql_value(value: SqlValue) -> Result<Self> {
        Ok(value)
    }
}

impl FromSqlValue for bool {
    fn from_sql_value(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Bool(b) => Ok(b),
            other => mismatch("bool", &other),
        }
    }
}

macro_rules! impl_from_sql_int {
    ($($ty:ty),+) => {
        $(
            impl FromSqlValue for $ty {
                fn from_sql_value(value: SqlValue) -> Result<Self> {
                    match value {
                        SqlValue::Int(n) => <$ty>::try_from(n).map_err(|_| {
                            Error::Mapping(format!(
                                "integer {n} does not fit in {}",
                                stringify!($ty)
                            ))
                        }),
                        other => mismatch(stringify!($ty), &other),
                    }
                }
            }
        )+
    };
}

impl_from_sql_int!(i16, i32, i64, u32);

impl FromSqlValue for f64 {
    fn from_sql_value(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Float(f) => Ok(f),
            other => mismatch("f64", &other),
        }
    }
}

impl FromSqlValue for f32 {
    #[allow(clippy::cast_possible_truncation)]
    fn from_sql_value(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Float(f) => Ok(f as Self),
            other => mismatch("f32", &other),
        }
    }
}

impl FromSqlValue for String {
    fn from_sql_value(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Text(s) => Ok(s),
            other => mismatch("String", &other),
        }
    }
}

impl FromSqlValue for char {
    fn from_sql_value(value: SqlValue) -> Result<Self> {
        match value {
            // CHAR(n) values arrive space-padded
            SqlValue::Text(ref s) => match s.chars().next() {
                Some(c) => Ok(c),
                None => mismatch("char", &value),
            },
            other => mismatch("char", &other),
        }
    }
}

impl FromSqlValue for Vec<u8> {
    fn from_sql_value(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Blob(b) => Ok(b),
            other => mismatch("Vec<u8>", &other),
        }
    }
}

impl FromSqlValue for NaiveDate {
    fn from_sql_value(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Date(d) => Ok(d),
            other => mismatch("NaiveDate", &other),
        }
    }
}

impl FromSqlValue for NaiveTime {
    fn from_sql_value(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Time(t) => Ok(t),
            other => mismatch("NaiveTime", &other),
        }
    }
}

impl FromSqlValue for NaiveDateTime {
    fn from_sql_value(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Timestamp(ts) => Ok(ts),
            other => mismatch("NaiveDateTime", &other),
        }
    }
}

impl FromSqlValue for DateTime<FixedOffset> {
    fn from_sql_value(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::TimestampTz(ts) => Ok(ts),
            other => mismatch("DateTime<FixedOffset>", &other),
        }
    }
}

impl FromSqlValue for DateTime<Utc> {
    fn from_sql_value(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::TimestampTz(ts) => Ok(ts.with_timezone(&Utc)),
            other => mismatch("DateTime<Utc>", &other),
        }
    }
}

impl<T: FromSqlValue> FromSqlValue for Option<T> {
    fn from_sql_value(value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Null => Ok(None),
            other => T::from_sql_value(other).map(Some),
        }
    }
}

/// Static type information for a record field.
///
/// Used by `#[derive(Record)]` to fill in the property descriptor without
/// inspecting type names.
pub trait FieldType {
    /// The property type materialization converts into.
    const PROPERTY_TYPE: PropertyType;
    /// Whether the field accepts `NULL`.
    const NULLABLE: bool = false;
}

macro_rules! impl_field_type {
    ($($ty:ty => $prop:ident),+ $(,)?) => {
        $(
            impl FieldType for $ty {
                const PROPERTY_TYPE: PropertyType = PropertyType::$prop;
            }
        )+
    };
}

impl_field_type!(
    bool => Bool,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u32 => I64,
    f32 => F32,
    f64 => F64,
    char => Char,
    String => String,
    Vec<u8> => Bytes,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => DateTime,
    DateTime<FixedOffset> => DateTimeOffset,
    DateTime<Utc> => DateTimeOffset,
    SqlValue => Any,
);

impl<T: FieldType> FieldType for Option<T> {
    const PROPERTY_TYPE: PropertyType = T::PROPERTY_TYPE;
    const NULLABLE: bool = true;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_value_inline_text_escaping() {
        assert_eq!(
            SqlValue::Text(String::from("O'Brien")).to_sql_inline(),
            "'O''Brien'"
        );
    }

    #[test]
    fn test_sql_value_inline_blob() {
        assert_eq!(
            SqlValue::Blob(vec![0x48, 0x45, 0x4C, 0x4C, 0x4F]).to_sql_inline(),
            "X'48454C4C4F'"
        );
    }

    #[test]
    fn test_to_sql_value_conversions() {
        assert_eq!(true.to_sql_value(), SqlValue::Bool(true));
        assert_eq!(42_i32.to_sql_value(), SqlValue::Int(42));
        assert_eq!('x'.to_sql_value(), SqlValue::Text(String::from("x")));
        assert_eq!(None::<i32>.to_sql_value(), SqlValue::Null);
        assert_eq!(Some(42_i16).to_sql_value(), SqlValue::Int(42));
    }

    #[test]
    fn test_from_sql_value_integer_range_checked() {
        assert_eq!(i16::from_sql_value(SqlValue::Int(12)).unwrap(), 12);
        assert!(matches!(
            i16::from_sql_value(SqlValue::Int(100_000)),
            Err(Error::Mapping(_))
        ));
    }

    #[test]
    fn test_from_sql_value_option_wraps_null() {
        assert_eq!(Option::<String>::from_sql_value(SqlValue::Null).unwrap(), None);
        assert!(String::from_sql_value(SqlValue::Null).is_err());
    }

    #[test]
    fn test_char_takes_first_character() {
        assert_eq!(char::from_sql_value(SqlValue::Text("Y".into())).unwrap(), 'Y');
        assert_eq!(char::from_sql_value(SqlValue::Text("N  ".into())).unwrap(), 'N');
        assert_eq!(char::from_sql_value(SqlValue::Text("YES".into())).unwrap(), 'Y');
        assert!(matches!(
            char::from_sql_value(SqlValue::Text(String::new())),
            Err(Error::Mapping(_))
        ));
    }

    #[test]
    fn test_declared_type_parsing() {
        assert_eq!(SqlType::from_declared("INTEGER"), SqlType::BigInt);
        assert_eq!(SqlType::from_declared("int"), SqlType::Integer);
        assert_eq!(SqlType::from_declared("VARCHAR(50)"), SqlType::Text);
        assert_eq!(SqlType::from_declared("datetimeoffset"), SqlType::TimestampTz);
        assert_eq!(SqlType::from_declared("DATETIME"), SqlType::Timestamp);
        assert_eq!(SqlType::from_declared("time"), SqlType::Time);
        assert_eq!(SqlType::from_declared("BOOLEAN"), SqlType::Bool);
        assert_eq!(SqlType::from_declared(""), SqlType::Unknown);
    }
}
