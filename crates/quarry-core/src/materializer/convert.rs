//! Conversions from column values to record property values.
//!
//! Both materializer strategies go through [`Conversion`], so a compiled
//! projection and the reflective path always agree on the result.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};

use crate::descriptor::PropertyType;
use crate::error::{Error, Result};
use crate::value::{SqlType, SqlValue};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMATS: [&str; 2] = ["%H:%M:%S%.f", "%H:%M"];
const DATE_TIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// How one column value becomes one property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    /// The value already has the property's type.
    Direct,
    /// Integer to boolean, non-zero is `true`.
    IntToBool,
    /// Boolean to `0` or `1`.
    BoolToInt,
    /// Integer widened to floating point.
    IntToFloat,
    /// Time-of-day parsed from text.
    TextToTime,
    /// Time-of-day rendered as text.
    TimeToText,
    /// Calendar date parsed from text.
    TextToDate,
    /// Date and time parsed from text.
    TextToDateTime,
    /// Date, time and offset parsed from text.
    TextToDateTimeOffset,
    /// Date and time narrowed to its date.
    DateTimeToDate,
    /// Date and time narrowed to its time of day.
    DateTimeToTime,
    /// Offset date and time narrowed to its local date.
    DateTimeOffsetToDate,
    /// Offset date and time narrowed to its local date and time.
    DateTimeOffsetToDateTime,
    /// Date widened to midnight.
    DateToDateTime,
    /// Date and time read as UTC.
    DateTimeToDateTimeOffset,
    /// No conversion exists.
    Unsupported,
}

/// Groups the integer and floating point widths together.
#[must_use]
pub const fn value_class(sql_type: SqlType) -> SqlType {
    match sql_type {
        SqlType::SmallInt | SqlType::Integer | SqlType::BigInt => SqlType::BigInt,
        SqlType::Real | SqlType::Double => SqlType::Double,
        other => other,
    }
}

impl Conversion {
    /// Chooses the conversion from a column of type `source` into a property
    /// of type `target`.
    #[must_use]
    pub const fn plan(source: SqlType, target: PropertyType) -> Self {
        use PropertyType as P;
        use SqlType as S;
        match (value_class(source), target) {
            (_, P::Any)
            | (S::Bool, P::Bool)
            | (S::BigInt, P::I16 | P::I32 | P::I64)
            | (S::Double, P::F32 | P::F64)
            | (S::Text, P::Char | P::String)
            | (S::Blob, P::Bytes)
            | (S::Date, P::Date)
            | (S::Time, P::Time)
            | (S::Timestamp, P::DateTime)
            | (S::TimestampTz, P::DateTimeOffset) => Self::Direct,
            (S::BigInt, P::Bool) => Self::IntToBool,
            (S::Bool, P::I16 | P::I32 | P::I64) => Self::BoolToInt,
            (S::BigInt, P::F32 | P::F64) => Self::IntToFloat,
            (S::Text, P::Time) => Self::TextToTime,
            (S::Time, P::String) => Self::TimeToText,
            (S::Text, P::Date) => Self::TextToDate,
            (S::Text, P::DateTime) => Self::TextToDateTime,
            (S::Text, P::DateTimeOffset) => Self::TextToDateTimeOffset,
            (S::Timestamp, P::Date) => Self::DateTimeToDate,
            (S::Timestamp, P::Time) => Self::DateTimeToTime,
            (S::TimestampTz, P::Date) => Self::DateTimeOffsetToDate,
            (S::TimestampTz, P::DateTime) => Self::DateTimeOffsetToDateTime,
            (S::Date, P::DateTime) => Self::DateToDateTime,
            (S::Timestamp, P::DateTimeOffset) => Self::DateTimeToDateTimeOffset,
            _ => Self::Unsupported,
        }
    }

    /// Applies the conversion to a non-null value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Mapping`] when the value does not have the expected
    /// source type or text cannot be parsed.
    pub fn apply(self, value: SqlValue, target: PropertyType) -> Result<SqlValue> {
        let converted = match (self, value) {
            (Self::Direct, value) => Some(value),
            (Self::IntToBool, SqlValue::Int(n)) => Some(SqlValue::Bool(n != 0)),
            (Self::BoolToInt, SqlValue::Bool(b)) => Some(SqlValue::Int(i64::from(b))),
            #[allow(clippy::cast_precision_loss)]
            (Self::IntToFloat, SqlValue::Int(n)) => Some(SqlValue::Float(n as f64)),
            (Self::TextToTime, SqlValue::Text(ref s)) => parse_time(s).map(SqlValue::Time),
            (Self::TimeToText, SqlValue::Time(t)) => {
                Some(SqlValue::Text(t.format("%H:%M:%S%.f").to_string()))
            }
            (Self::TextToDate, SqlValue::Text(ref s)) => NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
                .ok()
                .map(SqlValue::Date),
            (Self::TextToDateTime, SqlValue::Text(ref s)) => {
                parse_date_time(s).map(SqlValue::Timestamp)
            }
            (Self::TextToDateTimeOffset, SqlValue::Text(ref s)) => {
                parse_date_time_offset(s).map(SqlValue::TimestampTz)
            }
            (Self::DateTimeToDate, SqlValue::Timestamp(ts)) => Some(SqlValue::Date(ts.date())),
            (Self::DateTimeToTime, SqlValue::Timestamp(ts)) => Some(SqlValue::Time(ts.time())),
            (Self::DateTimeOffsetToDate, SqlValue::TimestampTz(ts)) => {
                Some(SqlValue::Date(ts.date_naive()))
            }
            (Self::DateTimeOffsetToDateTime, SqlValue::TimestampTz(ts)) => {
                Some(SqlValue::Timestamp(ts.naive_local()))
            }
            (Self::DateToDateTime, SqlValue::Date(d)) => {
                Some(SqlValue::Timestamp(d.and_time(NaiveTime::MIN)))
            }
            (Self::DateTimeToDateTimeOffset, SqlValue::Timestamp(ts)) => {
                Some(SqlValue::TimestampTz(ts.and_utc().fixed_offset()))
            }
            (_, value) => {
                return Err(Error::Mapping(format!(
                    "cannot convert {} ({}) to {target}",
                    value.to_sql_inline(),
                    value.sql_type()
                )));
            }
        };
        converted.ok_or_else(|| {
            Error::Mapping(format!("text cannot be parsed as {target} ({self:?})"))
        })
    }

    /// Converts `value` by the conversion its own runtime type selects.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Mapping`] when no conversion exists.
    pub fn convert(value: SqlValue, target: PropertyType) -> Result<SqlValue> {
        Self::plan(value.sql_type(), target).apply(value, target)
    }
}

fn parse_time(text: &str) -> Option<NaiveTime> {
    let text = text.trim();
    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(text, format).ok())
}

fn parse_date_time(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, DATE_FORMAT)
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

fn parse_date_time_offset(text: &str) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .or_else(|_| DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%:z"))
        .ok()
        .or_else(|| parse_date_time(text).map(|ts| ts.and_utc().fixed_offset()))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn test_direct_accessor_when_types_match() {
        assert_eq!(Conversion::plan(SqlType::Integer, PropertyType::I32), Conversion::Direct);
        assert_eq!(Conversion::plan(SqlType::Real, PropertyType::F64), Conversion::Direct);
        assert_eq!(Conversion::plan(SqlType::Blob, PropertyType::Any), Conversion::Direct);
    }

    #[test]
    fn test_time_of_day_round_trips_through_text() {
        let time = Conversion::convert(SqlValue::Text("13:45:10".into()), PropertyType::Time).unwrap();
        assert_eq!(
            time,
            SqlValue::Time(NaiveTime::from_hms_opt(13, 45, 10).unwrap())
        );
        let text = Conversion::convert(time, PropertyType::String).unwrap();
        assert_eq!(text, SqlValue::Text("13:45:10".into()));
    }

    #[test]
    fn test_date_time_narrowing() {
        let ts = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_opt(23, 30, 0)
            .unwrap();
        assert_eq!(
            Conversion::convert(SqlValue::Timestamp(ts), PropertyType::Date).unwrap(),
            SqlValue::Date(ts.date())
        );
        let offset = Utc::now().fixed_offset();
        assert_eq!(
            Conversion::convert(SqlValue::TimestampTz(offset), PropertyType::DateTime).unwrap(),
            SqlValue::Timestamp(offset.naive_local())
        );
    }

    #[test]
    fn test_integer_widening() {
        assert_eq!(
            Conversion::convert(SqlValue::Int(3), PropertyType::F64).unwrap(),
            SqlValue::Float(3.0)
        );
        assert_eq!(
            Conversion::convert(SqlValue::Int(0), PropertyType::Bool).unwrap(),
            SqlValue::Bool(false)
        );
    }

    #[test]
    fn test_text_dates_from_sqlite_storage() {
        assert_eq!(
            Conversion::convert(SqlValue::Text("2024-05-01 08:00:00".into()), PropertyType::DateTime)
                .unwrap(),
            SqlValue::Timestamp(
                NaiveDate::from_ymd_opt(2024, 5, 1)
                    .unwrap()
                    .and_hms_opt(8, 0, 0)
                    .unwrap()
            )
        );
        assert!(matches!(
            Conversion::convert(SqlValue::Text("not a date".into()), PropertyType::Date),
            Err(Error::Mapping(_))
        ));
    }

    #[test]
    fn test_unsupported_conversion() {
        assert_eq!(
            Conversion::plan(SqlType::Blob, PropertyType::I64),
            Conversion::Unsupported
        );
        assert!(Conversion::convert(SqlValue::Float(1.5), PropertyType::I32).is_err());
    }
}
