//! Column rules: rules that generate a value for one column.

use std::fmt;
use std::sync::Arc;

use super::{OperationTypes, RuleContext};
use crate::error::{Error, Result};
use crate::value::SqlValue;

/// A rule that supplies the value of one column.
///
/// The generated value always overrides whatever the caller supplied for the
/// column.
pub trait ColumnRule: Send + Sync {
    /// Column the rule targets (SQL or mapped name).
    fn column_name(&self) -> &str;

    /// Operations the rule applies to.
    fn applies_when(&self) -> OperationTypes;

    /// Generates the column value.
    ///
    /// `supplied` is the caller's value for the column, if any.
    ///
    /// # Errors
    ///
    /// Fails when the rule's inputs (e.g. the current user) are unavailable.
    fn generate_value(&self, context: &RuleContext, supplied: Option<&SqlValue>) -> Result<SqlValue>;
}

type ValueFactory = Arc<dyn Fn(Option<&SqlValue>) -> SqlValue + Send + Sync>;

/// Injects a literal or computed value.
#[derive(Clone)]
pub struct ValueRule {
    column: String,
    applies_when: OperationTypes,
    factory: ValueFactory,
}

impl ValueRule {
    /// Always writes `value`.
    pub fn new(column: impl Into<String>, value: SqlValue, applies_when: OperationTypes) -> Self {
        Self {
            column: column.into(),
            applies_when,
            factory: Arc::new(move |_| value.clone()),
        }
    }

    /// Writes whatever `factory` returns; it receives the caller's value.
    pub fn computed<F>(column: impl Into<String>, applies_when: OperationTypes, factory: F) -> Self
    where
        F: Fn(Option<&SqlValue>) -> SqlValue + Send + Sync + 'static,
    {
        Self {
            column: column.into(),
            applies_when,
            factory: Arc::new(factory),
        }
    }
}

impl ColumnRule for ValueRule {
    fn column_name(&self) -> &str {
        &self.column
    }

    fn applies_when(&self) -> OperationTypes {
        self.applies_when
    }

    fn generate_value(&self, _: &RuleContext, supplied: Option<&SqlValue>) -> Result<SqlValue> {
        Ok((self.factory)(supplied))
    }
}

impl fmt::Debug for ValueRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueRule")
            .field("column", &self.column)
            .field("applies_when", &self.applies_when)
            .finish_non_exhaustive()
    }
}

/// Copies a field of the current user into a column.
#[derive(Debug, Clone)]
pub struct UserDataRule {
    column: String,
    user_field: String,
    applies_when: OperationTypes,
}

impl UserDataRule {
    /// Writes `user_field` of the current user into `column`.
    pub fn new(
        column: impl Into<String>,
        user_field: impl Into<String>,
        applies_when: OperationTypes,
    ) -> Self {
        Self {
            column: column.into(),
            user_field: user_field.into(),
            applies_when,
        }
    }
}

impl ColumnRule for UserDataRule {
    fn column_name(&self) -> &str {
        &self.column
    }

    fn applies_when(&self) -> OperationTypes {
        self.applies_when
    }

    fn generate_value(&self, context: &RuleContext, _: Option<&SqlValue>) -> Result<SqlValue> {
        let user = context.user().ok_or_else(|| Error::NoCurrentUser {
            column: self.column.clone(),
        })?;
        user.field(&self.user_field).ok_or_else(|| {
            Error::Mapping(format!(
                "current user has no field '{}' required by the rule on '{}'",
                self.user_field, self.column
            ))
        })
    }
}

/// Which clock reading a [`DateTimeRule`] stamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateTimeKind {
    /// Local wall-clock time without offset.
    Local,
    /// UTC wall-clock time without offset.
    Utc,
    /// Local time including its offset.
    LocalOffset,
    /// UTC time including its (zero) offset.
    UtcOffset,
}

/// Stamps the current time into a column.
#[derive(Debug, Clone)]
pub struct DateTimeRule {
    column: String,
    kind: DateTimeKind,
    applies_when: OperationTypes,
}

impl DateTimeRule {
    /// Stamps `column` with the time selected by `kind`.
    pub fn new(column: impl Into<String>, kind: DateTimeKind, applies_when: OperationTypes) -> Self {
        Self {
            column: column.into(),
            kind,
            applies_when,
        }
    }

    /// Returns the clock reading this rule stamps.
    #[must_use]
    pub const fn kind(&self) -> DateTimeKind {
        self.kind
    }
}

impl ColumnRule for DateTimeRule {
    fn column_name(&self) -> &str {
        &self.column
    }

    fn applies_when(&self) -> OperationTypes {
        self.applies_when
    }

    fn generate_value(&self, context: &RuleContext, _: Option<&SqlValue>) -> Result<SqlValue> {
        let clock = context.clock();
        Ok(match self.kind {
            DateTimeKind::Local => SqlValue::Timestamp(clock.now_local().naive_local()),
            DateTimeKind::Utc => SqlValue::Timestamp(clock.now_utc().naive_utc()),
            DateTimeKind::LocalOffset => SqlValue::TimestampTz(clock.now_local()),
            DateTimeKind::UtcOffset => SqlValue::TimestampTz(clock.now_utc().fixed_offset()),
        })
    }
}

/// Turns deletes into an update that flags the row.
///
/// The rule also hides flagged rows from selects on tables carrying the
/// column when its mask includes [`OperationTypes::SELECT`].
#[derive(Debug, Clone)]
pub struct SoftDeleteRule {
    column: String,
    deleted_value: SqlValue,
    applies_when: OperationTypes,
}

impl SoftDeleteRule {
    /// Flags deleted rows by writing `deleted_value` into `column`.
    pub fn new(column: impl Into<String>, deleted_value: SqlValue) -> Self {
        Self {
            column: column.into(),
            deleted_value,
            applies_when: OperationTypes::DELETE | OperationTypes::SELECT,
        }
    }

    /// Overrides the operations the rule applies to.
    #[must_use]
    pub const fn applies_when_mask(mut self, applies_when: OperationTypes) -> Self {
        self.applies_when = applies_when;
        self
    }

    /// Returns the value that marks a row deleted.
    #[must_use]
    pub const fn deleted_value(&self) -> &SqlValue {
        &self.deleted_value
    }
}

impl ColumnRule for SoftDeleteRule {
    fn column_name(&self) -> &str {
        &self.column
    }

    fn applies_when(&self) -> OperationTypes {
        self.applies_when
    }

    fn generate_value(&self, _: &RuleContext, _: Option<&SqlValue>) -> Result<SqlValue> {
        Ok(self.deleted_value.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{NaiveDate, TimeZone};

    use super::*;
    use crate::rules::FixedClock;

    #[test]
    fn test_value_rule_literal() {
        let rule = ValueRule::new("Status", SqlValue::Text("new".into()), OperationTypes::INSERT);
        let value = rule
            .generate_value(&RuleContext::default(), Some(&SqlValue::Text("old".into())))
            .unwrap();
        assert_eq!(value, SqlValue::Text("new".into()));
    }

    #[test]
    fn test_value_rule_sees_caller_value() {
        let rule = ValueRule::computed("Email", OperationTypes::INSERT_OR_UPDATE, |v| match v {
            Some(SqlValue::Text(s)) => SqlValue::Text(s.to_lowercase()),
            _ => SqlValue::Null,
        });
        let value = rule
            .generate_value(&RuleContext::default(), Some(&SqlValue::Text("A@B.COM".into())))
            .unwrap();
        assert_eq!(value, SqlValue::Text("a@b.com".into()));
    }

    #[test]
    fn test_user_data_rule_requires_user() {
        let rule = UserDataRule::new("CreatedBy", "UserKey", OperationTypes::INSERT);
        let err = rule.generate_value(&RuleContext::default(), None).unwrap_err();
        assert!(matches!(err, Error::NoCurrentUser { ref column } if column == "CreatedBy"));

        let mut user = BTreeMap::new();
        user.insert("userkey".to_string(), SqlValue::Int(7));
        let context = RuleContext::default().with_user(Arc::new(user));
        assert_eq!(rule.generate_value(&context, None).unwrap(), SqlValue::Int(7));
    }

    #[test]
    fn test_date_time_rule_reads_clock() {
        let instant = chrono::FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 1, 12, 30, 0)
            .unwrap();
        let context = RuleContext::default().with_clock(Arc::new(FixedClock::new(instant)));
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

        let utc = DateTimeRule::new("UpdatedDate", DateTimeKind::Utc, OperationTypes::UPDATE);
        assert_eq!(
            utc.generate_value(&context, None).unwrap(),
            SqlValue::Timestamp(day.and_hms_opt(10, 30, 0).unwrap())
        );

        let local = DateTimeRule::new("UpdatedDate", DateTimeKind::Local, OperationTypes::UPDATE);
        assert_eq!(
            local.generate_value(&context, None).unwrap(),
            SqlValue::Timestamp(day.and_hms_opt(12, 30, 0).unwrap())
        );

        let offset = DateTimeRule::new("Stamp", DateTimeKind::LocalOffset, OperationTypes::UPDATE);
        assert_eq!(offset.generate_value(&context, None).unwrap(), SqlValue::TimestampTz(instant));
    }
}
