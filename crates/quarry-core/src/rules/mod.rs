//! Audit rules.
//!
//! An [`AuditRuleCollection`] is an immutable, additive policy set consumed by
//! the SQL builder. Rules inject column values ([`ValueRule`],
//! [`UserDataRule`], [`DateTimeRule`]), restrict column access
//! ([`RestrictColumn`]), turn deletes into flagging updates
//! ([`SoftDeleteRule`]), or validate arguments ([`ValidationRule`]).
//!
//! Every rule carries an [`OperationTypes`] mask and is never applied outside
//! it.

mod column;
mod context;
mod restrict;
mod validation;

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

pub use column::{ColumnRule, DateTimeKind, DateTimeRule, SoftDeleteRule, UserDataRule, ValueRule};
pub use context::{Clock, CurrentUser, FixedClock, RecordUser, RuleContext, SystemClock};
pub use restrict::RestrictColumn;
pub use validation::{
    ArgumentView, RecordValidator, RequiredFieldsValidator, ValidationRule, Validator,
};

use crate::error::{Error, Result};
use crate::metadata::{ObjectName, TableOrViewMetadata};

/// A set of operations, used as a rule's applicability mask.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OperationTypes(u8);

impl OperationTypes {
    /// No operation.
    pub const NONE: Self = Self(0);
    /// Inserts (including the insert half of an upsert).
    pub const INSERT: Self = Self(1);
    /// Updates (including the update half of an upsert).
    pub const UPDATE: Self = Self(1 << 1);
    /// Deletes.
    pub const DELETE: Self = Self(1 << 2);
    /// Selects.
    pub const SELECT: Self = Self(1 << 3);
    /// Inserts and updates.
    pub const INSERT_OR_UPDATE: Self = Self(Self::INSERT.0 | Self::UPDATE.0);
    /// Every operation.
    pub const ALL: Self = Self(0b1111);

    /// Returns whether the two masks share an operation.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns whether every operation in `other` is in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns whether the mask is empty.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for OperationTypes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for OperationTypes {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for OperationTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (Self::INSERT, "INSERT"),
            (Self::UPDATE, "UPDATE"),
            (Self::DELETE, "DELETE"),
            (Self::SELECT, "SELECT"),
        ]
        .iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| *name)
        .collect();
        if names.is_empty() {
            f.write_str("NONE")
        } else {
            f.write_str(&names.join(" | "))
        }
    }
}

/// One audit rule. The set of rule kinds is closed.
#[derive(Debug, Clone)]
pub enum AuditRule {
    /// Inject a literal or computed value.
    Value(ValueRule),
    /// Copy a field of the current user.
    UserData(UserDataRule),
    /// Stamp the current time.
    DateTime(DateTimeRule),
    /// Deny access to a column.
    RestrictColumn(RestrictColumn),
    /// Turn deletes into flagging updates.
    SoftDelete(SoftDeleteRule),
    /// Validate arguments.
    Validation(ValidationRule),
}

impl AuditRule {
    /// Returns the rule's operation mask.
    #[must_use]
    pub fn applies_when(&self) -> OperationTypes {
        match self {
            Self::Value(rule) => rule.applies_when(),
            Self::UserData(rule) => rule.applies_when(),
            Self::DateTime(rule) => rule.applies_when(),
            Self::RestrictColumn(rule) => rule.applies_when(),
            Self::SoftDelete(rule) => rule.applies_when(),
            Self::Validation(rule) => rule.applies_when(),
        }
    }

    fn as_column_rule(&self) -> Option<&dyn ColumnRule> {
        match self {
            Self::Value(rule) => Some(rule),
            Self::UserData(rule) => Some(rule),
            Self::DateTime(rule) => Some(rule),
            Self::SoftDelete(rule) => Some(rule),
            Self::RestrictColumn(_) | Self::Validation(_) => None,
        }
    }
}

impl From<ValueRule> for AuditRule {
    fn from(rule: ValueRule) -> Self {
        Self::Value(rule)
    }
}

impl From<UserDataRule> for AuditRule {
    fn from(rule: UserDataRule) -> Self {
        Self::UserData(rule)
    }
}

impl From<DateTimeRule> for AuditRule {
    fn from(rule: DateTimeRule) -> Self {
        Self::DateTime(rule)
    }
}

impl From<RestrictColumn> for AuditRule {
    fn from(rule: RestrictColumn) -> Self {
        Self::RestrictColumn(rule)
    }
}

impl From<SoftDeleteRule> for AuditRule {
    fn from(rule: SoftDeleteRule) -> Self {
        Self::SoftDelete(rule)
    }
}

impl From<ValidationRule> for AuditRule {
    fn from(rule: ValidationRule) -> Self {
        Self::Validation(rule)
    }
}

/// An immutable set of audit rules.
///
/// There is no removal API; extension produces a new collection and leaves
/// the original untouched.
#[derive(Debug, Clone, Default)]
pub struct AuditRuleCollection {
    rules: Arc<[AuditRule]>,
}

impl AuditRuleCollection {
    /// Creates a collection from rules.
    pub fn new(rules: impl IntoIterator<Item = AuditRule>) -> Self {
        Self {
            rules: rules.into_iter().collect(),
        }
    }

    /// Returns a new collection holding `base` followed by `extra`.
    #[must_use]
    pub fn with_rules(base: &Self, extra: impl IntoIterator<Item = AuditRule>) -> Self {
        Self {
            rules: base.rules.iter().cloned().chain(extra).collect(),
        }
    }

    /// Returns the number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns whether the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterates over the rules.
    pub fn iter(&self) -> impl Iterator<Item = &AuditRule> {
        self.rules.iter()
    }

    /// Returns the column rules for a column whose mask intersects
    /// `operation`, matched by SQL or mapped name, case-insensitively.
    #[must_use]
    pub fn get_rules_for_column(
        &self,
        sql_name: &str,
        property_name: &str,
        operation: OperationTypes,
    ) -> Vec<&dyn ColumnRule> {
        self.rules
            .iter()
            .filter_map(AuditRule::as_column_rule)
            .filter(|rule| rule.applies_when().intersects(operation))
            .filter(|rule| {
                rule.column_name().eq_ignore_ascii_case(sql_name)
                    || rule.column_name().eq_ignore_ascii_case(property_name)
            })
            .collect()
    }

    /// Returns the global and table-scoped restrictions on a column.
    #[must_use]
    pub fn get_restrictions_for_column(
        &self,
        object: &ObjectName,
        sql_name: &str,
        property_name: &str,
    ) -> Vec<&RestrictColumn> {
        self.rules
            .iter()
            .filter_map(|rule| match rule {
                AuditRule::RestrictColumn(restriction) => Some(restriction),
                _ => None,
            })
            .filter(|restriction| restriction.matches(object, sql_name, property_name))
            .collect()
    }

    /// Returns the soft-delete rule active for `operation` on `table`, if
    /// one of the rules' columns exists on it.
    #[must_use]
    pub fn soft_delete_rule_for(
        &self,
        table: &TableOrViewMetadata,
        operation: OperationTypes,
    ) -> Option<&SoftDeleteRule> {
        self.rules.iter().find_map(|rule| match rule {
            AuditRule::SoftDelete(soft)
                if soft.applies_when().intersects(operation)
                    && table.column(soft.column_name()).is_some() =>
            {
                Some(soft)
            }
            _ => None,
        })
    }

    /// Returns whether deletes on `table` become flagging updates.
    #[must_use]
    pub fn use_soft_delete(&self, table: &TableOrViewMetadata) -> bool {
        table.is_table() && self.soft_delete_rule_for(table, OperationTypes::DELETE).is_some()
    }

    /// Runs validation rules for `operation`, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] with the first violation.
    pub fn check_validation(&self, argument: &dyn ArgumentView, operation: OperationTypes) -> Result<()> {
        for rule in self.rules.iter() {
            if let AuditRule::Validation(validation) = rule {
                if validation.applies_when().intersects(operation) {
                    validation.check(argument, operation).map_err(Error::Validation)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ColumnMetadata;
    use crate::value::{SqlType, SqlValue};

    fn table(columns: &[&str]) -> TableOrViewMetadata {
        TableOrViewMetadata::new(
            ObjectName::new("Employee"),
            true,
            columns
                .iter()
                .map(|c| ColumnMetadata::new(*c, SqlType::Text))
                .collect(),
        )
        .unwrap()
    }

    fn sample_rules() -> AuditRuleCollection {
        AuditRuleCollection::new([
            ValueRule::new("CreatedBy", SqlValue::Int(1), OperationTypes::INSERT).into(),
            ValueRule::new("UpdatedBy", SqlValue::Int(1), OperationTypes::INSERT_OR_UPDATE).into(),
            DateTimeRule::new("DeletedDate", DateTimeKind::Utc, OperationTypes::DELETE).into(),
            SoftDeleteRule::new("DeletedFlag", SqlValue::Bool(true)).into(),
            RestrictColumn::global("Salary", OperationTypes::ALL, |_| false).into(),
            RestrictColumn::on_object(
                ObjectName::new("Employee"),
                "Ssn",
                OperationTypes::ALL,
                |_| false,
            )
            .into(),
        ])
    }

    #[test]
    fn test_rules_never_returned_outside_mask() {
        let rules = sample_rules();
        let masks = [
            OperationTypes::INSERT,
            OperationTypes::UPDATE,
            OperationTypes::DELETE,
            OperationTypes::SELECT,
            OperationTypes::INSERT_OR_UPDATE,
            OperationTypes::ALL,
            OperationTypes::NONE,
        ];
        for mask in masks {
            for column in ["CreatedBy", "UpdatedBy", "DeletedDate", "DeletedFlag", "Other"] {
                for rule in rules.get_rules_for_column(column, column, mask) {
                    assert!(rule.applies_when().intersects(mask));
                }
            }
        }
        assert_eq!(rules.get_rules_for_column("createdby", "", OperationTypes::INSERT).len(), 1);
        assert!(rules.get_rules_for_column("CreatedBy", "", OperationTypes::UPDATE).is_empty());
    }

    #[test]
    fn test_rules_match_mapped_name() {
        let rules = sample_rules();
        assert_eq!(
            rules
                .get_rules_for_column("updated_by", "UpdatedBy", OperationTypes::UPDATE)
                .len(),
            1
        );
    }

    #[test]
    fn test_restrictions_global_and_scoped() {
        let rules = sample_rules();
        let employee = ObjectName::new("Employee");
        let other = ObjectName::new("Contractor");
        assert_eq!(rules.get_restrictions_for_column(&employee, "Salary", "Salary").len(), 1);
        assert_eq!(rules.get_restrictions_for_column(&other, "Salary", "Salary").len(), 1);
        assert_eq!(rules.get_restrictions_for_column(&employee, "SSN", "SSN").len(), 1);
        assert!(rules.get_restrictions_for_column(&other, "Ssn", "Ssn").is_empty());
    }

    #[test]
    fn test_use_soft_delete_requires_column() {
        let rules = sample_rules();
        assert!(rules.use_soft_delete(&table(&["EmployeeKey", "DeletedFlag"])));
        assert!(!rules.use_soft_delete(&table(&["EmployeeKey"])));
    }

    #[test]
    fn test_with_rules_is_copy_on_write() {
        let base = AuditRuleCollection::default();
        let extended = AuditRuleCollection::with_rules(
            &base,
            [SoftDeleteRule::new("DeletedFlag", SqlValue::Bool(true)).into()],
        );
        assert!(base.is_empty());
        assert_eq!(extended.len(), 1);
        assert!(!base.use_soft_delete(&table(&["DeletedFlag"])));
        assert!(extended.use_soft_delete(&table(&["DeletedFlag"])));
    }

    #[test]
    fn test_identical_configuration_behaves_identically() {
        let a = sample_rules();
        let b = sample_rules();
        for column in ["CreatedBy", "UpdatedBy", "DeletedFlag"] {
            for mask in [OperationTypes::INSERT, OperationTypes::UPDATE, OperationTypes::DELETE] {
                assert_eq!(
                    a.get_rules_for_column(column, column, mask).len(),
                    b.get_rules_for_column(column, column, mask).len()
                );
            }
        }
        let t = table(&["DeletedFlag"]);
        assert_eq!(a.use_soft_delete(&t), b.use_soft_delete(&t));
    }

    #[test]
    fn test_operation_types_debug() {
        assert_eq!(format!("{:?}", OperationTypes::INSERT_OR_UPDATE), "INSERT | UPDATE");
        assert_eq!(format!("{:?}", OperationTypes::NONE), "NONE");
    }
}
