//! Validation rules run before inserts and updates.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use super::OperationTypes;
use crate::value::SqlValue;

/// Read-only view of a command argument, as seen by validators.
pub trait ArgumentView {
    /// Reads a named value, case-insensitively.
    fn value(&self, name: &str) -> Option<SqlValue>;

    /// Returns the typed record behind the argument, if there is one.
    fn record(&self) -> Option<&dyn Any>;
}

/// Trait for argument validators.
pub trait Validator: Send + Sync {
    /// Validates an argument and returns an error message if invalid.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    fn validate(&self, argument: &dyn ArgumentView, operation: OperationTypes) -> Result<(), String>;
}

/// Validator that requires named fields to be present, non-null and, for
/// text, non-blank.
#[derive(Debug, Clone)]
pub struct RequiredFieldsValidator {
    fields: Vec<String>,
}

impl RequiredFieldsValidator {
    /// Requires each of `fields`.
    #[must_use]
    pub fn new(fields: &[&str]) -> Self {
        Self {
            fields: fields.iter().map(|f| (*f).to_string()).collect(),
        }
    }
}

impl Validator for RequiredFieldsValidator {
    fn validate(&self, argument: &dyn ArgumentView, _: OperationTypes) -> Result<(), String> {
        for field in &self.fields {
            match argument.value(field) {
                None | Some(SqlValue::Null) => return Err(format!("{field} is required.")),
                Some(SqlValue::Text(s)) if s.trim().is_empty() => {
                    return Err(format!("{field} is required."));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// Validator over a concrete record type.
///
/// Arguments that are not a `T` (maps, other records) pass untouched.
pub struct RecordValidator<T, F> {
    check: F,
    _marker: PhantomData<fn(&T)>,
}

impl<T, F> RecordValidator<T, F>
where
    T: 'static,
    F: Fn(&T) -> Result<(), String> + Send + Sync,
{
    /// Validates `T` arguments with `check`.
    pub const fn new(check: F) -> Self {
        Self {
            check,
            _marker: PhantomData,
        }
    }
}

impl<T, F> Validator for RecordValidator<T, F>
where
    T: 'static,
    F: Fn(&T) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, argument: &dyn ArgumentView, _: OperationTypes) -> Result<(), String> {
        match argument.record().and_then(|r| r.downcast_ref::<T>()) {
            Some(record) => (self.check)(record),
            None => Ok(()),
        }
    }
}

/// Runs a validator before the operations in its mask.
#[derive(Clone)]
pub struct ValidationRule {
    applies_when: OperationTypes,
    validator: Arc<dyn Validator>,
}

impl ValidationRule {
    /// Wraps a validator.
    pub fn new(applies_when: OperationTypes, validator: impl Validator + 'static) -> Self {
        Self {
            applies_when,
            validator: Arc::new(validator),
        }
    }

    /// Validates `T` records with a closure.
    pub fn for_record<T, F>(applies_when: OperationTypes, check: F) -> Self
    where
        T: 'static,
        F: Fn(&T) -> Result<(), String> + Send + Sync + 'static,
    {
        Self::new(applies_when, RecordValidator::new(check))
    }

    /// Returns the operations the rule applies to.
    #[must_use]
    pub const fn applies_when(&self) -> OperationTypes {
        self.applies_when
    }

    /// Runs the validator.
    ///
    /// # Errors
    ///
    /// Returns the validator's message.
    pub fn check(&self, argument: &dyn ArgumentView, operation: OperationTypes) -> Result<(), String> {
        self.validator.validate(argument, operation)
    }
}

impl fmt::Debug for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationRule")
            .field("applies_when", &self.applies_when)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    struct MapView(BTreeMap<String, SqlValue>);

    impl ArgumentView for MapView {
        fn value(&self, name: &str) -> Option<SqlValue> {
            self.0.get(name).cloned()
        }

        fn record(&self) -> Option<&dyn Any> {
            None
        }
    }

    #[test]
    fn test_required_fields() {
        let validator = RequiredFieldsValidator::new(&["FullName"]);
        let mut map = BTreeMap::new();
        assert!(validator.validate(&MapView(map.clone()), OperationTypes::INSERT).is_err());

        map.insert("FullName".to_string(), SqlValue::Text("  ".into()));
        assert!(validator.validate(&MapView(map.clone()), OperationTypes::INSERT).is_err());

        map.insert("FullName".to_string(), SqlValue::Text("Ada".into()));
        assert!(validator.validate(&MapView(map), OperationTypes::INSERT).is_ok());
    }

    #[test]
    fn test_record_validator_ignores_other_arguments() {
        let rule = ValidationRule::for_record::<String, _>(OperationTypes::INSERT, |_| {
            Err("never".to_string())
        });
        assert!(rule
            .check(&MapView(BTreeMap::new()), OperationTypes::INSERT)
            .is_ok());
    }
}
