//! Column restrictions.

use std::fmt;
use std::sync::Arc;

use super::{CurrentUser, OperationTypes};
use crate::metadata::ObjectName;

type ExceptionPredicate = Arc<dyn Fn(Option<&dyn CurrentUser>) -> bool + Send + Sync>;

/// Denies reading or writing a column unless the exception predicate accepts
/// the current user.
///
/// A restriction without an object name applies to the column on every table.
#[derive(Clone)]
pub struct RestrictColumn {
    object: Option<ObjectName>,
    column: String,
    applies_when: OperationTypes,
    exception: ExceptionPredicate,
}

impl RestrictColumn {
    /// Restricts `column` on every table.
    pub fn global<F>(column: impl Into<String>, applies_when: OperationTypes, exception: F) -> Self
    where
        F: Fn(Option<&dyn CurrentUser>) -> bool + Send + Sync + 'static,
    {
        Self {
            object: None,
            column: column.into(),
            applies_when,
            exception: Arc::new(exception),
        }
    }

    /// Restricts `column` on one table or view.
    pub fn on_object<F>(
        object: ObjectName,
        column: impl Into<String>,
        applies_when: OperationTypes,
        exception: F,
    ) -> Self
    where
        F: Fn(Option<&dyn CurrentUser>) -> bool + Send + Sync + 'static,
    {
        Self {
            object: Some(object),
            column: column.into(),
            applies_when,
            exception: Arc::new(exception),
        }
    }

    /// Returns the restricted column name.
    #[must_use]
    pub fn column_name(&self) -> &str {
        &self.column
    }

    /// Returns the table the restriction is scoped to, if any.
    #[must_use]
    pub const fn object(&self) -> Option<&ObjectName> {
        self.object.as_ref()
    }

    /// Returns the operations the restriction applies to.
    #[must_use]
    pub const fn applies_when(&self) -> OperationTypes {
        self.applies_when
    }

    /// Returns whether the current user is exempt from the restriction.
    #[must_use]
    pub fn is_allowed(&self, user: Option<&dyn CurrentUser>) -> bool {
        (self.exception)(user)
    }

    pub(crate) fn matches(&self, object: &ObjectName, sql_name: &str, property_name: &str) -> bool {
        let column_matches = self.column.eq_ignore_ascii_case(sql_name)
            || self.column.eq_ignore_ascii_case(property_name);
        column_matches && self.object.as_ref().map_or(true, |scoped| scoped.matches(object))
    }
}

impl fmt::Debug for RestrictColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestrictColumn")
            .field("object", &self.object)
            .field("column", &self.column)
            .field("applies_when", &self.applies_when)
            .finish_non_exhaustive()
    }
}
