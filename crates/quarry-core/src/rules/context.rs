//! Ambient context read by audit rules: the current user and the clock.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, Utc};

use super::AuditRuleCollection;
use crate::descriptor::RecordAccess;
use crate::value::SqlValue;

/// The ambient "current user" consulted by user-data rules and restriction
/// predicates.
pub trait CurrentUser: Send + Sync + 'static {
    /// Reads a named field of the user, case-insensitively.
    fn field(&self, name: &str) -> Option<SqlValue>;

    /// Returns the user as `Any` so predicates can downcast to a concrete type.
    fn as_any(&self) -> &dyn Any;
}

impl CurrentUser for BTreeMap<String, SqlValue> {
    fn field(&self, name: &str) -> Option<SqlValue> {
        self.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Adapts any record value into a current user.
///
/// Fields are looked up by property path first, then by mapped column.
pub struct RecordUser<T>(pub T);

impl<T: RecordAccess + 'static> CurrentUser for RecordUser<T> {
    fn field(&self, name: &str) -> Option<SqlValue> {
        let descriptor = self.0.record_descriptor();
        let (index, _) = descriptor
            .find_by_path(name)
            .or_else(|| descriptor.find_by_column(name))?;
        self.0.read(index)
    }

    fn as_any(&self) -> &dyn Any {
        self.0.as_any()
    }
}

/// Source of the current time for date/time rules.
pub trait Clock: Send + Sync {
    /// Current UTC time.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Current local time with its offset.
    fn now_local(&self) -> DateTime<FixedOffset>;
}

/// Reads the system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn now_local(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    instant: DateTime<FixedOffset>,
}

impl FixedClock {
    /// Freezes the clock at `instant`; its offset is the "local" offset.
    #[must_use]
    pub const fn new(instant: DateTime<FixedOffset>) -> Self {
        Self { instant }
    }

    /// Freezes the clock at a UTC wall-clock time.
    #[must_use]
    pub fn at_utc(naive: NaiveDateTime) -> Self {
        Self {
            instant: naive.and_utc().fixed_offset(),
        }
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.instant.with_timezone(&Utc)
    }

    fn now_local(&self) -> DateTime<FixedOffset> {
        self.instant
    }
}

/// Immutable per-call rule context: the rule set, the current user, and the
/// clock.
///
/// Contexts are cheap to clone and are threaded explicitly through command
/// construction instead of living in global state.
#[derive(Clone)]
pub struct RuleContext {
    rules: AuditRuleCollection,
    user: Option<Arc<dyn CurrentUser>>,
    clock: Arc<dyn Clock>,
}

impl RuleContext {
    /// Creates a context without a current user, reading the system clock.
    #[must_use]
    pub fn new(rules: AuditRuleCollection) -> Self {
        Self {
            rules,
            user: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Returns a copy with the given current user attached.
    #[must_use]
    pub fn with_user(&self, user: Arc<dyn CurrentUser>) -> Self {
        Self {
            user: Some(user),
            ..self.clone()
        }
    }

    /// Returns a copy with additional rules (copy-on-write).
    #[must_use]
    pub fn with_rules(&self, extra: impl IntoIterator<Item = super::AuditRule>) -> Self {
        Self {
            rules: AuditRuleCollection::with_rules(&self.rules, extra),
            ..self.clone()
        }
    }

    /// Returns a copy reading the given clock.
    #[must_use]
    pub fn with_clock(&self, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            ..self.clone()
        }
    }

    /// Returns the rule set.
    #[must_use]
    pub const fn rules(&self) -> &AuditRuleCollection {
        &self.rules
    }

    /// Returns the current user, if attached.
    #[must_use]
    pub fn user(&self) -> Option<&dyn CurrentUser> {
        self.user.as_deref()
    }

    /// Returns the clock.
    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }
}

impl Default for RuleContext {
    fn default() -> Self {
        Self::new(AuditRuleCollection::default())
    }
}

impl fmt::Debug for RuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleContext")
            .field("rules", &self.rules.len())
            .field("has_user", &self.user.is_some())
            .finish_non_exhaustive()
    }
}
