//! Per-call column classification and clause primitives.
//!
//! A [`SqlBuilder`] is created for one command, loaded with the caller's
//! arguments and the audit rules of the operation, and then asked for the
//! clause fragments a dialect assembles into the final statement. Column
//! classification happens once here; dialects only read the buckets.

use tracing::debug;

use super::{ArgumentSource, DesiredColumns, FilterNullHandling, ParameterList};
use crate::descriptor::TypeDescriptor;
use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::metadata::{ColumnMetadata, TableOrViewMetadata};
use crate::rules::{ColumnRule, OperationTypes, RuleContext};
use crate::value::{SqlType, SqlValue};

/// The value of one column, tagged with where it came from.
///
/// A rule-generated value always wins over a caller-supplied one, whichever
/// arrives first.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum EntryValue {
    /// Nothing supplied; the column is omitted.
    #[default]
    Unset,
    /// Supplied by the argument source.
    CallerSupplied(SqlValue),
    /// Generated by an audit rule.
    RuleGenerated(SqlValue),
}

impl EntryValue {
    /// Returns whether a value is present.
    #[must_use]
    pub const fn is_set(&self) -> bool {
        !matches!(self, Self::Unset)
    }

    /// Returns the effective value.
    #[must_use]
    pub const fn value(&self) -> Option<&SqlValue> {
        match self {
            Self::Unset => None,
            Self::CallerSupplied(v) | Self::RuleGenerated(v) => Some(v),
        }
    }

    /// Returns the caller's value, if the caller's value is in effect.
    #[must_use]
    pub const fn caller_value(&self) -> Option<&SqlValue> {
        match self {
            Self::CallerSupplied(v) => Some(v),
            _ => None,
        }
    }

    /// Records a caller value. A rule-generated value is kept.
    #[must_use]
    pub fn supply(self, value: SqlValue) -> Self {
        match self {
            Self::RuleGenerated(_) => self,
            _ => Self::CallerSupplied(value),
        }
    }

    /// Records a rule-generated value, overriding any caller value.
    #[must_use]
    pub fn generate(self, value: SqlValue) -> Self {
        Self::RuleGenerated(value)
    }
}

/// Working state of one column.
#[derive(Debug, Clone)]
pub struct SqlBuilderEntry {
    /// Column metadata.
    pub column: ColumnMetadata,
    /// Current value.
    pub value: EntryValue,
    /// Part of the key used to locate the row.
    pub is_key: bool,
    /// May be written by inserts.
    pub use_for_insert: bool,
    /// May be written by updates.
    pub use_for_update: bool,
    /// Projected back by the command.
    pub use_for_output: bool,
}

impl SqlBuilderEntry {
    fn new(column: &ColumnMetadata) -> Self {
        let generated = column.is_generated();
        Self {
            column: column.clone(),
            value: EntryValue::Unset,
            is_key: column.primary_key,
            use_for_insert: !generated,
            use_for_update: !generated && !column.primary_key,
            use_for_output: false,
        }
    }

    /// Type parameters bound for this column are sent as.
    #[must_use]
    pub fn parameter_type(&self) -> SqlType {
        match (self.column.sql_type, self.value.value()) {
            (SqlType::Unknown, Some(value)) => value.sql_type(),
            (declared, _) => declared,
        }
    }

    fn bind(&self, params: &mut ParameterList) -> String {
        let value = self.value.value().cloned().unwrap_or(SqlValue::Null);
        params.bind(&self.column.property_name, value, self.parameter_type())
    }
}

/// Per-call SQL builder over one table or view.
pub struct SqlBuilder<'a> {
    dialect: &'a dyn Dialect,
    table: &'a TableOrViewMetadata,
    entries: Vec<SqlBuilderEntry>,
    criteria: Option<&'a ArgumentSource<'a>>,
}

impl<'a> SqlBuilder<'a> {
    /// Creates a builder with every column classified but unset.
    #[must_use]
    pub fn new(dialect: &'a dyn Dialect, table: &'a TableOrViewMetadata) -> Self {
        Self {
            dialect,
            table,
            entries: table.columns().iter().map(SqlBuilderEntry::new).collect(),
            criteria: None,
        }
    }

    /// Returns the dialect.
    #[must_use]
    pub fn dialect(&self) -> &'a dyn Dialect {
        self.dialect
    }

    /// Returns the table metadata.
    #[must_use]
    pub const fn table(&self) -> &'a TableOrViewMetadata {
        self.table
    }

    /// Returns every entry in column order.
    #[must_use]
    pub fn entries(&self) -> &[SqlBuilderEntry] {
        &self.entries
    }

    /// Returns the entry for a column, by SQL or mapped name.
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<&SqlBuilderEntry> {
        self.entries.iter().find(|e| e.column.is_named(name))
    }

    fn entry_mut(&mut self, name: &str) -> Option<&mut SqlBuilderEntry> {
        self.entries.iter_mut().find(|e| e.column.is_named(name))
    }

    /// Loads caller values from a record or map.
    ///
    /// Columns the source does not mention stay unset. Record properties
    /// flagged `ignore_on_insert`/`ignore_on_update` leave their buckets.
    ///
    /// # Errors
    ///
    /// A map key matching no column is a mapping error. With `strict`, so is
    /// a record property matching no column.
    pub fn apply_argument(&mut self, source: &ArgumentSource<'_>, strict: bool) -> Result<()> {
        let unmapped = source.unmapped_names(self.table);
        let reject = match source {
            ArgumentSource::Record(_) => strict,
            _ => true,
        };
        if reject {
            if let Some(name) = unmapped.first() {
                return Err(Error::Mapping(format!(
                    "'{name}' on {} does not match any column of '{}'",
                    source.type_name(),
                    self.table.name()
                )));
            }
        } else if !unmapped.is_empty() {
            debug!(object = %self.table.name(), ?unmapped, "ignoring unmapped properties");
        }

        for entry in &mut self.entries {
            if let Some(value) = source.value_for(&entry.column) {
                entry.value = std::mem::take(&mut entry.value).supply(value);
            }
        }

        if let ArgumentSource::Record(record) = source {
            for property in record.record_descriptor().properties() {
                if let Some(entry) = self.entry_mut(&property.column) {
                    entry.use_for_insert &= !property.ignore_on_insert;
                    entry.use_for_update &= !property.ignore_on_update;
                }
            }
        }
        Ok(())
    }

    /// Applies the column rules active for `operation`.
    ///
    /// For an upsert, a column whose rules only cover one half is removed
    /// from the other half's bucket, so an insert-only stamp never rewrites
    /// an existing row and an update-only stamp never lands in a new one.
    ///
    /// # Errors
    ///
    /// Propagates rule failures, e.g. a user-data rule without a current user.
    pub fn apply_rules(&mut self, context: &RuleContext, operation: OperationTypes) -> Result<()> {
        for entry in &mut self.entries {
            if entry.column.is_generated() {
                continue;
            }
            let rules = context.rules().get_rules_for_column(
                &entry.column.sql_name,
                &entry.column.property_name,
                operation,
            );
            let mut matched = OperationTypes::NONE;
            for rule in rules {
                let generated = rule.generate_value(context, entry.value.caller_value())?;
                entry.value = std::mem::take(&mut entry.value).generate(generated);
                matched |= rule.applies_when();
            }
            if operation == OperationTypes::INSERT_OR_UPDATE && !matched.is_empty() {
                entry.use_for_insert &= matched.intersects(OperationTypes::INSERT);
                entry.use_for_update &= matched.intersects(OperationTypes::UPDATE);
            }
        }
        Ok(())
    }

    /// Replaces the table's primary key with the record's declared keys.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingPrimaryKey`] when the record declares none.
    pub fn use_key_attribute(&mut self, descriptor: &TypeDescriptor) -> Result<()> {
        let keys: Vec<&str> = descriptor
            .properties()
            .iter()
            .filter(|p| p.key)
            .map(|p| p.column.as_str())
            .collect();
        if keys.is_empty() {
            return Err(Error::MissingPrimaryKey {
                object: self.table.name().to_string(),
                detail: format!("{} declares no key properties", descriptor.type_name()),
            });
        }
        for entry in &mut self.entries {
            let now_key = keys.iter().any(|k| entry.column.is_named(k));
            if entry.is_key && !now_key {
                entry.use_for_update = !entry.column.is_generated();
            }
            entry.is_key = now_key;
            if now_key {
                entry.use_for_update = false;
            }
        }
        Ok(())
    }

    /// Drops caller values, keeping keys and rule-generated values.
    pub fn retain_generated_values(&mut self) {
        for entry in &mut self.entries {
            if !entry.is_key && entry.value.caller_value().is_some() {
                entry.value = EntryValue::Unset;
            }
        }
    }

    /// Attaches filter or where-text criteria.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] when a where-text parameter shares its name
    /// with a caller-supplied column value, and [`Error::Mapping`] when a
    /// filter map names an unknown column. With `strict`, so does a filter
    /// record property matching no column.
    pub fn set_criteria(&mut self, criteria: &'a ArgumentSource<'a>, strict: bool) -> Result<()> {
        match criteria {
            ArgumentSource::WhereText(_, parameters) => {
                for (name, _) in parameters.named_values() {
                    let clash = self
                        .entries
                        .iter()
                        .any(|e| e.value.caller_value().is_some() && e.column.is_named(&name));
                    if clash {
                        return Err(Error::Conflict(name));
                    }
                }
            }
            ArgumentSource::Filter(values, _) => {
                let reject = match values.as_ref() {
                    ArgumentSource::Record(_) => strict,
                    _ => true,
                };
                let unmapped = values.unmapped_names(self.table);
                if reject {
                    if let Some(name) = unmapped.first() {
                        return Err(Error::Mapping(format!(
                            "filter field '{name}' on {} does not match any column of '{}'",
                            values.type_name(),
                            self.table.name()
                        )));
                    }
                } else if !unmapped.is_empty() {
                    debug!(object = %self.table.name(), ?unmapped, "ignoring unmapped filter properties");
                }
            }
            ArgumentSource::Record(_) | ArgumentSource::Map(_) => {
                return Err(Error::InvalidArgument(
                    "criteria must be a filter or where text".to_string(),
                ));
            }
        }
        self.criteria = Some(criteria);
        Ok(())
    }

    /// Marks the projected columns.
    ///
    /// Restricted columns are silently left out of implicit projections; an
    /// explicitly requested restricted column is an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Mapping`] for unknown explicit columns or a record type
    /// sharing no column with the table, and [`Error::RestrictedColumn`] for
    /// explicitly requested restricted columns.
    pub fn apply_desired_columns(
        &mut self,
        desired: &DesiredColumns,
        context: &RuleContext,
    ) -> Result<()> {
        for entry in &mut self.entries {
            entry.use_for_output = false;
        }
        match desired {
            DesiredColumns::NoColumns => return Ok(()),
            DesiredColumns::All => self.mark_output(context, |_| true),
            DesiredColumns::AutoSelect => {
                let has_key = self.entries.iter().any(|e| e.is_key);
                self.mark_output(context, |e| !has_key || e.is_key);
            }
            DesiredColumns::Type(descriptor) => {
                self.mark_output(context, |e| {
                    descriptor.find_by_column(&e.column.sql_name).is_some()
                        || descriptor.find_by_column(&e.column.property_name).is_some()
                });
                if !self.has_output() {
                    return Err(Error::Mapping(format!(
                        "{} maps none of the readable columns of '{}'",
                        descriptor.type_name(),
                        self.table.name()
                    )));
                }
            }
            DesiredColumns::Explicit(names) => {
                for name in names {
                    let Some(entry) = self.entries.iter().find(|e| e.column.is_named(name)) else {
                        return Err(Error::Mapping(format!(
                            "requested column '{name}' does not exist on '{}'",
                            self.table.name()
                        )));
                    };
                    if self.is_restricted(entry, context, OperationTypes::SELECT) {
                        return Err(self.restricted(entry));
                    }
                    let sql_name = entry.column.sql_name.clone();
                    if let Some(entry) = self.entry_mut(&sql_name) {
                        entry.use_for_output = true;
                    }
                }
            }
        }
        Ok(())
    }

    fn mark_output(&mut self, context: &RuleContext, include: impl Fn(&SqlBuilderEntry) -> bool) {
        let selected: Vec<bool> = self
            .entries
            .iter()
            .map(|e| include(e) && !self.is_restricted(e, context, OperationTypes::SELECT))
            .collect();
        for (entry, selected) in self.entries.iter_mut().zip(selected) {
            entry.use_for_output = selected;
        }
    }

    fn is_restricted(
        &self,
        entry: &SqlBuilderEntry,
        context: &RuleContext,
        operation: OperationTypes,
    ) -> bool {
        context
            .rules()
            .get_restrictions_for_column(
                self.table.name(),
                &entry.column.sql_name,
                &entry.column.property_name,
            )
            .into_iter()
            .any(|r| r.applies_when().intersects(operation) && !r.is_allowed(context.user()))
    }

    fn restricted(&self, entry: &SqlBuilderEntry) -> Error {
        Error::RestrictedColumn {
            object: self.table.name().to_string(),
            column: entry.column.sql_name.clone(),
        }
    }

    /// Fails if any column `operation` would write is restricted for the
    /// current user.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RestrictedColumn`] naming the first blocked column.
    pub fn check_restrictions(
        &self,
        context: &RuleContext,
        operation: OperationTypes,
        identity_insert: bool,
    ) -> Result<()> {
        let mut written: Vec<&SqlBuilderEntry> = Vec::new();
        if operation.intersects(OperationTypes::INSERT) {
            written.extend(self.insert_columns(identity_insert));
        }
        if operation.intersects(OperationTypes::UPDATE | OperationTypes::DELETE) {
            written.extend(self.update_columns());
        }
        match written
            .into_iter()
            .find(|e| self.is_restricted(e, context, operation))
        {
            Some(entry) => Err(self.restricted(entry)),
            None => Ok(()),
        }
    }

    /// Key entries, in column order.
    #[must_use]
    pub fn key_columns(&self) -> Vec<&SqlBuilderEntry> {
        self.entries.iter().filter(|e| e.is_key).collect()
    }

    /// Entries an update writes: set, updatable, and never a key.
    #[must_use]
    pub fn update_columns(&self) -> Vec<&SqlBuilderEntry> {
        self.entries
            .iter()
            .filter(|e| e.use_for_update && !e.is_key && e.value.is_set())
            .collect()
    }

    /// Entries an insert writes.
    #[must_use]
    pub fn insert_columns(&self, identity_insert: bool) -> Vec<&SqlBuilderEntry> {
        self.entries
            .iter()
            .filter(|e| e.value.is_set())
            .filter(|e| {
                e.use_for_insert || (identity_insert && e.column.identity && !e.column.computed)
            })
            .collect()
    }

    /// Entries the insert half of an upsert writes: the insert bucket plus any
    /// key with a value, so an existing row can be matched.
    #[must_use]
    pub fn upsert_insert_columns(&self, identity_insert: bool) -> Vec<&SqlBuilderEntry> {
        self.entries
            .iter()
            .filter(|e| e.value.is_set() && !e.column.computed)
            .filter(|e| {
                e.use_for_insert
                    || (identity_insert && e.column.identity)
                    || (e.is_key && e.value.value().is_some_and(|v| !v.is_null()))
            })
            .collect()
    }

    /// Validates the key of an upsert.
    ///
    /// Identity keys may be unset (the row is new); any other key must carry
    /// a value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingPrimaryKey`] otherwise.
    pub fn check_upsert_key(&self) -> Result<()> {
        let keys = self.key_columns();
        if keys.is_empty() {
            return Err(Error::MissingPrimaryKey {
                object: self.table.name().to_string(),
                detail: "the table has no primary key".to_string(),
            });
        }
        match keys
            .iter()
            .find(|e| !e.column.identity && e.value.value().map_or(true, SqlValue::is_null))
        {
            Some(missing) => Err(Error::MissingPrimaryKey {
                object: self.table.name().to_string(),
                detail: format!("no value for key column '{}'", missing.column.sql_name),
            }),
            None => Ok(()),
        }
    }

    /// Entries projected back.
    #[must_use]
    pub fn output_columns(&self) -> Vec<&SqlBuilderEntry> {
        self.entries.iter().filter(|e| e.use_for_output).collect()
    }

    /// Returns whether anything is projected back.
    #[must_use]
    pub fn has_output(&self) -> bool {
        self.entries.iter().any(|e| e.use_for_output)
    }

    /// Quoted table name.
    #[must_use]
    pub fn table_name(&self) -> String {
        self.dialect.quote_object(self.table.name())
    }

    /// Quoted column name.
    #[must_use]
    pub fn column_name(&self, entry: &SqlBuilderEntry) -> String {
        self.dialect.quote_identifier(&entry.column.sql_name)
    }

    /// `a, b, c` for the given entries.
    #[must_use]
    pub fn column_list(&self, entries: &[&SqlBuilderEntry]) -> String {
        entries
            .iter()
            .map(|e| self.column_name(e))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Placeholders for the given entries, binding their values.
    pub fn values_list(&self, entries: &[&SqlBuilderEntry], params: &mut ParameterList) -> String {
        entries
            .iter()
            .map(|e| e.bind(params))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `a = ?, b = ?` for the update bucket.
    pub fn set_list(&self, params: &mut ParameterList) -> String {
        self.update_columns()
            .iter()
            .map(|e| format!("{} = {}", self.column_name(e), e.bind(params)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Assignments for the update half of an upsert.
    ///
    /// Columns the insert half also writes read the proposed row through
    /// `proposed` (e.g. `EXCLUDED.a`); the rest bind their own value.
    pub fn upsert_set_list(
        &self,
        inserted: &[&SqlBuilderEntry],
        params: &mut ParameterList,
        proposed: impl Fn(&str) -> String,
    ) -> Vec<String> {
        self.update_columns()
            .iter()
            .map(|e| {
                let name = self.column_name(e);
                let in_row = inserted
                    .iter()
                    .any(|i| i.column.sql_name == e.column.sql_name);
                let value = if in_row { proposed(&name) } else { e.bind(params) };
                format!("{name} = {value}")
            })
            .collect()
    }

    /// Projected columns, optionally qualified (`Inserted.a, Inserted.b`).
    #[must_use]
    pub fn output_list(&self, qualifier: Option<&str>) -> String {
        self.output_columns()
            .iter()
            .map(|e| match qualifier {
                Some(q) => format!("{q}.{}", self.column_name(e)),
                None => self.column_name(e),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `k1 = ? AND k2 = ?` over the key, optionally qualified.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingPrimaryKey`] when the table has no key or a key
    /// value is unset or null.
    pub fn key_condition(&self, params: &mut ParameterList, qualifier: Option<&str>) -> Result<String> {
        let keys = self.key_columns();
        if keys.is_empty() {
            return Err(Error::MissingPrimaryKey {
                object: self.table.name().to_string(),
                detail: "the table has no primary key".to_string(),
            });
        }
        if let Some(missing) = keys
            .iter()
            .find(|e| e.value.value().map_or(true, SqlValue::is_null))
        {
            return Err(Error::MissingPrimaryKey {
                object: self.table.name().to_string(),
                detail: format!("no value for key column '{}'", missing.column.sql_name),
            });
        }
        Ok(keys
            .iter()
            .map(|e| {
                let name = self.column_name(e);
                let name = qualifier.map_or_else(|| name.clone(), |q| format!("{q}.{name}"));
                format!("{name} = {}", e.bind(params))
            })
            .collect::<Vec<_>>()
            .join(" AND "))
    }

    /// Condition from the attached filter or where text, if any.
    ///
    /// # Errors
    ///
    /// Propagates marker rewriting failures. A write whose filter yields no
    /// condition fails unless the filter allows it.
    pub fn criteria_condition(
        &self,
        params: &mut ParameterList,
        operation: OperationTypes,
    ) -> Result<Option<String>> {
        let Some(criteria) = self.criteria else {
            return Ok(None);
        };
        match criteria {
            ArgumentSource::WhereText(text, parameters) => {
                let text = text.trim();
                if text.is_empty() {
                    return Ok(None);
                }
                let rewritten = super::params::rewrite_markers(
                    text,
                    &parameters.named_values(),
                    params,
                )?;
                Ok(Some(rewritten))
            }
            ArgumentSource::Filter(values, options) => {
                let mut terms = Vec::new();
                for entry in &self.entries {
                    let Some(value) = values.value_for(&entry.column) else {
                        continue;
                    };
                    let name = self.column_name(entry);
                    if value.is_null() {
                        if options.null_handling == FilterNullHandling::IsNull {
                            terms.push(format!("{name} IS NULL"));
                        }
                        continue;
                    }
                    let sql_type = match entry.column.sql_type {
                        SqlType::Unknown => value.sql_type(),
                        declared => declared,
                    };
                    let placeholder = params.bind(&entry.column.property_name, value, sql_type);
                    terms.push(format!("{name} = {placeholder}"));
                }
                if terms.is_empty() {
                    let write = !operation.contains(OperationTypes::SELECT);
                    if write && !options.allow_unconditional {
                        return Err(Error::InvalidArgument(format!(
                            "filter on '{}' yields no condition; refusing an unconditional write",
                            self.table.name()
                        )));
                    }
                    return Ok(None);
                }
                Ok(Some(terms.join(" AND ")))
            }
            ArgumentSource::Record(_) | ArgumentSource::Map(_) => Ok(None),
        }
    }

    /// Condition hiding soft-deleted rows from selects, if a rule applies.
    pub fn soft_delete_condition(&self, context: &RuleContext, params: &mut ParameterList) -> Option<String> {
        let rule = context
            .rules()
            .soft_delete_rule_for(self.table, OperationTypes::SELECT)?;
        let entry = self.entry(rule.column_name())?;
        let name = self.column_name(entry);
        let deleted = rule.deleted_value().clone();
        let placeholder = params.bind(&entry.column.property_name, deleted, entry.column.sql_type);
        Some(format!("({name} IS NULL OR {name} <> {placeholder})"))
    }
}
