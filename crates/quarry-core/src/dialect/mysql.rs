//! MySQL dialect.
//!
//! MySQL writes cannot project rows, so requested output is read by a
//! second statement in the same batch: a `SELECT` after inserts and
//! after-image updates, and before deletes and before-image updates.

use super::{target_condition, Dialect, RowImage, RowTarget};
use crate::builder::{InsertOptions, ParameterList, SqlBuilder, UpsertOptions};
use crate::error::{Error, Result};
use crate::rules::OperationTypes;

/// MySQL dialect: backtick quoting, positional `?` parameters.
#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlDialect;

impl MySqlDialect {
    /// Creates a new MySQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Condition locating a freshly written row; unset identity keys resolve
/// through `LAST_INSERT_ID()`.
fn written_row(builder: &SqlBuilder<'_>, params: &mut ParameterList) -> Result<String> {
    let keys = builder.key_columns();
    if keys.is_empty() {
        return Err(Error::Unsupported(format!(
            "cannot read back rows written to '{}' without a primary key",
            builder.table().name()
        )));
    }
    let mut terms = Vec::with_capacity(keys.len());
    for key in keys {
        let name = builder.column_name(key);
        match key.value.value() {
            Some(value) if !value.is_null() => {
                let placeholder = params.bind(
                    &key.column.property_name,
                    value.clone(),
                    key.parameter_type(),
                );
                terms.push(format!("{name} = {placeholder}"));
            }
            _ if key.column.identity => terms.push(format!("{name} = LAST_INSERT_ID()")),
            _ => {
                return Err(Error::MissingPrimaryKey {
                    object: builder.table().name().to_string(),
                    detail: format!("no value for key column '{}'", key.column.sql_name),
                })
            }
        }
    }
    Ok(terms.join(" AND "))
}

fn read_back(builder: &SqlBuilder<'_>, condition: Option<&str>) -> String {
    let mut sql = format!(
        "SELECT {} FROM {}",
        builder.output_list(None),
        builder.table_name()
    );
    if let Some(condition) = condition {
        sql.push_str(&format!(" WHERE {condition}"));
    }
    sql
}

fn with_where(mut sql: String, condition: Option<&str>) -> String {
    if let Some(condition) = condition {
        sql.push_str(&format!(" WHERE {condition}"));
    }
    sql
}

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn identifier_quote(&self) -> char {
        '`'
    }

    fn supports_upsert(&self) -> bool {
        true
    }

    fn insert(
        &self,
        builder: &SqlBuilder<'_>,
        params: &mut ParameterList,
        options: &InsertOptions,
    ) -> Result<String> {
        let columns = builder.insert_columns(options.identity_insert);
        let mut sql = if columns.is_empty() {
            format!("INSERT INTO {} () VALUES ()", builder.table_name())
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                builder.table_name(),
                builder.column_list(&columns),
                builder.values_list(&columns, params)
            )
        };
        if builder.has_output() {
            let condition = written_row(builder, params)?;
            sql.push_str("; ");
            sql.push_str(&read_back(builder, Some(&condition)));
        }
        Ok(sql)
    }

    fn update(
        &self,
        builder: &SqlBuilder<'_>,
        params: &mut ParameterList,
        target: RowTarget,
        image: RowImage,
    ) -> Result<String> {
        if builder.update_columns().is_empty() {
            return Err(Error::InvalidArgument(format!(
                "nothing to update on '{}'",
                builder.table().name()
            )));
        }
        if !builder.has_output() {
            let update = format!("UPDATE {} SET {}", builder.table_name(), builder.set_list(params));
            let condition = target_condition(builder, params, target, OperationTypes::UPDATE)?;
            return Ok(with_where(update, condition.as_deref()));
        }
        match (target, image) {
            (RowTarget::Criteria, RowImage::After) => Err(Error::Unsupported(
                "the mysql dialect cannot return updated rows located by criteria".to_string(),
            )),
            (_, RowImage::Before) => {
                let condition = target_condition(builder, params, target, OperationTypes::UPDATE)?;
                let select = read_back(builder, condition.as_deref());
                let update = format!("UPDATE {} SET {}", builder.table_name(), builder.set_list(params));
                let condition = target_condition(builder, params, target, OperationTypes::UPDATE)?;
                Ok(format!("{select}; {}", with_where(update, condition.as_deref())))
            }
            (RowTarget::Key, RowImage::After) => {
                let update = format!("UPDATE {} SET {}", builder.table_name(), builder.set_list(params));
                let condition = builder.key_condition(params, None)?;
                let update = with_where(update, Some(&condition));
                let condition = builder.key_condition(params, None)?;
                Ok(format!("{update}; {}", read_back(builder, Some(&condition))))
            }
        }
    }

    fn delete(
        &self,
        builder: &SqlBuilder<'_>,
        params: &mut ParameterList,
        target: RowTarget,
    ) -> Result<String> {
        let delete = format!("DELETE FROM {}", builder.table_name());
        if !builder.has_output() {
            let condition = target_condition(builder, params, target, OperationTypes::DELETE)?;
            return Ok(with_where(delete, condition.as_deref()));
        }
        let condition = target_condition(builder, params, target, OperationTypes::DELETE)?;
        let select = read_back(builder, condition.as_deref());
        let condition = target_condition(builder, params, target, OperationTypes::DELETE)?;
        Ok(format!("{select}; {}", with_where(delete, condition.as_deref())))
    }

    fn upsert(
        &self,
        builder: &SqlBuilder<'_>,
        params: &mut ParameterList,
        options: &UpsertOptions,
    ) -> Result<String> {
        builder.check_upsert_key()?;
        let columns = builder.upsert_insert_columns(options.identity_insert);
        // positional markers: the VALUES row binds before the update half
        let values = builder.values_list(&columns, params);
        let mut updates = builder.upsert_set_list(&columns, params, |name| format!("VALUES({name})"));
        if updates.is_empty() {
            // a no-op assignment keeps duplicate rows untouched
            let keys = builder.key_columns();
            if let Some(key) = keys.first() {
                let name = builder.column_name(key);
                updates.push(format!("{name} = {name}"));
            }
        }
        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON DUPLICATE KEY UPDATE {}",
            builder.table_name(),
            builder.column_list(&columns),
            values,
            updates.join(", ")
        );
        if builder.has_output() {
            let condition = written_row(builder, params)?;
            sql.push_str("; ");
            sql.push_str(&read_back(builder, Some(&condition)));
        }
        Ok(sql)
    }

    fn paging_clause(
        &self,
        limit: Option<u64>,
        offset: Option<u64>,
        _ordered: bool,
        _params: &mut ParameterList,
    ) -> Result<String> {
        Ok(match (limit, offset) {
            (None, None) => String::new(),
            (Some(limit), None) => format!(" LIMIT {limit}"),
            (Some(limit), Some(offset)) => format!(" LIMIT {limit} OFFSET {offset}"),
            (None, Some(offset)) => format!(" LIMIT {} OFFSET {offset}", u64::MAX),
        })
    }
}
