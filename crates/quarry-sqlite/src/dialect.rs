//! SQLite dialect implementation.

use quarry_core::builder::{ParameterList, SqlBuilder, UpsertOptions};
use quarry_core::dialect::{Dialect, OutputStyle, ParameterStyle};
use quarry_core::Result;

/// SQLite dialect: `?n` parameters, `RETURNING`, `ON CONFLICT` upsert and no
/// stored procedures.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn identifier_quote(&self) -> char {
        '"' // SQLite also accepts backticks, but double quotes are standard
    }

    fn parameter_style(&self) -> ParameterStyle {
        ParameterStyle::Numbered("?")
    }

    fn output_style(&self) -> OutputStyle {
        OutputStyle::Returning // SQLite 3.35.0+
    }

    fn supports_upsert(&self) -> bool {
        true // SQLite 3.24.0+
    }

    fn supports_stored_procedures(&self) -> bool {
        false
    }

    fn upsert(
        &self,
        builder: &SqlBuilder<'_>,
        params: &mut ParameterList,
        options: &UpsertOptions,
    ) -> Result<String> {
        builder.check_upsert_key()?;
        let columns = builder.upsert_insert_columns(options.identity_insert);
        let keys = builder.key_columns();
        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({})",
            builder.table_name(),
            builder.column_list(&columns),
            builder.values_list(&columns, params),
            builder.column_list(&keys)
        );
        let updates = builder.upsert_set_list(&columns, params, |name| format!("excluded.{name}"));
        if updates.is_empty() {
            sql.push_str(" DO NOTHING");
        } else {
            sql.push_str(&format!(" DO UPDATE SET {}", updates.join(", ")));
        }
        if builder.has_output() {
            sql.push_str(&format!(" RETURNING {}", builder.output_list(None)));
        }
        Ok(sql)
    }

    // OFFSET is only valid after a LIMIT; -1 means no limit.
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
            (None, Some(offset)) => format!(" LIMIT -1 OFFSET {offset}"),
        })
    }
}
