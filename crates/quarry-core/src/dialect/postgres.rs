//! PostgreSQL dialect.

use super::{Dialect, OutputStyle, ParameterStyle};
use crate::builder::{ParameterList, SqlBuilder, UpsertOptions};
use crate::error::Result;

/// PostgreSQL dialect: `$n` parameters, `RETURNING`, `ON CONFLICT` upsert.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Creates a new PostgreSQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn parameter_style(&self) -> ParameterStyle {
        ParameterStyle::Numbered("$")
    }

    fn output_style(&self) -> OutputStyle {
        OutputStyle::Returning
    }

    fn supports_upsert(&self) -> bool {
        true
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
        let updates = builder.upsert_set_list(&columns, params, |name| format!("EXCLUDED.{name}"));
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
}
