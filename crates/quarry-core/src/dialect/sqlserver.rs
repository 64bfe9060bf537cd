//! SQL Server dialect.

use super::{Dialect, OutputStyle, ParameterStyle};
use crate::builder::{ParameterList, SqlBuilder, UpsertOptions};
use crate::command::CommandKind;
use crate::error::Result;
use crate::metadata::ObjectName;

/// SQL Server dialect: `@name` parameters, `[bracket]` quoting,
/// `OUTPUT Inserted/Deleted`, `MERGE` upsert, `OFFSET ... FETCH` paging.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlServerDialect;

impl SqlServerDialect {
    /// Creates a new SQL Server dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for SqlServerDialect {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn identifier_quote(&self) -> char {
        '['
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("[{}]", name.replace(']', "]]"))
    }

    fn parameter_style(&self) -> ParameterStyle {
        ParameterStyle::Named("@")
    }

    fn output_style(&self) -> OutputStyle {
        OutputStyle::OutputClause
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
        let keys = builder.key_columns();
        let inserts = builder.insert_columns(options.identity_insert);
        let updates = builder.update_columns();

        // the source row carries the keys plus every value being written
        let mut source = keys.clone();
        for entry in inserts.iter().chain(updates.iter()) {
            if !source.iter().any(|s| s.column.sql_name == entry.column.sql_name) {
                source.push(entry);
            }
        }

        let mut sql = format!(
            "MERGE INTO {} AS target USING (VALUES ({})) AS source ({}) ON {}",
            builder.table_name(),
            builder.values_list(&source, params),
            builder.column_list(&source),
            keys.iter()
                .map(|k| {
                    let name = builder.column_name(k);
                    format!("target.{name} = source.{name}")
                })
                .collect::<Vec<_>>()
                .join(" AND ")
        );
        if !updates.is_empty() {
            let set: Vec<String> = updates
                .iter()
                .map(|e| {
                    let name = builder.column_name(e);
                    format!("target.{name} = source.{name}")
                })
                .collect();
            sql.push_str(&format!(" WHEN MATCHED THEN UPDATE SET {}", set.join(", ")));
        }
        let values: Vec<String> = inserts
            .iter()
            .map(|e| format!("source.{}", builder.column_name(e)))
            .collect();
        sql.push_str(&format!(
            " WHEN NOT MATCHED THEN INSERT ({}) VALUES ({})",
            builder.column_list(&inserts),
            values.join(", ")
        ));
        if builder.has_output() {
            sql.push_str(&format!(" OUTPUT {}", builder.output_list(Some("Inserted"))));
        }
        sql.push(';');
        Ok(sql)
    }

    fn paging_clause(
        &self,
        limit: Option<u64>,
        offset: Option<u64>,
        ordered: bool,
        _params: &mut ParameterList,
    ) -> Result<String> {
        if limit.is_none() && offset.is_none() {
            return Ok(String::new());
        }
        // OFFSET/FETCH is only valid after ORDER BY
        let mut sql = if ordered {
            String::new()
        } else {
            " ORDER BY (SELECT NULL)".to_string()
        };
        sql.push_str(&format!(" OFFSET {} ROWS", offset.unwrap_or(0)));
        if let Some(limit) = limit {
            sql.push_str(&format!(" FETCH NEXT {limit} ROWS ONLY"));
        }
        Ok(sql)
    }

    fn procedure_call(&self, name: &ObjectName, _arguments: &[String]) -> (String, CommandKind) {
        (self.quote_object(name), CommandKind::StoredProcedure)
    }
}
