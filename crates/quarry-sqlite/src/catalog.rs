//! Reads table and view metadata from the SQLite schema.

use futures::future::BoxFuture;
use quarry_core::dialect::Dialect;
use quarry_core::metadata::{
    Catalog, CatalogCapabilities, ColumnMetadata, ObjectName, TableOrViewMetadata,
};
use quarry_core::{Error, Result, SqlType};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tracing::debug;

use crate::SqliteDialect;

/// Columns of a table or view, including generated columns.
const TABLE_XINFO_SQL: &str = r#"
SELECT name, type, "notnull", pk, hidden
FROM pragma_table_xinfo(?1, ?2)
ORDER BY cid
"#;

/// Catalog backed by `sqlite_master` and `pragma_table_xinfo`.
///
/// SQLite has neither stored procedures nor user-defined table-valued
/// functions, so both lookups report not found.
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    /// Creates a catalog over `pool`.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load(&self, name: &ObjectName) -> Result<Option<TableOrViewMetadata>> {
        let schema = name.schema.as_deref().unwrap_or("main");
        let master = format!(
            "SELECT type, name FROM {}.sqlite_master \
             WHERE type IN ('table', 'view') AND name = ?1 COLLATE NOCASE",
            SqliteDialect::new().quote_identifier(schema)
        );
        let Some(found) = sqlx::query(&master)
            .bind(&name.name)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::provider)?
        else {
            debug!(object = %name, "SQLite object not found");
            return Ok(None);
        };
        let kind: String = found.try_get("type").map_err(Error::provider)?;
        let actual: String = found.try_get("name").map_err(Error::provider)?;

        let rows = sqlx::query(TABLE_XINFO_SQL)
            .bind(&actual)
            .bind(schema)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::provider)?;

        let mut described = Vec::with_capacity(rows.len());
        for row in &rows {
            let hidden: i64 = row.try_get("hidden").map_err(Error::provider)?;
            if hidden == 1 {
                // hidden columns of virtual tables
                continue;
            }
            described.push(DescribedColumn {
                name: row.try_get("name").map_err(Error::provider)?,
                declared: row.try_get("type").map_err(Error::provider)?,
                not_null: row.try_get::<i64, _>("notnull").map_err(Error::provider)? != 0,
                primary_key: row.try_get::<i64, _>("pk").map_err(Error::provider)? > 0,
                generated: hidden >= 2,
            });
        }

        let key_count = described.iter().filter(|c| c.primary_key).count();
        let columns = described
            .into_iter()
            .map(|c| c.into_metadata(key_count == 1))
            .collect();
        let object = ObjectName {
            schema: name.schema.clone(),
            name: actual,
        };
        debug!(object = %object, kind = %kind, "Loaded SQLite metadata");
        TableOrViewMetadata::new(object, kind == "table", columns).map(Some)
    }

    async fn load_all(&self) -> Result<Vec<TableOrViewMetadata>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::provider)?;

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            if let Some(table) = self.load(&ObjectName::new(name)).await? {
                tables.push(table);
            }
        }
        Ok(tables)
    }
}

struct DescribedColumn {
    name: String,
    declared: String,
    not_null: bool,
    primary_key: bool,
    generated: bool,
}

impl DescribedColumn {
    fn into_metadata(self, single_key: bool) -> ColumnMetadata {
        // a lone INTEGER PRIMARY KEY aliases the rowid
        let rowid = single_key && self.primary_key && self.declared.eq_ignore_ascii_case("INTEGER");
        let mut column = ColumnMetadata::new(self.name, SqlType::from_declared(&self.declared));
        column.nullable = !self.not_null && !rowid;
        if self.primary_key {
            column = column.primary_key();
        }
        if rowid {
            column = column.identity();
        }
        if self.generated {
            column = column.computed();
        }
        column
    }
}

impl Catalog for SqliteCatalog {
    fn capabilities(&self) -> CatalogCapabilities {
        CatalogCapabilities {
            stored_procedures: false,
            table_functions: false,
        }
    }

    fn table_or_view<'a>(
        &'a self,
        name: &'a ObjectName,
    ) -> BoxFuture<'a, Result<Option<TableOrViewMetadata>>> {
        Box::pin(self.load(name))
    }

    fn all_tables_and_views(&self) -> BoxFuture<'_, Result<Vec<TableOrViewMetadata>>> {
        Box::pin(self.load_all())
    }
}
