//! The catalog collaborator.
//!
//! Provider crates (quarry-sqlite, etc.) implement [`Catalog`] to describe
//! their database objects. The core crate defines only the trait plus an
//! in-memory [`StaticCatalog`], so it stays provider-agnostic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::BoxFuture;

use super::{
    ColumnMetadata, ObjectName, StoredProcedureMetadata, TableFunctionMetadata,
    TableOrViewMetadata,
};
use crate::descriptor::{PropertyType, Record};
use crate::error::Result;
use crate::value::SqlType;

/// Which object kinds a catalog can describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogCapabilities {
    /// Stored procedures exist on this engine.
    pub stored_procedures: bool,
    /// Table-valued functions exist on this engine.
    pub table_functions: bool,
}

impl Default for CatalogCapabilities {
    fn default() -> Self {
        Self {
            stored_procedures: true,
            table_functions: true,
        }
    }
}

/// Resolves object names to metadata.
///
/// Returning `Ok(None)` means the object does not exist; the cache turns that
/// into a not-found error.
pub trait Catalog: Send + Sync {
    /// Returns what this catalog supports.
    fn capabilities(&self) -> CatalogCapabilities;

    /// Loads a table or view.
    fn table_or_view<'a>(
        &'a self,
        name: &'a ObjectName,
    ) -> BoxFuture<'a, Result<Option<TableOrViewMetadata>>>;

    /// Loads a stored procedure.
    fn stored_procedure<'a>(
        &'a self,
        _name: &'a ObjectName,
    ) -> BoxFuture<'a, Result<Option<StoredProcedureMetadata>>> {
        Box::pin(async { Ok(None) })
    }

    /// Loads a table-valued function.
    fn table_function<'a>(
        &'a self,
        _name: &'a ObjectName,
    ) -> BoxFuture<'a, Result<Option<TableFunctionMetadata>>> {
        Box::pin(async { Ok(None) })
    }

    /// Loads every table and view.
    fn all_tables_and_views(&self) -> BoxFuture<'_, Result<Vec<TableOrViewMetadata>>>;

    /// Loads every stored procedure.
    fn all_stored_procedures(&self) -> BoxFuture<'_, Result<Vec<StoredProcedureMetadata>>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    /// Loads every table-valued function.
    fn all_table_functions(&self) -> BoxFuture<'_, Result<Vec<TableFunctionMetadata>>> {
        Box::pin(async { Ok(Vec::new()) })
    }
}

/// An in-memory catalog.
///
/// Useful for tests and for applications that describe their schema from
/// derived record types instead of querying the database.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    capabilities: CatalogCapabilities,
    tables: HashMap<String, TableOrViewMetadata>,
    procedures: HashMap<String, StoredProcedureMetadata>,
    functions: HashMap<String, TableFunctionMetadata>,
    loads: AtomicUsize,
}

impl StaticCatalog {
    /// Creates an empty catalog supporting every object kind.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the capability flags.
    #[must_use]
    pub const fn with_capabilities(mut self, capabilities: CatalogCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Adds a table or view.
    #[must_use]
    pub fn with_table(mut self, table: TableOrViewMetadata) -> Self {
        self.tables.insert(table.name().key(), table);
        self
    }

    /// Adds a stored procedure.
    #[must_use]
    pub fn with_procedure(mut self, procedure: StoredProcedureMetadata) -> Self {
        self.procedures.insert(procedure.name.key(), procedure);
        self
    }

    /// Adds a table-valued function.
    #[must_use]
    pub fn with_function(mut self, function: TableFunctionMetadata) -> Self {
        self.functions.insert(function.name.key(), function);
        self
    }

    /// Adds a table described by a record type's descriptor.
    ///
    /// # Errors
    ///
    /// Fails if the descriptor maps two properties to the same column.
    pub fn register_record<T: Record>(self) -> Result<Self> {
        let descriptor = T::descriptor();
        let name = ObjectName::parse(descriptor.table().unwrap_or(descriptor.type_name()))?;
        let mut columns: Vec<ColumnMetadata> = Vec::with_capacity(descriptor.len());
        for property in descriptor.properties() {
            let mut column = ColumnMetadata::new(&property.column, sql_type_for(property.property_type));
            column.nullable = property.nullable;
            if property.key {
                column = column.primary_key();
            }
            if property.identity {
                column = column.identity();
            }
            columns.push(column);
        }
        Ok(self.with_table(TableOrViewMetadata::new(name, true, columns)?))
    }

    /// Returns how many lookups reached this catalog.
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    fn find<'a, T>(map: &'a HashMap<String, T>, name: &ObjectName) -> Option<&'a T> {
        map.get(&name.key()).or_else(|| {
            // an unqualified request still finds a schema-qualified entry
            map.iter()
                .find(|(key, _)| {
                    key.rsplit('.')
                        .next()
                        .is_some_and(|n| n == name.name.to_lowercase())
                        && name.schema.is_none()
                })
                .map(|(_, value)| value)
        })
    }
}

const fn sql_type_for(property_type: PropertyType) -> SqlType {
    match property_type {
        PropertyType::Bool => SqlType::Bool,
        PropertyType::I16 => SqlType::SmallInt,
        PropertyType::I32 => SqlType::Integer,
        PropertyType::I64 => SqlType::BigInt,
        PropertyType::F32 => SqlType::Real,
        PropertyType::F64 => SqlType::Double,
        PropertyType::Char | PropertyType::String => SqlType::Text,
        PropertyType::Bytes => SqlType::Blob,
        PropertyType::Date => SqlType::Date,
        PropertyType::Time => SqlType::Time,
        PropertyType::DateTime => SqlType::Timestamp,
        PropertyType::DateTimeOffset => SqlType::TimestampTz,
        PropertyType::Any => SqlType::Unknown,
    }
}

impl Catalog for StaticCatalog {
    fn capabilities(&self) -> CatalogCapabilities {
        self.capabilities
    }

    fn table_or_view<'a>(
        &'a self,
        name: &'a ObjectName,
    ) -> BoxFuture<'a, Result<Option<TableOrViewMetadata>>> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        let found = Self::find(&self.tables, name).cloned();
        Box::pin(async move { Ok(found) })
    }

    fn stored_procedure<'a>(
        &'a self,
        name: &'a ObjectName,
    ) -> BoxFuture<'a, Result<Option<StoredProcedureMetadata>>> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        let found = Self::find(&self.procedures, name).cloned();
        Box::pin(async move { Ok(found) })
    }

    fn table_function<'a>(
        &'a self,
        name: &'a ObjectName,
    ) -> BoxFuture<'a, Result<Option<TableFunctionMetadata>>> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        let found = Self::find(&self.functions, name).cloned();
        Box::pin(async move { Ok(found) })
    }

    fn all_tables_and_views(&self) -> BoxFuture<'_, Result<Vec<TableOrViewMetadata>>> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        let all = self.tables.values().cloned().collect();
        Box::pin(async move { Ok(all) })
    }

    fn all_stored_procedures(&self) -> BoxFuture<'_, Result<Vec<StoredProcedureMetadata>>> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        let all = self.procedures.values().cloned().collect();
        Box::pin(async move { Ok(all) })
    }

    fn all_table_functions(&self) -> BoxFuture<'_, Result<Vec<TableFunctionMetadata>>> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        let all = self.functions.values().cloned().collect();
        Box::pin(async move { Ok(all) })
    }
}
