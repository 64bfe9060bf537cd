//! Lazily populated, process-lifetime metadata cache.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::{
    Catalog, ObjectName, StoredProcedureMetadata, TableFunctionMetadata, TableOrViewMetadata,
};
use crate::error::{Error, Result};

/// Caches catalog lookups for the lifetime of a data source.
///
/// Lookups are idempotent and safe to call concurrently. Two callers racing on
/// the first lookup of the same name may both reach the catalog, but only the
/// first inserted entry is retained and both receive it. No lock is held while
/// the catalog is consulted.
pub struct MetadataCache {
    catalog: Arc<dyn Catalog>,
    tables: DashMap<String, Arc<TableOrViewMetadata>>,
    procedures: DashMap<String, Arc<StoredProcedureMetadata>>,
    functions: DashMap<String, Arc<TableFunctionMetadata>>,
}

impl MetadataCache {
    /// Creates an empty cache over a catalog.
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self {
            catalog,
            tables: DashMap::new(),
            procedures: DashMap::new(),
            functions: DashMap::new(),
        }
    }

    /// Returns the underlying catalog.
    #[must_use]
    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    /// Resolves a table or view.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the catalog does not know the name.
    pub async fn get_table_or_view(&self, name: &str) -> Result<Arc<TableOrViewMetadata>> {
        let name = ObjectName::parse(name)?;
        let key = name.key();
        if let Some(hit) = self.tables.get(&key) {
            return Ok(Arc::clone(hit.value()));
        }

        debug!(object = %name, "Loading table or view metadata");
        let loaded = self
            .catalog
            .table_or_view(&name)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: "table or view",
                name: name.to_string(),
            })?;

        Ok(self.retain_table(key, loaded))
    }

    /// Resolves a stored procedure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] when the engine has no stored
    /// procedures, or [`Error::NotFound`] for unknown names.
    pub async fn get_stored_procedure(&self, name: &str) -> Result<Arc<StoredProcedureMetadata>> {
        if !self.catalog.capabilities().stored_procedures {
            return Err(Error::Unsupported(
                "this database does not support stored procedures".to_string(),
            ));
        }
        let name = ObjectName::parse(name)?;
        let key = name.key();
        if let Some(hit) = self.procedures.get(&key) {
            return Ok(Arc::clone(hit.value()));
        }

        debug!(object = %name, "Loading stored procedure metadata");
        let loaded = self
            .catalog
            .stored_procedure(&name)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: "stored procedure",
                name: name.to_string(),
            })?;

        Ok(retain(&self.procedures, key, loaded.name.key(), loaded))
    }

    /// Resolves a table-valued function.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] when the engine has no table functions,
    /// or [`Error::NotFound`] for unknown names.
    pub async fn get_table_function(&self, name: &str) -> Result<Arc<TableFunctionMetadata>> {
        if !self.catalog.capabilities().table_functions {
            return Err(Error::Unsupported(
                "this database does not support table-valued functions".to_string(),
            ));
        }
        let name = ObjectName::parse(name)?;
        let key = name.key();
        if let Some(hit) = self.functions.get(&key) {
            return Ok(Arc::clone(hit.value()));
        }

        debug!(object = %name, "Loading table function metadata");
        let loaded = self
            .catalog
            .table_function(&name)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: "table function",
                name: name.to_string(),
            })?;

        Ok(retain(&self.functions, key, loaded.name.key(), loaded))
    }

    /// Eagerly loads every table and view, plus every stored procedure and
    /// table function the engine supports. Returns the number of objects
    /// loaded.
    ///
    /// Entries already cached are kept, so instances handed out earlier stay
    /// valid.
    ///
    /// # Errors
    ///
    /// Propagates catalog failures.
    pub async fn preload(&self) -> Result<usize> {
        let capabilities = self.catalog.capabilities();

        let tables = self.catalog.all_tables_and_views().await?;
        let mut count = tables.len();
        for table in tables {
            let key = table.name().key();
            self.retain_table(key, table);
        }

        if capabilities.stored_procedures {
            let procedures = self.catalog.all_stored_procedures().await?;
            count += procedures.len();
            for procedure in procedures {
                let key = procedure.name.key();
                retain(&self.procedures, key.clone(), key, procedure);
            }
        }
        if capabilities.table_functions {
            let functions = self.catalog.all_table_functions().await?;
            count += functions.len();
            for function in functions {
                let key = function.name.key();
                retain(&self.functions, key.clone(), key, function);
            }
        }
        debug!(count, "Preloaded metadata");
        Ok(count)
    }

    /// Clears every cached entry.
    pub fn reset(&self) {
        self.tables.clear();
        self.procedures.clear();
        self.functions.clear();
        debug!("Metadata cache reset");
    }

    /// Returns how many table/view keys are cached.
    #[must_use]
    pub fn cached_table_count(&self) -> usize {
        self.tables.len()
    }

    fn retain_table(&self, key: String, loaded: TableOrViewMetadata) -> Arc<TableOrViewMetadata> {
        let canonical = loaded.name().key();
        retain(&self.tables, key, canonical, loaded)
    }
}

// Keeps the first instance stored under `canonical` and aliases `key` to it.
fn retain<T>(map: &DashMap<String, Arc<T>>, key: String, canonical: String, loaded: T) -> Arc<T> {
    let retained = Arc::clone(
        map.entry(canonical.clone())
            .or_insert_with(|| Arc::new(loaded))
            .value(),
    );
    if canonical != key {
        map.entry(key).or_insert_with(|| Arc::clone(&retained));
    }
    retained
}

impl std::fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataCache")
            .field("tables", &self.tables.len())
            .field("procedures", &self.procedures.len())
            .field("functions", &self.functions.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{CatalogCapabilities, ColumnMetadata, StaticCatalog};
    use crate::value::SqlType;

    fn catalog() -> StaticCatalog {
        StaticCatalog::new().with_table(
            TableOrViewMetadata::new(
                ObjectName::qualified("sales", "Customer"),
                true,
                vec![
                    ColumnMetadata::new("CustomerKey", SqlType::Integer)
                        .primary_key()
                        .identity(),
                    ColumnMetadata::new("FullName", SqlType::Text),
                ],
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_same_instance_until_reset() {
        let catalog = Arc::new(catalog());
        let cache = MetadataCache::new(catalog.clone());

        let first = cache.get_table_or_view("sales.Customer").await.unwrap();
        let second = cache.get_table_or_view("[Sales].[customer]").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.columns(), second.columns());
        assert_eq!(catalog.load_count(), 1);

        cache.reset();
        let third = cache.get_table_or_view("sales.Customer").await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(*first, *third);
        assert_eq!(catalog.load_count(), 2);
    }

    #[tokio::test]
    async fn test_unqualified_alias_shares_instance() {
        let cache = MetadataCache::new(Arc::new(catalog()));
        let qualified = cache.get_table_or_view("sales.Customer").await.unwrap();
        let alias = cache.get_table_or_view("Customer").await.unwrap();
        assert!(Arc::ptr_eq(&qualified, &alias));
    }

    #[tokio::test]
    async fn test_not_found() {
        let cache = MetadataCache::new(Arc::new(catalog()));
        let err = cache.get_table_or_view("Nope").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "table or view", .. }));
    }

    #[tokio::test]
    async fn test_unsupported_procedures_fail_fast() {
        let catalog = catalog().with_capabilities(CatalogCapabilities {
            stored_procedures: false,
            table_functions: false,
        });
        let cache = MetadataCache::new(Arc::new(catalog));
        assert!(matches!(
            cache.get_stored_procedure("Anything").await,
            Err(Error::Unsupported(_))
        ));
        assert!(matches!(
            cache.get_table_function("Anything").await,
            Err(Error::Unsupported(_))
        ));
    }

    fn routines() -> StaticCatalog {
        catalog()
            .with_procedure(StoredProcedureMetadata {
                name: ObjectName::qualified("sales", "CloseMonth"),
                parameters: Vec::new(),
            })
            .with_function(TableFunctionMetadata {
                name: ObjectName::qualified("sales", "TopCustomers"),
                parameters: Vec::new(),
                columns: vec![ColumnMetadata::new("CustomerKey", SqlType::Integer)],
            })
    }

    #[tokio::test]
    async fn test_preload_fills_cache() {
        let catalog = Arc::new(routines());
        let cache = MetadataCache::new(catalog.clone());
        assert_eq!(cache.preload().await.unwrap(), 3);
        let loads = catalog.load_count();

        cache.get_table_or_view("sales.customer").await.unwrap();
        cache.get_stored_procedure("sales.CloseMonth").await.unwrap();
        cache.get_table_function("Sales.TopCustomers").await.unwrap();
        assert_eq!(catalog.load_count(), loads);
    }

    #[tokio::test]
    async fn test_preload_skips_unsupported_routines() {
        let catalog = Arc::new(routines().with_capabilities(CatalogCapabilities {
            stored_procedures: false,
            table_functions: false,
        }));
        let cache = MetadataCache::new(catalog.clone());
        assert_eq!(cache.preload().await.unwrap(), 1);
        assert_eq!(catalog.load_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_access_converges() {
        let cache = Arc::new(MetadataCache::new(Arc::new(catalog())));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get_table_or_view("sales.Customer").await })
            })
            .collect();
        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }
        assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0])));
    }
}
