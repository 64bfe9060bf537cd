//! # quarry-sqlite
//!
//! SQLite support for `quarry-core`: a dialect, a catalog reading the
//! database schema, and an executor running tokens on a `sqlx` pool.
//!
//! # How SQLite differs from other dialects
//!
//! - **[UPSERT]**: `INSERT ... ON CONFLICT (key) DO UPDATE SET ...`
//!   (since SQLite 3.24.0).
//! - **[RETURNING]**: rows touched by INSERT, UPDATE and DELETE are
//!   projected with `RETURNING` (since SQLite 3.35.0). Pre-update values
//!   cannot be returned.
//! - **Parameters**: numbered `?1`, `?2`, ...
//! - **[Type affinity]**: any column can store any value, so values come
//!   back in their storage class and are converted while materializing.
//! - **No stored procedures** and no user-defined table-valued functions.
//!
//! [UPSERT]: https://www.sqlite.org/lang_upsert.html
//! [RETURNING]: https://www.sqlite.org/lang_returning.html
//! [Type affinity]: https://www.sqlite.org/datatype3.html
//!
//! ## Example
//!
//! ```rust,no_run
//! use quarry_core::builder::ArgumentMap;
//! use quarry_sqlite::SqliteConfig;
//!
//! # async fn run() -> quarry_core::Result<()> {
//! let source = quarry_sqlite::connect(&SqliteConfig::from_env()).await?;
//! let rows = source
//!     .from_where("users", source.filter(ArgumentMap::new().with("active", true)))
//!     .to_row_set()
//!     .execute()
//!     .await?;
//! println!("{} active users", rows.len());
//! # Ok(())
//! # }
//! ```

mod catalog;
mod config;
mod dialect;
mod executor;

use std::sync::Arc;

use quarry_core::{DataSource, Result};
use sqlx::sqlite::SqlitePool;

pub use catalog::SqliteCatalog;
pub use config::{SqliteConfig, URL_ENV};
pub use dialect::SqliteDialect;
pub use executor::SqliteExecutor;

/// Builds a data source over an existing pool with default settings.
#[must_use]
pub fn data_source(pool: SqlitePool) -> DataSource {
    DataSource::new(
        Arc::new(SqliteDialect::new()),
        Arc::new(SqliteCatalog::new(pool.clone())),
        Arc::new(SqliteExecutor::new(pool)),
    )
}

/// Opens the configured database and builds a data source over it.
///
/// # Errors
///
/// See [`SqliteConfig::connect`].
pub async fn connect(config: &SqliteConfig) -> Result<DataSource> {
    let pool = config.connect().await?;
    Ok(data_source(pool).with_settings(config.settings.clone()))
}
