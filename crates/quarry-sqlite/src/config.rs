//! Connection configuration.

use std::str::FromStr;

use quarry_core::{Error, Result, Settings};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

/// Environment variable read by [`SqliteConfig::from_env`].
pub const URL_ENV: &str = "QUARRY_SQLITE_URL";

const DEFAULT_URL: &str = "sqlite:quarry.sqlite3";

/// How to open a SQLite database and configure the data source over it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database URL, e.g. `sqlite:app.db` or `sqlite::memory:`.
    pub url: String,
    /// Pool size. In-memory databases should use one connection, since each
    /// connection sees its own database.
    pub max_connections: u32,
    /// Create the database file when it does not exist.
    pub create_if_missing: bool,
    /// Data source settings.
    pub settings: Settings,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            max_connections: 5,
            create_if_missing: true,
            settings: Settings::default(),
        }
    }
}

impl SqliteConfig {
    /// A single-connection in-memory database.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            ..Self::default()
        }
    }

    /// Defaults, with the URL taken from `QUARRY_SQLITE_URL` when set.
    #[must_use]
    pub fn from_env() -> Self {
        std::env::var(URL_ENV).map_or_else(|_| Self::default(), |url| Self {
            url,
            ..Self::default()
        })
    }

    /// Parses a configuration from JSON; missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for malformed JSON.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|err| Error::InvalidArgument(format!("invalid SQLite configuration: {err}")))
    }

    fn is_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }

    /// Opens a connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for a malformed URL and a provider
    /// error when the database cannot be opened.
    pub async fn connect(&self) -> Result<SqlitePool> {
        let options = SqliteConnectOptions::from_str(&self.url)
            .map_err(|err| Error::InvalidArgument(format!("invalid SQLite URL '{}': {err}", self.url)))?
            .create_if_missing(self.create_if_missing);
        let mut pool = SqlitePoolOptions::new().max_connections(self.max_connections);
        if self.is_memory() {
            // closing the last connection would drop the database
            pool = pool.idle_timeout(None).max_lifetime(None);
        }
        let pool = pool.connect_with(options).await.map_err(Error::provider)?;
        info!(url = %self.url, max_connections = self.max_connections, "Opened SQLite pool");
        Ok(pool)
    }
}
