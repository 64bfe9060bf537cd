//! Data source settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::builder::{FilterNullHandling, FilterOptions};
use crate::error::{Error, Result};

/// Behavior switches carried by a [`DataSource`](crate::DataSource).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Reject record properties that match no column instead of ignoring
    /// them. Properties declared `#[column(not_mapped)]` are always allowed.
    pub strict_mode: bool,

    /// Treatment of null-valued fields in filter objects.
    pub default_filter_null_handling: FilterNullHandling,

    /// Materialize through cached compiled projections.
    pub compiled_materializer: bool,

    /// Expiry of cached read results, in seconds. `None` keeps results until
    /// a write invalidates them.
    pub cache_ttl_secs: Option<u64>,

    /// Upper bound on one asynchronous command, in seconds.
    pub command_timeout_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            strict_mode: false,
            default_filter_null_handling: FilterNullHandling::IsNull,
            compiled_materializer: true,
            cache_ttl_secs: None,
            command_timeout_secs: None,
        }
    }
}

impl Settings {
    /// Parses settings from JSON; missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for malformed JSON.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|err| Error::InvalidArgument(format!("invalid settings: {err}")))
    }

    /// Filter options using the default null handling.
    #[must_use]
    pub const fn filter_options(&self) -> FilterOptions {
        FilterOptions::with_null_handling(self.default_filter_null_handling)
    }

    /// The cached-result expiry.
    #[must_use]
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_secs.map(Duration::from_secs)
    }

    /// The command timeout.
    #[must_use]
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}
