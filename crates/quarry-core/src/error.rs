//! Error types shared by every quarry component.

use thiserror::Error;

/// Errors raised while resolving metadata, building commands, executing them,
/// or materializing their results.
#[derive(Debug, Error)]
pub enum Error {
    /// The argument or result shape cannot be reconciled with the metadata.
    #[error("mapping error: {0}")]
    Mapping(String),

    /// A validation rule rejected the argument.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An audit restriction blocked access to a column.
    #[error("access to column '{column}' on '{object}' is restricted")]
    RestrictedColumn {
        /// Table or view holding the column.
        object: String,
        /// The restricted column.
        column: String,
    },

    /// A single-row materializer received zero rows.
    #[error("expected a row but none were returned")]
    MissingData,

    /// More rows were returned than the materializer permits.
    #[error("expected at most {expected} row(s) but {actual} were returned")]
    UnexpectedData {
        /// Maximum number of rows permitted.
        expected: usize,
        /// Number of rows actually returned.
        actual: usize,
    },

    /// The affected-row count did not match the recorded expectation.
    #[error("expected {expected} row(s) to be affected but {actual} were")]
    RowCountMismatch {
        /// Expected affected-row count.
        expected: u64,
        /// Actual affected-row count reported by the provider.
        actual: u64,
    },

    /// Two argument sources define the same name.
    #[error("'{0}' is defined by more than one argument source")]
    Conflict(String),

    /// A keyed operation was attempted without a full primary key.
    #[error("missing primary key for '{object}': {detail}")]
    MissingPrimaryKey {
        /// Table or view being written.
        object: String,
        /// Which key column(s) are missing.
        detail: String,
    },

    /// A named database object could not be resolved.
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Kind of object ("table or view", "stored procedure", ...).
        kind: &'static str,
        /// The requested name.
        name: String,
    },

    /// The dialect or provider does not support the requested feature.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A rule needed the ambient current user, but none was attached.
    #[error("rule on column '{column}' requires a current user, but none is attached")]
    NoCurrentUser {
        /// Column whose rule needed the user.
        column: String,
    },

    /// A compiled projection could not be generated.
    #[error("failed to compile projection: {cause}\n--- generated source ---\n{source_text}")]
    Compile {
        /// The rendered projection source.
        source_text: String,
        /// Underlying failure.
        cause: Box<Error>,
    },

    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// The command did not finish within the configured timeout.
    #[error("operation timed out after {seconds}s")]
    Timeout {
        /// Configured timeout.
        seconds: u64,
    },

    /// The argument itself is malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Failure reported by the provider collaborator.
    #[error("provider error: {0}")]
    Provider(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps a provider error.
    pub fn provider<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Provider(Box::new(err))
    }

    /// Returns whether this error is the distinct cancellation outcome.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type alias for quarry operations.
pub type Result<T> = std::result::Result<T, Error>;
