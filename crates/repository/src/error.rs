//! Error types for the persistence layer.
//!
//! Two channels exist. [`EngineError`] is what the mapping engine reports
//! through the capability traits. [`RepositoryError`] is what callers of a
//! repository see after classification: every engine failure is folded
//! into one of four caller-facing kinds, logged exactly once at the point
//! of classification, and never retried or swallowed by the repository.

use depot_query::QueryBuildError;

/// Result alias for the capability surface.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Result alias for repository operations.
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// A failure reported by the mapping engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The store rejected or failed an operation.
    #[error("store failure: {0}")]
    Store(String),

    /// No query is registered in the catalog under this name.
    #[error("no query registered under `{0}`")]
    UnknownQuery(String),

    /// A query expected to match at most one row matched several.
    #[error("query `{name}` matched {rows} rows where at most one was expected")]
    NonUniqueResult {
        /// The catalog name of the offending query.
        name: String,
        /// How many rows it matched.
        rows: usize,
    },

    /// An entity could not be mapped to or from its stored form.
    #[error("entity mapping failed: {0}")]
    Mapping(#[from] serde_json::Error),

    /// A failure outside the store's own reporting channel, such as a
    /// broken engine invariant.
    #[error("internal engine error: {0}")]
    Internal(String),
}

/// A classified failure returned by repository operations.
///
/// The `operation` and `entity` fields identify the repository call and
/// the entity binding it ran under; `message` carries the underlying
/// cause. The split is what callers branch on: `Persistence` covers
/// everything the store itself reported, `UnknownQuery` flags a descriptor
/// that resolves to nothing, `Unknown` is reserved for failures outside
/// the store's reporting channel, and `Precondition` means the call was
/// rejected before the store was ever contacted.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// The store reported a failure while executing the operation.
    #[error("persistence failure in {operation} for `{entity}`: {message}")]
    Persistence {
        /// The repository operation that failed.
        operation: &'static str,
        /// The entity binding the repository runs under.
        entity: &'static str,
        /// The underlying cause.
        message: String,
    },

    /// The operation referenced a query the catalog does not know,
    /// or no descriptor was supplied at all.
    #[error("unknown query in {operation} for `{entity}`: {message}")]
    UnknownQuery {
        /// The repository operation that failed.
        operation: &'static str,
        /// The entity binding the repository runs under.
        entity: &'static str,
        /// Which lookup failed and why.
        message: String,
    },

    /// A failure that did not come through the store's reporting channel.
    #[error("unclassified failure in {operation} for `{entity}`: {message}")]
    Unknown {
        /// The repository operation that failed.
        operation: &'static str,
        /// The entity binding the repository runs under.
        entity: &'static str,
        /// The underlying cause.
        message: String,
    },

    /// The call's arguments were rejected before any store contact.
    #[error("precondition failed: {0}")]
    Precondition(String),
}

impl RepositoryError {
    /// Stable machine-readable kind string, suitable for metrics labels
    /// and log fields.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Persistence { .. } => "PERSISTENCE_ERROR",
            Self::UnknownQuery { .. } => "UNKNOWN_QUERY",
            Self::Unknown { .. } => "UNKNOWN_ERROR",
            Self::Precondition(_) => "PRECONDITION_FAILED",
        }
    }

    /// Whether retrying the same call can plausibly succeed.
    ///
    /// Only store-reported failures qualify; a missing query or a rejected
    /// argument will fail the same way every time. The repository itself
    /// never retries, this is a hint for callers.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence { .. })
    }

    /// The repository operation the error came from, when known.
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            Self::Persistence { operation, .. }
            | Self::UnknownQuery { operation, .. }
            | Self::Unknown { operation, .. } => Some(operation),
            Self::Precondition(_) => None,
        }
    }
}

impl From<QueryBuildError> for RepositoryError {
    fn from(err: QueryBuildError) -> Self {
        Self::Precondition(err.to_string())
    }
}
