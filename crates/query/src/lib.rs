//! Query descriptors for the depot persistence layer.
//!
//! A [`NamedQuery`] describes a query that lives in the store's catalog: the
//! registered name, the parameter bindings, and an optional result window.
//! Descriptors are immutable once built and carry no connection state, so a
//! single descriptor can be reused across any number of repository calls.

pub mod named_query;
pub mod window;

pub use named_query::{NamedQuery, NamedQueryBuilder, ParamMap, QueryBuildError};
pub use window::ResultWindow;

/// Result alias for descriptor construction.
pub type QueryResult<T> = std::result::Result<T, QueryBuildError>;
