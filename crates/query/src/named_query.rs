//! Named query descriptors and their builder.
//!
//! A named query is looked up in the store's catalog by name and executed
//! with the bindings captured here. The descriptor itself is inert data:
//! building one performs no validation against the catalog and touches no
//! connection, which is what makes descriptors safe to build once and reuse.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::window::ResultWindow;
use crate::QueryResult;

/// Parameter bindings for a named query.
///
/// Keys are parameter names and binding is by key. Insertion order is
/// preserved for diagnostics and for engines that choose to bind
/// positionally, but it carries no semantic ordering requirement.
pub type ParamMap = IndexMap<String, Value>;

/// Error raised when a descriptor cannot be built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryBuildError {
    /// The query name was empty.
    #[error("named query requires a non-empty name")]
    EmptyName,
}

/// An immutable descriptor for a catalog query.
///
/// `start` and `limit` describe the result window: `start` is the 0-indexed
/// offset of the first row to return and `limit` caps the number of rows,
/// with `0` meaning unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedQuery {
    name: String,

    #[serde(default)]
    params: ParamMap,

    #[serde(default)]
    start: u32,

    #[serde(default)]
    limit: u32,
}

impl NamedQuery {
    /// Start building a descriptor for the catalog query `name`.
    pub fn builder(name: impl Into<String>) -> NamedQueryBuilder {
        NamedQueryBuilder::new(name)
    }

    /// The catalog name this descriptor resolves against.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All parameter bindings, in insertion order.
    pub fn params(&self) -> &ParamMap {
        &self.params
    }

    /// Look up a single binding by parameter name.
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// The 0-indexed offset of the first row to return.
    pub fn start(&self) -> u32 {
        self.start
    }

    /// The row cap, where `0` means unbounded.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// The result window to hand to the store.
    ///
    /// The offset is always applied, even when it is `0`. The cap is applied
    /// only when `limit` is positive; a `limit` of `0` leaves the result set
    /// unbounded rather than empty.
    pub fn window(&self) -> ResultWindow {
        ResultWindow::new(Some(self.start), (self.limit > 0).then_some(self.limit))
    }
}

/// Fluent builder for [`NamedQuery`].
///
/// The builder is consumed by [`build`](NamedQueryBuilder::build), so a
/// descriptor can never be mutated through the builder that produced it.
#[derive(Debug, Clone)]
pub struct NamedQueryBuilder {
    name: String,
    start: u32,
    limit: u32,
    params: ParamMap,
}

impl NamedQueryBuilder {
    /// Create a builder bound to the catalog query `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: 0,
            limit: 0,
            params: ParamMap::new(),
        }
    }

    /// Set the 0-indexed offset of the first row to return.
    pub fn start(mut self, start: u32) -> Self {
        self.start = start;
        self
    }

    /// Cap the number of rows returned. `0` leaves the result unbounded.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Bind a parameter. Rebinding a name overwrites the previous value
    /// while keeping the parameter's original position.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Finish the descriptor.
    ///
    /// Fails with [`QueryBuildError::EmptyName`] when the name bound at
    /// construction was empty.
    pub fn build(self) -> QueryResult<NamedQuery> {
        if self.name.is_empty() {
            return Err(QueryBuildError::EmptyName);
        }

        Ok(NamedQuery {
            name: self.name,
            params: self.params,
            start: self.start,
            limit: self.limit,
        })
    }
}
