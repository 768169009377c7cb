//! The entity contract.
//!
//! An entity is whatever the caller wants persisted. The repository needs
//! three things from it: a stable name for the mapped extent (the "table"
//! from the store's point of view), an identifier, and a serde mapping.
//! Everything else about how the type is stored belongs to the mapping
//! engine.

use std::fmt::Display;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A persistable type with a typed identifier.
///
/// The associated `NAME` is the type descriptor handed to the mapping
/// engine for scans, counts and diagnostics; it must be unique within one
/// engine. Identifiers are compared for equality, used as lookup keys and
/// printed in logs, which is where their bounds come from.
///
/// # Examples
///
/// ```
/// use depot_repository::Entity;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// struct Account {
///     id: i64,
///     owner: String,
///     balance: i64,
/// }
///
/// impl Entity for Account {
///     type Id = i64;
///
///     const NAME: &'static str = "account";
///
///     fn id(&self) -> &i64 {
///         &self.id
///     }
/// }
/// ```
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The identifier type for this entity.
    type Id: Clone + Eq + Display + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// The name of the mapped extent this entity lives in.
    const NAME: &'static str;

    /// The identifier of this instance.
    fn id(&self) -> &Self::Id;
}
