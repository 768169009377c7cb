//! Generic persistence access for depot.
//!
//! This crate provides a repository abstraction over a relational-object
//! mapping engine. The engine itself stays behind the narrow capability
//! traits in [`session`]; on top of that surface, [`EntityRepository`]
//! implements create/read/update/delete, batch writes, paged scans and
//! named-query execution for any [`Entity`] type, together with the
//! unit-of-work discipline and error normalization that application code
//! would otherwise repeat per entity.
//!
//! Every operation is self-contained: it opens its own engine session,
//! wraps mutations in a transaction, and releases the session on every
//! exit path. Nothing is shared between calls beyond the entity binding
//! fixed at construction, so one repository value can serve concurrent
//! tasks.

pub mod entity;
pub mod error;
pub mod generic;
pub mod session;

pub use entity::Entity;
pub use error::{EngineError, EngineResult, RepositoryError, RepositoryResult};
pub use generic::{EntityRepository, Repository};
pub use session::{LockMode, MappingEngine, Session};

// The descriptor types travel with the repository API.
pub use depot_query::{NamedQuery, NamedQueryBuilder, ParamMap, QueryBuildError, ResultWindow};
