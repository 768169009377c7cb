//! The mapping-engine capability surface.
//!
//! These traits are everything the repository knows about the store. A
//! [`MappingEngine`] hands out sessions; a [`Session`] is one unit of work
//! against the store, with optional transaction control. Implementations
//! own schema mapping, statement generation, caching and dialect concerns;
//! none of that leaks through this boundary.

use async_trait::async_trait;
use depot_query::{ParamMap, ResultWindow};

use crate::entity::Entity;
use crate::error::EngineResult;

/// How a row should be locked when it is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockMode {
    /// No locking beyond the store's defaults.
    #[default]
    None,
    /// Request a pessimistic upgrade lock held for the enclosing unit of
    /// work. Cross-call locking is not expressible through this interface.
    Upgrade,
}

/// A handle to the mapping engine, able to open units of work.
#[async_trait]
pub trait MappingEngine: Send + Sync {
    /// The session type this engine hands out.
    type Session: Session;

    /// Open a fresh unit of work against the store.
    async fn open_session(&self) -> EngineResult<Self::Session>;
}

/// One unit of work against the store.
///
/// Sessions are single-owner and not reused across repository operations.
/// Mutating calls only become durable once [`commit`](Session::commit)
/// returns; a session dropped or closed without commit must leave the
/// store untouched.
#[async_trait]
pub trait Session: Send {
    /// Start a transaction on this session.
    async fn begin(&mut self) -> EngineResult<()>;

    /// Commit the open transaction, publishing its writes.
    async fn commit(&mut self) -> EngineResult<()>;

    /// Roll the open transaction back, discarding its writes. Calling this
    /// without an open transaction is a no-op.
    async fn rollback(&mut self) -> EngineResult<()>;

    /// Fetch one entity by identifier, optionally locking the row.
    async fn fetch<T: Entity>(&mut self, id: &T::Id, lock: LockMode) -> EngineResult<Option<T>>;

    /// Insert or update one entity, keyed on its identifier. The returned
    /// instance reflects anything the store populated on the way in.
    async fn save_or_update<T: Entity>(&mut self, entity: &T) -> EngineResult<T>;

    /// Delete one entity. The store rejects instances it does not hold.
    async fn delete<T: Entity>(&mut self, entity: &T) -> EngineResult<()>;

    /// Scan the entity's whole extent in the store's default order.
    async fn scan<T: Entity>(&mut self, window: ResultWindow) -> EngineResult<Vec<T>>;

    /// Execute the catalog query `name` with the given bindings and
    /// window, returning all matching rows.
    async fn query<T: Entity>(
        &mut self,
        name: &str,
        params: &ParamMap,
        window: ResultWindow,
    ) -> EngineResult<Vec<T>>;

    /// Execute the catalog query `name` expecting at most one row. More
    /// than one match is an error reported by the engine.
    async fn query_unique<T: Entity>(
        &mut self,
        name: &str,
        params: &ParamMap,
    ) -> EngineResult<Option<T>>;

    /// Execute the catalog statement `name` as a bulk mutation, returning
    /// the number of rows it touched.
    async fn execute_update(&mut self, name: &str, params: &ParamMap) -> EngineResult<u64>;

    /// Count the rows in the entity's extent.
    async fn count<T: Entity>(&mut self) -> EngineResult<u64>;

    /// Push pending writes to the store without ending the transaction.
    async fn flush(&mut self) -> EngineResult<()>;

    /// Detach all tracked instances from the session. Pending writes that
    /// were never flushed are discarded with them.
    async fn clear(&mut self) -> EngineResult<()>;

    /// Release the session. Closing an already-closed session is a no-op.
    async fn close(&mut self) -> EngineResult<()>;
}
