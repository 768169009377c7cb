//! The engine-parameterized repository.
//!
//! [`EntityRepository`] turns the raw capability surface in
//! [`session`](crate::session) into the caller-facing [`Repository`]
//! contract. Every operation runs the same unit-of-work ceremony: open a
//! session, begin a transaction when the operation mutates, issue the
//! engine call, commit or roll back, and release the session on every exit
//! path. Failures are classified into [`RepositoryError`] at exactly one
//! seam and logged there, never swallowed and never retried.

use std::marker::PhantomData;

use async_trait::async_trait;
use tracing::{debug, error, instrument, warn};

use depot_query::{NamedQuery, ResultWindow};

use crate::entity::Entity;
use crate::error::{EngineError, RepositoryError, RepositoryResult};
use crate::session::{LockMode, MappingEngine, Session};

/// Persistence operations over one entity type.
///
/// The entity binding is part of the repository value itself; a repository
/// for `Account` can only ever read and write accounts. All operations are
/// self-contained units of work, so a single repository value is safe to
/// share across concurrent tasks.
#[async_trait]
pub trait Repository<T: Entity>: Send + Sync {
    /// Insert or update `entity`, keyed on its identifier, inside its own
    /// transaction. Returns the persisted instance, reflecting anything
    /// the store populated on the way in.
    async fn persist(&self, entity: T) -> RepositoryResult<T>;

    /// Delete `entity` inside its own transaction. A store that does not
    /// hold the instance rejects the call with a persistence failure.
    async fn delete(&self, entity: &T) -> RepositoryResult<()>;

    /// Fetch one entity by identifier. Absence is `Ok(None)`, not an
    /// error. [`LockMode::Upgrade`] asks the store for a pessimistic lock
    /// scoped to this call's unit of work.
    async fn find_by_id(&self, id: &T::Id, lock: LockMode) -> RepositoryResult<Option<T>>;

    /// Scan the entity's whole extent. `start` skips rows and `limit` caps
    /// them; each bound is applied only when present. Row order is the
    /// store's default scan order.
    async fn find_all(&self, start: Option<u32>, limit: Option<u32>) -> RepositoryResult<Vec<T>>;

    /// Execute a named query from the store's catalog. The descriptor's
    /// offset is always applied; its limit becomes a cap only when
    /// positive, since a limit of `0` means unbounded. Passing `None`
    /// fails with an unknown-query error before the store is contacted.
    async fn find_by_query(&self, query: Option<&NamedQuery>) -> RepositoryResult<Vec<T>>;

    /// Execute a named query expected to match at most one row. No match
    /// is `Ok(None)`; two or more matches are a persistence failure. The
    /// descriptor's pagination window is not applied here.
    async fn unique_result(&self, query: Option<&NamedQuery>) -> RepositoryResult<Option<T>>;

    /// Upsert every entity in order inside one transaction. After every
    /// `batch_size`-th entity the session is flushed and its tracked
    /// instances detached, bounding tracking overhead for long batches.
    /// The whole batch commits or rolls back together; `batch_size` of
    /// `0` is rejected up front.
    async fn batch_persist(&self, entities: Vec<T>, batch_size: usize) -> RepositoryResult<()>;

    /// Execute a named bulk update or delete statement inside its own
    /// transaction, without loading rows. Passing `None` fails with an
    /// unknown-query error before the store is contacted.
    async fn delete_or_update(&self, query: Option<&NamedQuery>) -> RepositoryResult<()>;

    /// Count the rows in the entity's whole extent. The contract is
    /// 32-bit; larger counts are reported as a persistence failure.
    async fn count(&self) -> RepositoryResult<u32>;
}

/// Classify an engine failure into the caller-facing taxonomy.
///
/// This is the single point where engine errors are turned into
/// [`RepositoryError`] values, and the single point where they are logged.
fn classify(operation: &'static str, entity: &'static str, err: EngineError) -> RepositoryError {
    error!(operation, entity, cause = %err, "persistence operation failed");
    match err {
        EngineError::Store(message) => RepositoryError::Persistence {
            operation,
            entity,
            message,
        },
        EngineError::UnknownQuery(name) => RepositoryError::UnknownQuery {
            operation,
            entity,
            message: format!("no query registered under `{name}`"),
        },
        EngineError::NonUniqueResult { name, rows } => RepositoryError::Persistence {
            operation,
            entity,
            message: format!("query `{name}` matched {rows} rows where at most one was expected"),
        },
        EngineError::Mapping(err) => RepositoryError::Persistence {
            operation,
            entity,
            message: format!("entity mapping failed: {err}"),
        },
        EngineError::Internal(message) => RepositoryError::Unknown {
            operation,
            entity,
            message,
        },
    }
}

/// Classify a failure from a named-query execution, naming the query in
/// store-reported failures.
fn classify_query(
    operation: &'static str,
    entity: &'static str,
    query: &str,
    err: EngineError,
) -> RepositoryError {
    match err {
        EngineError::Store(message) => classify(
            operation,
            entity,
            EngineError::Store(format!("unable to execute query `{query}`: {message}")),
        ),
        other => classify(operation, entity, other),
    }
}

/// The error for a named-query operation invoked without a descriptor.
fn missing_query(operation: &'static str, entity: &'static str) -> RepositoryError {
    error!(operation, entity, "no query descriptor supplied");
    RepositoryError::UnknownQuery {
        operation,
        entity,
        message: "no query descriptor supplied".to_string(),
    }
}

/// A [`Repository`] implementation over any [`MappingEngine`].
///
/// The repository owns an engine handle and the entity binding; engine
/// handles are expected to be cheap to clone, so constructing one
/// repository per entity type over a shared engine is the intended usage.
#[derive(Clone)]
pub struct EntityRepository<T, M> {
    engine: M,
    _entity: PhantomData<fn() -> T>,
}

impl<T, M> EntityRepository<T, M>
where
    T: Entity,
    M: MappingEngine,
{
    /// Bind a repository for `T` to the given engine.
    pub fn new(engine: M) -> Self {
        Self {
            engine,
            _entity: PhantomData,
        }
    }

    /// The engine this repository runs against.
    pub fn engine(&self) -> &M {
        &self.engine
    }

    /// The name of the entity extent this repository is bound to.
    pub fn entity_name(&self) -> &'static str {
        T::NAME
    }

    async fn open(&self, operation: &'static str) -> RepositoryResult<M::Session> {
        self.engine
            .open_session()
            .await
            .map_err(|err| classify(operation, T::NAME, err))
    }

    async fn begin_tx(
        &self,
        session: &mut M::Session,
        operation: &'static str,
    ) -> RepositoryResult<()> {
        session
            .begin()
            .await
            .map_err(|err| classify(operation, T::NAME, err))
    }

    /// Commit, rolling back when the commit itself fails.
    async fn finish_tx(
        &self,
        session: &mut M::Session,
        operation: &'static str,
    ) -> RepositoryResult<()> {
        if let Err(err) = session.commit().await {
            self.abort_tx(session, operation).await;
            return Err(classify(operation, T::NAME, err));
        }
        Ok(())
    }

    /// Best-effort rollback. A rollback failure is logged and dropped so
    /// it never replaces the error that triggered it.
    async fn abort_tx(&self, session: &mut M::Session, operation: &'static str) {
        if let Err(rollback_err) = session.rollback().await {
            warn!(operation, entity = T::NAME, cause = %rollback_err, "transaction rollback failed");
        }
    }

    /// Best-effort release. A close failure is logged and dropped so it
    /// never replaces an in-flight error.
    async fn release(&self, mut session: M::Session, operation: &'static str) {
        if let Err(close_err) = session.close().await {
            warn!(operation, entity = T::NAME, cause = %close_err, "session release failed");
        }
    }

    async fn persist_in(&self, session: &mut M::Session, entity: &T) -> RepositoryResult<T> {
        self.begin_tx(session, "persist").await?;
        match session.save_or_update(entity).await {
            Ok(saved) => {
                self.finish_tx(session, "persist").await?;
                debug!(id = %saved.id(), "entity persisted");
                Ok(saved)
            }
            Err(err) => {
                self.abort_tx(session, "persist").await;
                Err(classify("persist", T::NAME, err))
            }
        }
    }

    async fn delete_in(&self, session: &mut M::Session, entity: &T) -> RepositoryResult<()> {
        self.begin_tx(session, "delete").await?;
        match session.delete(entity).await {
            Ok(()) => {
                self.finish_tx(session, "delete").await?;
                debug!(id = %entity.id(), "entity deleted");
                Ok(())
            }
            Err(err) => {
                self.abort_tx(session, "delete").await;
                Err(classify("delete", T::NAME, err))
            }
        }
    }

    async fn batch_persist_in(
        &self,
        session: &mut M::Session,
        entities: &[T],
        batch_size: usize,
    ) -> RepositoryResult<()> {
        self.begin_tx(session, "batch_persist").await?;

        let mut failure: Option<EngineError> = None;
        for (index, entity) in entities.iter().enumerate() {
            if let Err(err) = session.save_or_update(entity).await {
                failure = Some(err);
                break;
            }
            // Flush and detach after every batch_size-th entity, counting
            // from one, so the first entity alone never triggers a flush.
            if (index + 1) % batch_size == 0 {
                if let Err(err) = session.flush().await {
                    failure = Some(err);
                    break;
                }
                if let Err(err) = session.clear().await {
                    failure = Some(err);
                    break;
                }
            }
        }

        match failure {
            None => {
                self.finish_tx(session, "batch_persist").await?;
                debug!(count = entities.len(), "batch persisted");
                Ok(())
            }
            Some(err) => {
                self.abort_tx(session, "batch_persist").await;
                Err(classify("batch_persist", T::NAME, err))
            }
        }
    }

    async fn execute_in(
        &self,
        session: &mut M::Session,
        query: &NamedQuery,
    ) -> RepositoryResult<()> {
        self.begin_tx(session, "delete_or_update").await?;
        match session.execute_update(query.name(), query.params()).await {
            Ok(affected) => {
                self.finish_tx(session, "delete_or_update").await?;
                debug!(affected, "bulk statement applied");
                Ok(())
            }
            Err(err) => {
                self.abort_tx(session, "delete_or_update").await;
                Err(classify_query("delete_or_update", T::NAME, query.name(), err))
            }
        }
    }
}

#[async_trait]
impl<T, M> Repository<T> for EntityRepository<T, M>
where
    T: Entity,
    M: MappingEngine,
{
    #[instrument(skip(self, entity), fields(entity = T::NAME))]
    async fn persist(&self, entity: T) -> RepositoryResult<T> {
        let mut session = self.open("persist").await?;
        let outcome = self.persist_in(&mut session, &entity).await;
        self.release(session, "persist").await;
        outcome
    }

    #[instrument(skip(self, entity), fields(entity = T::NAME, id = %entity.id()))]
    async fn delete(&self, entity: &T) -> RepositoryResult<()> {
        let mut session = self.open("delete").await?;
        let outcome = self.delete_in(&mut session, entity).await;
        self.release(session, "delete").await;
        outcome
    }

    #[instrument(skip(self, id), fields(entity = T::NAME, id = %id))]
    async fn find_by_id(&self, id: &T::Id, lock: LockMode) -> RepositoryResult<Option<T>> {
        let mut session = self.open("find_by_id").await?;
        let outcome = match session.fetch::<T>(id, lock).await {
            Ok(row) => {
                debug!(found = row.is_some(), "fetch complete");
                Ok(row)
            }
            Err(err) => Err(classify("find_by_id", T::NAME, err)),
        };
        self.release(session, "find_by_id").await;
        outcome
    }

    #[instrument(skip(self), fields(entity = T::NAME))]
    async fn find_all(&self, start: Option<u32>, limit: Option<u32>) -> RepositoryResult<Vec<T>> {
        let mut session = self.open("find_all").await?;
        let outcome = match session.scan::<T>(ResultWindow::new(start, limit)).await {
            Ok(rows) => {
                debug!(rows = rows.len(), "scan complete");
                Ok(rows)
            }
            Err(err) => Err(classify("find_all", T::NAME, err)),
        };
        self.release(session, "find_all").await;
        outcome
    }

    #[instrument(skip(self, query), fields(entity = T::NAME, query = query.map(|q| q.name())))]
    async fn find_by_query(&self, query: Option<&NamedQuery>) -> RepositoryResult<Vec<T>> {
        let query = match query {
            Some(query) => query,
            None => return Err(missing_query("find_by_query", T::NAME)),
        };

        let mut session = self.open("find_by_query").await?;
        let outcome = match session
            .query::<T>(query.name(), query.params(), query.window())
            .await
        {
            Ok(rows) => {
                debug!(rows = rows.len(), "query executed");
                Ok(rows)
            }
            Err(err) => Err(classify_query("find_by_query", T::NAME, query.name(), err)),
        };
        self.release(session, "find_by_query").await;
        outcome
    }

    #[instrument(skip(self, query), fields(entity = T::NAME, query = query.map(|q| q.name())))]
    async fn unique_result(&self, query: Option<&NamedQuery>) -> RepositoryResult<Option<T>> {
        let query = match query {
            Some(query) => query,
            None => return Err(missing_query("unique_result", T::NAME)),
        };

        let mut session = self.open("unique_result").await?;
        let outcome = match session.query_unique::<T>(query.name(), query.params()).await {
            Ok(row) => {
                debug!(found = row.is_some(), "unique query executed");
                Ok(row)
            }
            Err(err) => Err(classify_query("unique_result", T::NAME, query.name(), err)),
        };
        self.release(session, "unique_result").await;
        outcome
    }

    #[instrument(skip(self, entities), fields(entity = T::NAME, count = entities.len()))]
    async fn batch_persist(&self, entities: Vec<T>, batch_size: usize) -> RepositoryResult<()> {
        if batch_size == 0 {
            return Err(RepositoryError::Precondition(
                "batch size must be at least 1".to_string(),
            ));
        }

        let mut session = self.open("batch_persist").await?;
        let outcome = self.batch_persist_in(&mut session, &entities, batch_size).await;
        self.release(session, "batch_persist").await;
        outcome
    }

    #[instrument(skip(self, query), fields(entity = T::NAME, query = query.map(|q| q.name())))]
    async fn delete_or_update(&self, query: Option<&NamedQuery>) -> RepositoryResult<()> {
        let query = match query {
            Some(query) => query,
            None => return Err(missing_query("delete_or_update", T::NAME)),
        };

        let mut session = self.open("delete_or_update").await?;
        let outcome = self.execute_in(&mut session, query).await;
        self.release(session, "delete_or_update").await;
        outcome
    }

    #[instrument(skip(self), fields(entity = T::NAME))]
    async fn count(&self) -> RepositoryResult<u32> {
        let mut session = self.open("count").await?;
        let outcome = match session.count::<T>().await {
            Ok(total) => match u32::try_from(total) {
                Ok(total) => {
                    debug!(total, "count complete");
                    Ok(total)
                }
                Err(_) => Err(classify(
                    "count",
                    T::NAME,
                    EngineError::Store(format!(
                        "row count {total} exceeds the 32-bit count contract"
                    )),
                )),
            },
            Err(err) => Err(classify("count", T::NAME, err)),
        };
        self.release(session, "count").await;
        outcome
    }
}
