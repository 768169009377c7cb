//! An in-memory mapping engine.
//!
//! [`MemoryEngine`] implements the full capability surface against plain
//! maps, so repository behavior can be tested without a database. It
//! models the parts of a real engine the repository's contract depends
//! on: snapshot transactions, a session cache with flush and detach
//! semantics, a named-query catalog, and injectable failures at every
//! capability call. Counters record session and transaction traffic for
//! leak and discipline assertions.
//!
//! Transactions clone the committed tables and publish the clone on
//! commit. Concurrent transactions are therefore last-writer-wins, which
//! is sufficient for a test double; real isolation belongs to real
//! stores.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use depot_query::{ParamMap, ResultWindow};
use depot_repository::{EngineError, EngineResult, Entity, LockMode, MappingEngine, Session};

/// One entity extent: serialized identifier key to serialized row.
type Table = BTreeMap<String, Value>;

/// All committed extents, keyed by entity name.
type Tables = HashMap<String, Table>;

/// Session-cache state per extent. `None` marks a pending delete.
type PendingTables = HashMap<String, BTreeMap<String, Option<Value>>>;

type SelectPredicate = Arc<dyn Fn(&Value, &ParamMap) -> bool + Send + Sync>;
type MutationFn = Arc<dyn Fn(&Value, &ParamMap) -> ErasedRowMutation + Send + Sync>;

/// The capability call a fault fires on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    OpenSession,
    Begin,
    Commit,
    Rollback,
    Close,
    Flush,
    Clear,
    SaveOrUpdate,
    Delete,
    Fetch,
    Scan,
    Query,
    QueryUnique,
    ExecuteUpdate,
    Count,
}

/// The error an armed fault materializes as when it fires.
#[derive(Debug, Clone)]
pub enum FaultKind {
    /// A store-reported failure.
    Store(String),
    /// A failure outside the store's reporting channel.
    Internal(String),
    /// An unknown-query report for the given name.
    UnknownQuery(String),
}

impl FaultKind {
    fn materialize(&self) -> EngineError {
        match self {
            Self::Store(message) => EngineError::Store(message.clone()),
            Self::Internal(message) => EngineError::Internal(message.clone()),
            Self::UnknownQuery(name) => EngineError::UnknownQuery(name.clone()),
        }
    }
}

/// What a registered bulk mutation does with one row.
pub enum RowMutation<T> {
    /// Leave the row untouched.
    Keep,
    /// Replace the row with this value.
    Update(T),
    /// Remove the row.
    Delete,
}

enum ErasedRowMutation {
    Keep,
    Update(Value),
    Delete,
}

enum RegisteredQuery {
    Select {
        entity: &'static str,
        predicate: SelectPredicate,
    },
    Mutation {
        entity: &'static str,
        apply: MutationFn,
    },
}

struct Fault {
    remaining_skips: usize,
    kind: FaultKind,
}

#[derive(Default)]
struct Stats {
    sessions_opened: AtomicU64,
    sessions_closed: AtomicU64,
    close_calls: AtomicU64,
    sessions_leaked: AtomicU64,
    transactions_begun: AtomicU64,
    transactions_committed: AtomicU64,
    transactions_rolled_back: AtomicU64,
    flushes: AtomicU64,
    clears: AtomicU64,
    store_calls: AtomicU64,
}

/// A point-in-time snapshot of engine traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    /// Sessions handed out.
    pub sessions_opened: u64,
    /// Sessions released through `close`.
    pub sessions_closed: u64,
    /// Total `close` invocations, including idempotent repeats.
    pub close_calls: u64,
    /// Sessions dropped without ever being closed.
    pub sessions_leaked: u64,
    /// Transactions begun.
    pub transactions_begun: u64,
    /// Transactions committed.
    pub transactions_committed: u64,
    /// Transactions rolled back.
    pub transactions_rolled_back: u64,
    /// Session flushes.
    pub flushes: u64,
    /// Session cache detaches.
    pub clears: u64,
    /// Data-touching capability calls (fetch, save, delete, scan, query,
    /// execute, count).
    pub store_calls: u64,
}

impl EngineStats {
    /// Sessions currently open.
    pub fn open_sessions(&self) -> u64 {
        self.sessions_opened - self.sessions_closed
    }
}

#[derive(Default)]
struct EngineShared {
    tables: RwLock<Tables>,
    queries: RwLock<HashMap<String, RegisteredQuery>>,
    faults: RwLock<HashMap<FaultPoint, Fault>>,
    lock_requests: RwLock<Vec<(String, String)>>,
    stats: Stats,
}

impl EngineShared {
    /// Fire the armed fault for `point`, if its countdown has elapsed.
    /// Faults are one-shot: firing disarms them.
    fn trigger(&self, point: FaultPoint) -> EngineResult<()> {
        let mut faults = self.faults.write();
        match faults.get_mut(&point) {
            Some(fault) if fault.remaining_skips == 0 => {
                let kind = fault.kind.clone();
                faults.remove(&point);
                debug!(?point, ?kind, "armed fault fired");
                Err(kind.materialize())
            }
            Some(fault) => {
                fault.remaining_skips -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn count_store_call(&self) {
        self.stats.store_calls.fetch_add(1, Ordering::Relaxed);
    }
}

/// The in-memory engine handle. Cloning shares the underlying store.
#[derive(Clone, Default)]
pub struct MemoryEngine {
    shared: Arc<EngineShared>,
}

impl MemoryEngine {
    /// Create an empty engine with no registered queries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a select query under `name`, bound to entity type `T`.
    ///
    /// The predicate decides row membership; rows that fail to map to `T`
    /// never match.
    pub fn register_select<T, F>(&self, name: impl Into<String>, predicate: F)
    where
        T: Entity,
        F: Fn(&T, &ParamMap) -> bool + Send + Sync + 'static,
    {
        let erased: SelectPredicate = Arc::new(move |row, params| {
            match serde_json::from_value::<T>(row.clone()) {
                Ok(entity) => predicate(&entity, params),
                Err(_) => false,
            }
        });
        self.shared.queries.write().insert(
            name.into(),
            RegisteredQuery::Select {
                entity: T::NAME,
                predicate: erased,
            },
        );
    }

    /// Register a bulk update/delete statement under `name`, bound to
    /// entity type `T`. The closure is applied to every row; updates and
    /// deletes count as affected rows.
    pub fn register_mutation<T, F>(&self, name: impl Into<String>, apply: F)
    where
        T: Entity,
        F: Fn(&T, &ParamMap) -> RowMutation<T> + Send + Sync + 'static,
    {
        let erased: MutationFn = Arc::new(move |row, params| {
            let entity = match serde_json::from_value::<T>(row.clone()) {
                Ok(entity) => entity,
                Err(_) => return ErasedRowMutation::Keep,
            };
            match apply(&entity, params) {
                RowMutation::Keep => ErasedRowMutation::Keep,
                RowMutation::Update(updated) => match serde_json::to_value(&updated) {
                    Ok(value) => ErasedRowMutation::Update(value),
                    Err(_) => ErasedRowMutation::Keep,
                },
                RowMutation::Delete => ErasedRowMutation::Delete,
            }
        });
        self.shared.queries.write().insert(
            name.into(),
            RegisteredQuery::Mutation {
                entity: T::NAME,
                apply: erased,
            },
        );
    }

    /// Write entities straight into the committed store, bypassing
    /// sessions. Test setup only.
    pub fn seed<T: Entity>(&self, entities: impl IntoIterator<Item = T>) -> EngineResult<()> {
        let mut tables = self.shared.tables.write();
        let table = tables.entry(T::NAME.to_string()).or_default();
        for entity in entities {
            let key = serde_json::to_string(entity.id())?;
            let value = serde_json::to_value(&entity)?;
            table.insert(key, value);
        }
        Ok(())
    }

    /// All committed rows of `T`, in the store's scan order.
    pub fn stored<T: Entity>(&self) -> Vec<T> {
        let tables = self.shared.tables.read();
        match tables.get(T::NAME) {
            Some(table) => table
                .values()
                .map(|row| {
                    serde_json::from_value(row.clone()).expect("stored row should deserialize")
                })
                .collect(),
            None => Vec::new(),
        }
    }

    /// Number of committed rows in the `entity` extent.
    pub fn committed_rows(&self, entity: &str) -> usize {
        self.shared
            .tables
            .read()
            .get(entity)
            .map_or(0, BTreeMap::len)
    }

    /// Arm a one-shot fault: the next call at `point` fails with `kind`.
    pub fn arm_fault(&self, point: FaultPoint, kind: FaultKind) {
        self.arm_fault_after(point, 0, kind);
    }

    /// Arm a one-shot fault that lets `skips` calls at `point` succeed
    /// before firing.
    pub fn arm_fault_after(&self, point: FaultPoint, skips: usize, kind: FaultKind) {
        self.shared.faults.write().insert(
            point,
            Fault {
                remaining_skips: skips,
                kind,
            },
        );
    }

    /// Upgrade-lock requests seen so far, as (entity, identifier key).
    pub fn lock_requests(&self) -> Vec<(String, String)> {
        self.shared.lock_requests.read().clone()
    }

    /// Snapshot the traffic counters.
    pub fn stats(&self) -> EngineStats {
        let stats = &self.shared.stats;
        EngineStats {
            sessions_opened: stats.sessions_opened.load(Ordering::Relaxed),
            sessions_closed: stats.sessions_closed.load(Ordering::Relaxed),
            close_calls: stats.close_calls.load(Ordering::Relaxed),
            sessions_leaked: stats.sessions_leaked.load(Ordering::Relaxed),
            transactions_begun: stats.transactions_begun.load(Ordering::Relaxed),
            transactions_committed: stats.transactions_committed.load(Ordering::Relaxed),
            transactions_rolled_back: stats.transactions_rolled_back.load(Ordering::Relaxed),
            flushes: stats.flushes.load(Ordering::Relaxed),
            clears: stats.clears.load(Ordering::Relaxed),
            store_calls: stats.store_calls.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl MappingEngine for MemoryEngine {
    type Session = MemorySession;

    async fn open_session(&self) -> EngineResult<Self::Session> {
        self.shared.trigger(FaultPoint::OpenSession)?;
        self.shared
            .stats
            .sessions_opened
            .fetch_add(1, Ordering::Relaxed);
        Ok(MemorySession {
            shared: Arc::clone(&self.shared),
            pending: PendingTables::new(),
            working: None,
            closed: false,
        })
    }
}

/// One unit of work against a [`MemoryEngine`].
pub struct MemorySession {
    shared: Arc<EngineShared>,
    pending: PendingTables,
    working: Option<Tables>,
    closed: bool,
}

impl MemorySession {
    fn ensure_open(&self) -> EngineResult<()> {
        if self.closed {
            return Err(EngineError::Internal(
                "session used after close".to_string(),
            ));
        }
        Ok(())
    }

    /// The rows this session sees: the transaction's working copy when
    /// one is open, the committed tables otherwise. Unflushed session-
    /// cache writes are not visible, as in a real engine.
    fn visible_rows(&self, entity: &str) -> Vec<Value> {
        match &self.working {
            Some(tables) => tables
                .get(entity)
                .map(|table| table.values().cloned().collect())
                .unwrap_or_default(),
            None => self
                .shared
                .tables
                .read()
                .get(entity)
                .map(|table| table.values().cloned().collect())
                .unwrap_or_default(),
        }
    }

    fn visible_row(&self, entity: &str, key: &str) -> Option<Value> {
        match &self.working {
            Some(tables) => tables.get(entity).and_then(|table| table.get(key)).cloned(),
            None => self
                .shared
                .tables
                .read()
                .get(entity)
                .and_then(|table| table.get(key))
                .cloned(),
        }
    }

    fn lookup_query(&self, name: &str) -> EngineResult<(&'static str, QueryKind)> {
        let queries = self.shared.queries.read();
        match queries.get(name) {
            None => Err(EngineError::UnknownQuery(name.to_string())),
            Some(RegisteredQuery::Select { entity, predicate }) => {
                Ok((*entity, QueryKind::Select(Arc::clone(predicate))))
            }
            Some(RegisteredQuery::Mutation { entity, apply }) => {
                Ok((*entity, QueryKind::Mutation(Arc::clone(apply))))
            }
        }
    }

    fn select_rows(
        &self,
        name: &str,
        expected_entity: &'static str,
        params: &ParamMap,
    ) -> EngineResult<Vec<Value>> {
        let (entity, kind) = self.lookup_query(name)?;
        let predicate = match kind {
            QueryKind::Select(predicate) => predicate,
            QueryKind::Mutation(_) => {
                return Err(EngineError::Store(format!(
                    "query `{name}` is a bulk statement, not a select"
                )))
            }
        };
        if entity != expected_entity {
            return Err(EngineError::Store(format!(
                "query `{name}` is bound to entity `{entity}`, not `{expected_entity}`"
            )));
        }

        Ok(self
            .visible_rows(entity)
            .into_iter()
            .filter(|row| predicate(row, params))
            .collect())
    }
}

enum QueryKind {
    Select(SelectPredicate),
    Mutation(MutationFn),
}

/// Merge session-cache writes into `target` and empty the cache.
fn apply_pending(target: &mut Tables, pending: &mut PendingTables) {
    for (entity, rows) in pending.drain() {
        let table = target.entry(entity).or_default();
        for (key, op) in rows {
            match op {
                Some(value) => {
                    table.insert(key, value);
                }
                None => {
                    table.remove(&key);
                }
            }
        }
    }
}

fn identifier_key<T: Entity>(id: &T::Id) -> EngineResult<String> {
    Ok(serde_json::to_string(id)?)
}

fn decode_rows<T: Entity>(rows: Vec<Value>) -> EngineResult<Vec<T>> {
    let decoded: Result<Vec<T>, serde_json::Error> =
        rows.into_iter().map(serde_json::from_value).collect();
    Ok(decoded?)
}

#[async_trait]
impl Session for MemorySession {
    async fn begin(&mut self) -> EngineResult<()> {
        self.ensure_open()?;
        self.shared.trigger(FaultPoint::Begin)?;
        if self.working.is_some() {
            return Err(EngineError::Internal(
                "transaction already open on this session".to_string(),
            ));
        }
        self.working = Some(self.shared.tables.read().clone());
        self.shared
            .stats
            .transactions_begun
            .fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn commit(&mut self) -> EngineResult<()> {
        self.ensure_open()?;
        // A commit fault leaves the transaction open so it can still be
        // rolled back.
        self.shared.trigger(FaultPoint::Commit)?;
        let mut working = match self.working.take() {
            Some(working) => working,
            None => {
                return Err(EngineError::Store(
                    "commit without an open transaction".to_string(),
                ))
            }
        };
        apply_pending(&mut working, &mut self.pending);
        *self.shared.tables.write() = working;
        self.shared
            .stats
            .transactions_committed
            .fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn rollback(&mut self) -> EngineResult<()> {
        self.ensure_open()?;
        self.shared.trigger(FaultPoint::Rollback)?;
        if self.working.take().is_some() {
            self.shared
                .stats
                .transactions_rolled_back
                .fetch_add(1, Ordering::Relaxed);
        }
        self.pending.clear();
        Ok(())
    }

    async fn fetch<T: Entity>(&mut self, id: &T::Id, lock: LockMode) -> EngineResult<Option<T>> {
        self.ensure_open()?;
        self.shared.trigger(FaultPoint::Fetch)?;
        self.shared.count_store_call();

        let key = identifier_key::<T>(id)?;
        if lock == LockMode::Upgrade {
            self.shared
                .lock_requests
                .write()
                .push((T::NAME.to_string(), key.clone()));
        }

        match self.visible_row(T::NAME, &key) {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => Ok(None),
        }
    }

    async fn save_or_update<T: Entity>(&mut self, entity: &T) -> EngineResult<T> {
        self.ensure_open()?;
        self.shared.trigger(FaultPoint::SaveOrUpdate)?;
        self.shared.count_store_call();

        let key = identifier_key::<T>(entity.id())?;
        let value = serde_json::to_value(entity)?;
        self.pending
            .entry(T::NAME.to_string())
            .or_default()
            .insert(key, Some(value));
        Ok(entity.clone())
    }

    async fn delete<T: Entity>(&mut self, entity: &T) -> EngineResult<()> {
        self.ensure_open()?;
        self.shared.trigger(FaultPoint::Delete)?;
        self.shared.count_store_call();

        let key = identifier_key::<T>(entity.id())?;
        let exists = match self.pending.get(T::NAME).and_then(|table| table.get(&key)) {
            Some(Some(_)) => true,
            Some(None) => false,
            None => self.visible_row(T::NAME, &key).is_some(),
        };
        if !exists {
            return Err(EngineError::Store(format!(
                "no persisted `{}` row with identifier {}",
                T::NAME,
                entity.id()
            )));
        }

        self.pending
            .entry(T::NAME.to_string())
            .or_default()
            .insert(key, None);
        Ok(())
    }

    async fn scan<T: Entity>(&mut self, window: ResultWindow) -> EngineResult<Vec<T>> {
        self.ensure_open()?;
        self.shared.trigger(FaultPoint::Scan)?;
        self.shared.count_store_call();

        let rows = window.apply_to(self.visible_rows(T::NAME));
        decode_rows(rows)
    }

    async fn query<T: Entity>(
        &mut self,
        name: &str,
        params: &ParamMap,
        window: ResultWindow,
    ) -> EngineResult<Vec<T>> {
        self.ensure_open()?;
        self.shared.trigger(FaultPoint::Query)?;
        self.shared.count_store_call();

        let rows = window.apply_to(self.select_rows(name, T::NAME, params)?);
        decode_rows(rows)
    }

    async fn query_unique<T: Entity>(
        &mut self,
        name: &str,
        params: &ParamMap,
    ) -> EngineResult<Option<T>> {
        self.ensure_open()?;
        self.shared.trigger(FaultPoint::QueryUnique)?;
        self.shared.count_store_call();

        let mut rows = self.select_rows(name, T::NAME, params)?;
        match rows.len() {
            0 => Ok(None),
            1 => {
                let row = rows.remove(0);
                Ok(Some(serde_json::from_value(row)?))
            }
            matched => Err(EngineError::NonUniqueResult {
                name: name.to_string(),
                rows: matched,
            }),
        }
    }

    async fn execute_update(&mut self, name: &str, params: &ParamMap) -> EngineResult<u64> {
        self.ensure_open()?;
        self.shared.trigger(FaultPoint::ExecuteUpdate)?;
        self.shared.count_store_call();

        let (entity, kind) = self.lookup_query(name)?;
        let apply = match kind {
            QueryKind::Mutation(apply) => apply,
            QueryKind::Select(_) => {
                return Err(EngineError::Store(format!(
                    "query `{name}` is a select, not a bulk statement"
                )))
            }
        };

        let working = match self.working.as_mut() {
            Some(working) => working,
            None => {
                return Err(EngineError::Store(
                    "bulk statement requires an open transaction".to_string(),
                ))
            }
        };
        let table = working.entry(entity.to_string()).or_default();

        let mut affected = 0u64;
        let keys: Vec<String> = table.keys().cloned().collect();
        for key in keys {
            let mutation = match table.get(&key) {
                Some(row) => apply(row, params),
                None => continue,
            };
            match mutation {
                ErasedRowMutation::Keep => {}
                ErasedRowMutation::Update(value) => {
                    table.insert(key, value);
                    affected += 1;
                }
                ErasedRowMutation::Delete => {
                    table.remove(&key);
                    affected += 1;
                }
            }
        }
        Ok(affected)
    }

    async fn count<T: Entity>(&mut self) -> EngineResult<u64> {
        self.ensure_open()?;
        self.shared.trigger(FaultPoint::Count)?;
        self.shared.count_store_call();

        let count = match &self.working {
            Some(tables) => tables.get(T::NAME).map_or(0, BTreeMap::len),
            None => self.shared.tables.read().get(T::NAME).map_or(0, BTreeMap::len),
        };
        Ok(count as u64)
    }

    async fn flush(&mut self) -> EngineResult<()> {
        self.ensure_open()?;
        self.shared.trigger(FaultPoint::Flush)?;
        self.shared.stats.flushes.fetch_add(1, Ordering::Relaxed);

        // Without a transaction there is nowhere durable to push writes;
        // they stay in the session cache until commit or discard.
        if let Some(working) = self.working.as_mut() {
            apply_pending(working, &mut self.pending);
        }
        Ok(())
    }

    async fn clear(&mut self) -> EngineResult<()> {
        self.ensure_open()?;
        self.shared.trigger(FaultPoint::Clear)?;
        self.shared.stats.clears.fetch_add(1, Ordering::Relaxed);

        // Detaching drops unflushed writes with the tracked instances,
        // exactly like a real session cache.
        self.pending.clear();
        Ok(())
    }

    async fn close(&mut self) -> EngineResult<()> {
        self.shared.stats.close_calls.fetch_add(1, Ordering::Relaxed);
        if self.closed {
            return Ok(());
        }

        // The session is released even when the close report fails; the
        // fault only affects what the caller sees.
        self.closed = true;
        self.working = None;
        self.pending.clear();
        self.shared
            .stats
            .sessions_closed
            .fetch_add(1, Ordering::Relaxed);
        self.shared.trigger(FaultPoint::Close)?;
        Ok(())
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        if !self.closed {
            self.shared
                .stats
                .sessions_leaked
                .fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Widget {
        id: i64,
        label: String,
    }

    impl Entity for Widget {
        type Id = i64;

        const NAME: &'static str = "widget";

        fn id(&self) -> &i64 {
            &self.id
        }
    }

    fn widget(id: i64, label: &str) -> Widget {
        Widget {
            id,
            label: label.to_string(),
        }
    }

    #[tokio::test]
    async fn test_commit_publishes_session_writes() {
        let engine = MemoryEngine::new();
        let mut session = engine.open_session().await.unwrap();

        session.begin().await.unwrap();
        session.save_or_update(&widget(1, "a")).await.unwrap();
        session.commit().await.unwrap();
        session.close().await.unwrap();

        assert_eq!(engine.stored::<Widget>(), vec![widget(1, "a")]);
    }

    #[tokio::test]
    async fn test_writes_without_commit_are_discarded() {
        let engine = MemoryEngine::new();
        let mut session = engine.open_session().await.unwrap();

        session.begin().await.unwrap();
        session.save_or_update(&widget(1, "a")).await.unwrap();
        session.flush().await.unwrap();
        session.close().await.unwrap();

        assert!(engine.stored::<Widget>().is_empty());
    }

    #[tokio::test]
    async fn test_rollback_discards_flushed_writes() {
        let engine = MemoryEngine::new();
        engine.seed([widget(1, "kept")]).unwrap();

        let mut session = engine.open_session().await.unwrap();
        session.begin().await.unwrap();
        session.save_or_update(&widget(2, "doomed")).await.unwrap();
        session.flush().await.unwrap();
        session.rollback().await.unwrap();
        session.close().await.unwrap();

        assert_eq!(engine.stored::<Widget>(), vec![widget(1, "kept")]);
    }

    #[tokio::test]
    async fn test_clear_detaches_unflushed_writes() {
        let engine = MemoryEngine::new();
        let mut session = engine.open_session().await.unwrap();

        session.begin().await.unwrap();
        session.save_or_update(&widget(1, "a")).await.unwrap();
        session.clear().await.unwrap();
        session.commit().await.unwrap();
        session.close().await.unwrap();

        assert!(engine.stored::<Widget>().is_empty());
    }

    #[tokio::test]
    async fn test_delete_of_missing_row_is_a_store_failure() {
        let engine = MemoryEngine::new();
        let mut session = engine.open_session().await.unwrap();

        session.begin().await.unwrap();
        let err = session.delete(&widget(9, "ghost")).await.unwrap_err();
        assert!(matches!(err, EngineError::Store(_)));
        session.rollback().await.unwrap();
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_armed_fault_fires_once_after_countdown() {
        let engine = MemoryEngine::new();
        engine.seed([widget(1, "a")]).unwrap();
        engine.arm_fault_after(
            FaultPoint::Fetch,
            1,
            FaultKind::Store("gremlin".to_string()),
        );

        let mut session = engine.open_session().await.unwrap();
        assert!(session.fetch::<Widget>(&1, LockMode::None).await.is_ok());
        let err = session.fetch::<Widget>(&1, LockMode::None).await.unwrap_err();
        assert!(matches!(err, EngineError::Store(_)));
        // Disarmed after firing.
        assert!(session.fetch::<Widget>(&1, LockMode::None).await.is_ok());
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_counts_calls() {
        let engine = MemoryEngine::new();
        let mut session = engine.open_session().await.unwrap();
        session.close().await.unwrap();
        session.close().await.unwrap();
        drop(session);

        let stats = engine.stats();
        assert_eq!(stats.sessions_opened, 1);
        assert_eq!(stats.sessions_closed, 1);
        assert_eq!(stats.close_calls, 2);
        assert_eq!(stats.sessions_leaked, 0);
    }

    #[tokio::test]
    async fn test_dropped_session_counts_as_leak() {
        let engine = MemoryEngine::new();
        let session = engine.open_session().await.unwrap();
        drop(session);

        assert_eq!(engine.stats().sessions_leaked, 1);
    }

    #[tokio::test]
    async fn test_upgrade_locks_are_recorded() {
        let engine = MemoryEngine::new();
        engine.seed([widget(7, "locked")]).unwrap();

        let mut session = engine.open_session().await.unwrap();
        session
            .fetch::<Widget>(&7, LockMode::Upgrade)
            .await
            .unwrap();
        session.close().await.unwrap();

        assert_eq!(
            engine.lock_requests(),
            vec![("widget".to_string(), "7".to_string())]
        );
    }
}
