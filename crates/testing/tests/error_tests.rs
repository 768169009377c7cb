//! Error-surface coverage: every engine failure reaches the caller as the
//! right taxonomy kind, with messages that name the operation and entity.

use serde::{Deserialize, Serialize};

use depot_repository::{
    Entity, EntityRepository, LockMode, NamedQuery, Repository, RepositoryError,
};
use depot_testing::{
    create_test_account_with_owner, engine_with_accounts, init_test_tracing, Account, FaultKind,
    FaultPoint, MemoryEngine, ACCOUNTS_BY_OWNER,
};

fn account_repository(engine: &MemoryEngine) -> EntityRepository<Account, MemoryEngine> {
    EntityRepository::new(engine.clone())
}

/// An out-of-date account shape mapped over the same extent, so stored
/// rows no longer deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LegacyAccount {
    id: i64,
    owner: String,
    balance: String,
}

impl Entity for LegacyAccount {
    type Id = i64;

    const NAME: &'static str = "account";

    fn id(&self) -> &i64 {
        &self.id
    }
}

#[tokio::test]
async fn test_store_failures_surface_as_persistence() {
    init_test_tracing();
    let engine = engine_with_accounts(vec![create_test_account_with_owner(11, "alice", 100)]);
    let repository = account_repository(&engine);

    engine.arm_fault(
        FaultPoint::Fetch,
        FaultKind::Store("disk quota exceeded".to_string()),
    );

    let err = repository.find_by_id(&11, LockMode::None).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Persistence { .. }));
    assert_eq!(err.code(), "PERSISTENCE_ERROR");
    assert!(err.is_retryable());

    let message = err.to_string();
    assert!(message.contains("find_by_id"));
    assert!(message.contains("account"));
    assert!(message.contains("disk quota exceeded"));
}

#[tokio::test]
async fn test_internal_failures_surface_as_unknown() {
    init_test_tracing();
    let engine = MemoryEngine::new();
    let repository = account_repository(&engine);

    engine.arm_fault(
        FaultPoint::Count,
        FaultKind::Internal("engine state poisoned".to_string()),
    );

    let err = repository.count().await.unwrap_err();
    assert!(matches!(err, RepositoryError::Unknown { .. }));
    assert_eq!(err.code(), "UNKNOWN_ERROR");
    assert!(!err.is_retryable());
    assert_eq!(err.operation(), Some("count"));
}

#[tokio::test]
async fn test_unknown_query_failures_name_the_query() {
    init_test_tracing();
    let engine = MemoryEngine::new();
    let repository = account_repository(&engine);

    let query = NamedQuery::builder("accounts.retired_query").build().unwrap();
    let err = repository.find_by_query(Some(&query)).await.unwrap_err();

    assert!(matches!(err, RepositoryError::UnknownQuery { .. }));
    assert_eq!(err.code(), "UNKNOWN_QUERY");
    assert!(!err.is_retryable());
    assert!(err.to_string().contains("accounts.retired_query"));
}

#[tokio::test]
async fn test_mapping_failures_surface_as_persistence() {
    init_test_tracing();
    let engine = engine_with_accounts(vec![create_test_account_with_owner(11, "alice", 100)]);
    let legacy_repository: EntityRepository<LegacyAccount, MemoryEngine> =
        EntityRepository::new(engine.clone());

    let err = legacy_repository
        .find_by_id(&11, LockMode::None)
        .await
        .unwrap_err();

    assert!(matches!(err, RepositoryError::Persistence { .. }));
    assert!(err.to_string().contains("mapping failed"));
}

#[tokio::test]
async fn test_precondition_failures_use_their_own_channel() {
    init_test_tracing();
    let engine = MemoryEngine::new();
    let repository = account_repository(&engine);

    let err = repository.batch_persist(Vec::new(), 0).await.unwrap_err();

    assert!(matches!(err, RepositoryError::Precondition(_)));
    assert_eq!(err.code(), "PRECONDITION_FAILED");
    assert!(!err.is_retryable());
    // Preconditions are caller mistakes, not failed store operations.
    assert_eq!(err.operation(), None);
}

#[tokio::test]
async fn test_rejected_descriptor_builds_become_preconditions() {
    init_test_tracing();
    let build_err = NamedQuery::builder("").build().unwrap_err();
    let err = RepositoryError::from(build_err);

    assert!(matches!(err, RepositoryError::Precondition(_)));
    assert!(err.to_string().contains("non-empty name"));
}

#[tokio::test]
async fn test_store_failures_in_queries_name_the_query() {
    init_test_tracing();
    let engine = engine_with_accounts(vec![create_test_account_with_owner(11, "alice", 100)]);
    let repository = account_repository(&engine);

    engine.arm_fault(
        FaultPoint::Query,
        FaultKind::Store("statement timed out".to_string()),
    );

    let query = NamedQuery::builder(ACCOUNTS_BY_OWNER)
        .param("owner", "alice")
        .build()
        .unwrap();
    let err = repository.find_by_query(Some(&query)).await.unwrap_err();

    let message = err.to_string();
    assert!(message.contains("unable to execute query `accounts.by_owner`"));
    assert!(message.contains("statement timed out"));
}

#[tokio::test]
async fn test_error_codes_are_stable_across_kinds() {
    init_test_tracing();
    let engine = engine_with_accounts(vec![create_test_account_with_owner(11, "alice", 100)]);
    let repository = account_repository(&engine);

    engine.arm_fault(FaultPoint::Fetch, FaultKind::Store("boom".to_string()));
    let persistence = repository.find_by_id(&11, LockMode::None).await.unwrap_err();

    engine.arm_fault(FaultPoint::Fetch, FaultKind::Internal("boom".to_string()));
    let unknown = repository.find_by_id(&11, LockMode::None).await.unwrap_err();

    let missing = repository.find_by_query(None).await.unwrap_err();
    let precondition = repository.batch_persist(Vec::new(), 0).await.unwrap_err();

    assert_eq!(persistence.code(), "PERSISTENCE_ERROR");
    assert_eq!(unknown.code(), "UNKNOWN_ERROR");
    assert_eq!(missing.code(), "UNKNOWN_QUERY");
    assert_eq!(precondition.code(), "PRECONDITION_FAILED");

    // Only store-reported failures are worth retrying.
    assert!(persistence.is_retryable());
    assert!(!unknown.is_retryable());
    assert!(!missing.is_retryable());
    assert!(!precondition.is_retryable());
}
