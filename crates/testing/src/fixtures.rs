//! Test fixtures: sample entities and a ready-made query catalog.
//!
//! The entities here are deliberately plain. `Account` exercises integer
//! identifiers and value updates; `AuditEvent` exercises UUID identifiers.
//! The registered queries cover both shapes the repository can dispatch:
//! selects with parameter filtering, and bulk update/delete statements.

use chrono::{DateTime, Utc};
use fake::{
    faker::{lorem::en::Sentence, name::en::FirstName},
    Fake,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use depot_repository::Entity;

use crate::memory::{MemoryEngine, RowMutation};

/// Select accounts whose `owner` equals the `owner` parameter.
pub const ACCOUNTS_BY_OWNER: &str = "accounts.by_owner";

/// Select accounts with `balance` strictly above the `min_balance`
/// parameter.
pub const ACCOUNTS_RICHER_THAN: &str = "accounts.richer_than";

/// Bulk-delete accounts with `balance` strictly below the `threshold`
/// parameter.
pub const ACCOUNTS_PURGE_BELOW: &str = "accounts.purge_below";

/// Bulk-update every account's `balance` by adding the `amount`
/// parameter.
pub const ACCOUNTS_CREDIT_ALL: &str = "accounts.credit_all";

/// A bank-account entity with an integer identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub owner: String,
    pub balance: i64,
    pub created_at: DateTime<Utc>,
}

impl Entity for Account {
    type Id = i64;

    const NAME: &'static str = "account";

    fn id(&self) -> &i64 {
        &self.id
    }
}

/// An append-style audit entity with a UUID identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub action: String,
    pub recorded_at: DateTime<Utc>,
}

impl Entity for AuditEvent {
    type Id = Uuid;

    const NAME: &'static str = "audit_event";

    fn id(&self) -> &Uuid {
        &self.id
    }
}

/// Create a test account with a faked owner name.
pub fn create_test_account(id: i64, balance: i64) -> Account {
    create_test_account_with_owner(id, FirstName().fake::<String>(), balance)
}

/// Create a test account with a specific owner.
pub fn create_test_account_with_owner(id: i64, owner: impl Into<String>, balance: i64) -> Account {
    Account {
        id,
        owner: owner.into(),
        balance,
        created_at: Utc::now(),
    }
}

/// Create a test audit event with a faked action description.
pub fn create_test_audit_event() -> AuditEvent {
    AuditEvent {
        id: Uuid::now_v7(),
        action: Sentence(1..3).fake(),
        recorded_at: Utc::now(),
    }
}

/// Register the account query catalog on `engine`.
pub fn register_account_queries(engine: &MemoryEngine) {
    engine.register_select::<Account, _>(ACCOUNTS_BY_OWNER, |account, params| {
        params
            .get("owner")
            .and_then(Value::as_str)
            .map_or(false, |owner| account.owner == owner)
    });
    engine.register_select::<Account, _>(ACCOUNTS_RICHER_THAN, |account, params| {
        params
            .get("min_balance")
            .and_then(Value::as_i64)
            .map_or(false, |min| account.balance > min)
    });
    engine.register_mutation::<Account, _>(ACCOUNTS_PURGE_BELOW, |account, params| {
        match params.get("threshold").and_then(Value::as_i64) {
            Some(threshold) if account.balance < threshold => RowMutation::Delete,
            _ => RowMutation::Keep,
        }
    });
    engine.register_mutation::<Account, _>(ACCOUNTS_CREDIT_ALL, |account, params| {
        match params.get("amount").and_then(Value::as_i64) {
            Some(amount) => {
                let mut credited = account.clone();
                credited.balance += amount;
                RowMutation::Update(credited)
            }
            None => RowMutation::Keep,
        }
    });
}

/// Build an engine pre-seeded with `accounts` and the account query
/// catalog already registered.
pub fn engine_with_accounts(accounts: Vec<Account>) -> MemoryEngine {
    let engine = MemoryEngine::new();
    register_account_queries(&engine);
    engine
        .seed(accounts)
        .expect("account fixtures should serialize");
    engine
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_account() {
        let account = create_test_account(1, 250);
        assert_eq!(account.id, 1);
        assert_eq!(account.balance, 250);
        assert!(!account.owner.is_empty());
    }

    #[test]
    fn test_create_account_with_owner() {
        let account = create_test_account_with_owner(2, "miriam", 0);
        assert_eq!(account.owner, "miriam");
    }

    #[test]
    fn test_create_audit_event() {
        let event = create_test_audit_event();
        assert!(!event.action.is_empty());
        assert!(!event.id.is_nil());
    }

    #[test]
    fn test_audit_event_ids_are_unique() {
        let a = create_test_audit_event();
        let b = create_test_audit_event();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_engine_with_accounts_seeds_rows() {
        let engine = engine_with_accounts(vec![
            create_test_account(1, 100),
            create_test_account(2, 200),
        ]);
        assert_eq!(engine.committed_rows(Account::NAME), 2);
    }
}
