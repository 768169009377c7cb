//! Fluent builders for constructing test entities.
//!
//! Builders start from sensible defaults and let a test override only the
//! fields it cares about.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::fixtures::{Account, AuditEvent};

/// Builder for creating Account test instances
#[derive(Clone)]
pub struct AccountBuilder {
    id: i64,
    owner: String,
    balance: i64,
    created_at: DateTime<Utc>,
}

impl AccountBuilder {
    pub fn new() -> Self {
        Self {
            id: 1,
            owner: "test-owner".to_string(),
            balance: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn with_balance(mut self, balance: i64) -> Self {
        self.balance = balance;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn overdrawn(mut self) -> Self {
        self.balance = -100;
        self
    }

    pub fn build(self) -> Account {
        Account {
            id: self.id,
            owner: self.owner,
            balance: self.balance,
            created_at: self.created_at,
        }
    }
}

impl Default for AccountBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating AuditEvent test instances
#[derive(Clone)]
pub struct AuditEventBuilder {
    id: Uuid,
    action: String,
    recorded_at: DateTime<Utc>,
}

impl AuditEventBuilder {
    pub fn new() -> Self {
        Self {
            id: Uuid::now_v7(),
            action: "test-action".to_string(),
            recorded_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    pub fn with_recorded_at(mut self, recorded_at: DateTime<Utc>) -> Self {
        self.recorded_at = recorded_at;
        self
    }

    pub fn build(self) -> AuditEvent {
        AuditEvent {
            id: self.id,
            action: self.action,
            recorded_at: self.recorded_at,
        }
    }
}

impl Default for AuditEventBuilder {
    fn default() -> Self {
        Self::new()
    }
}
