//! Testing utilities for Depot
//!
//! This crate provides everything needed to test repository behavior
//! without a real store:
//! - An in-memory mapping engine with snapshot transactions
//! - Fault injection at every engine capability call
//! - Traffic counters for session and transaction discipline assertions
//! - Sample entities, fixtures and builders
//!
//! # Examples
//!
//! ```
//! use depot_testing::{engine_with_accounts, AccountBuilder};
//!
//! let account = AccountBuilder::new()
//!     .with_owner("alice")
//!     .with_balance(500)
//!     .build();
//!
//! let engine = engine_with_accounts(vec![account]);
//! assert_eq!(engine.committed_rows("account"), 1);
//! ```

pub mod builders;
pub mod fixtures;
pub mod memory;
pub mod telemetry;

// Re-export commonly used types
pub use builders::*;
pub use fixtures::*;
pub use memory::{EngineStats, FaultKind, FaultPoint, MemoryEngine, MemorySession, RowMutation};
pub use telemetry::init_test_tracing;

// Re-export testing dependencies for convenience
pub use fake;
