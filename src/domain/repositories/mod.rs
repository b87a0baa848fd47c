//! Repository traits for the domain layer
//!
//! Contains:
//! - `Store` — process-wide storage handle: opens transactions and serves
//!   non-transactional reads
//! - `StoreTransaction` — per-aggregate repositories scoped to one open
//!   transaction, plus savepoints, commit and rollback
//! - `DomainResult` / `StoreResult` — standard result types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::audit::AuditRepository;
use super::session::SessionRepository;
use super::spot::SpotRepository;
use super::vehicle::VehicleRepository;
use crate::shared::errors::{DomainError, StoreError};

/// Result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;

/// Result type for storage calls
pub type StoreResult<T> = Result<T, StoreError>;

/// How aggressively concurrent readers and writers conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "read_uncommitted",
            Self::ReadCommitted => "read_committed",
            Self::RepeatableRead => "repeatable_read",
            Self::Serializable => "serializable",
        }
    }
}

impl Default for IsolationLevel {
    fn default() -> Self {
        Self::ReadCommitted
    }
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Decides which of two colliding transactions is aborted: the higher
/// priority one survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionPriority {
    Low,
    Normal,
    High,
    Critical,
}

impl TransactionPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Divisor applied to retry backoff so higher priorities come back first.
    pub fn backoff_divisor(&self) -> u32 {
        match self {
            Self::Low | Self::Normal => 1,
            Self::High => 2,
            Self::Critical => 4,
        }
    }
}

impl Default for TransactionPriority {
    fn default() -> Self {
        Self::Normal
    }
}

impl std::fmt::Display for TransactionPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parameters for `Store::begin`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BeginOptions {
    pub isolation: IsolationLevel,
    pub priority: TransactionPriority,
}

// ── Store ───────────────────────────────────────────────────────

/// Storage handle constructed once per process and shared by reference.
///
/// The accessor methods serve auto-committed, non-transactional calls
/// (availability previews, estimates, seeding). Every mutation made by the
/// check-in/check-out paths goes through `begin`.
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self, options: BeginOptions) -> StoreResult<Box<dyn StoreTransaction>>;

    fn spots(&self) -> &dyn SpotRepository;
    fn vehicles(&self) -> &dyn VehicleRepository;
    fn sessions(&self) -> &dyn SessionRepository;
    fn audit(&self) -> &dyn AuditRepository;
}

/// One open storage transaction.
///
/// Dropping it without `commit` discards every write, which is what makes
/// cancellation of an in-flight operation safe.
#[async_trait]
pub trait StoreTransaction: Send + Sync {
    fn spots(&self) -> &dyn SpotRepository;
    fn vehicles(&self) -> &dyn VehicleRepository;
    fn sessions(&self) -> &dyn SessionRepository;
    fn audit(&self) -> &dyn AuditRepository;

    async fn savepoint(&self, name: &str) -> StoreResult<()>;
    async fn release_savepoint(&self, name: &str) -> StoreResult<()>;
    /// Undo writes issued after `name`; the savepoint itself stays live.
    async fn rollback_to_savepoint(&self, name: &str) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
