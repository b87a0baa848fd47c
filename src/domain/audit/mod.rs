//! Audit trail aggregate

pub mod model;

use async_trait::async_trait;

pub use model::{AuditAction, AuditEntry, AuditFilter, NewAuditEntry};

use crate::domain::StoreResult;

#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn append(&self, entry: NewAuditEntry) -> StoreResult<AuditEntry>;
    async fn find_many(&self, filter: &AuditFilter) -> StoreResult<Vec<AuditEntry>>;
}
