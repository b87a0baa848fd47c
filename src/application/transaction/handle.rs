//! Handle given to a unit of work
//!
//! Funnels repository access through the open store transaction and keeps
//! the context's savepoint stack in step with the store.

use chrono::Utc;
use uuid::Uuid;

use super::context::{Savepoint, SavepointId, TransactionContext};
use crate::domain::{
    AuditRepository, DomainResult, SessionRepository, SpotRepository, StoreTransaction,
    VehicleRepository,
};
use crate::shared::errors::{DomainError, SavepointError, SavepointFailure, StoreError};

pub struct TxHandle {
    tx: Box<dyn StoreTransaction>,
    context: TransactionContext,
    savepoint_seq: u32,
}

impl TxHandle {
    pub(crate) fn new(tx: Box<dyn StoreTransaction>, context: TransactionContext) -> Self {
        Self {
            tx,
            context,
            savepoint_seq: 0,
        }
    }

    pub(crate) fn into_parts(self) -> (Box<dyn StoreTransaction>, TransactionContext) {
        (self.tx, self.context)
    }

    pub(crate) fn replace_context(&mut self, context: TransactionContext) -> TransactionContext {
        std::mem::replace(&mut self.context, context)
    }

    pub fn context(&self) -> &TransactionContext {
        &self.context
    }

    pub fn transaction_id(&self) -> Uuid {
        self.context.id
    }

    pub fn spots(&self) -> &dyn SpotRepository {
        self.tx.spots()
    }

    pub fn vehicles(&self) -> &dyn VehicleRepository {
        self.tx.vehicles()
    }

    pub fn sessions(&self) -> &dyn SessionRepository {
        self.tx.sessions()
    }

    pub fn audit(&self) -> &dyn AuditRepository {
        self.tx.audit()
    }

    pub async fn create_savepoint(&mut self, name: &str) -> DomainResult<SavepointId> {
        self.savepoint_seq += 1;
        let id = SavepointId {
            transaction_id: self.context.id,
            seq: self.savepoint_seq,
        };
        self.tx.savepoint(&id.store_name()).await?;
        let depth = self.context.savepoints.len() + 1;
        self.context.savepoints.push(Savepoint {
            id,
            name: name.to_string(),
            depth,
            created_at: Utc::now(),
        });
        tracing::trace!(transaction_id = %self.context.id, savepoint = name, depth, "savepoint created");
        Ok(id)
    }

    /// Forgets the savepoint and every savepoint created after it. Their
    /// writes stay part of the transaction.
    pub async fn release_savepoint(&mut self, id: SavepointId) -> DomainResult<()> {
        let pos = self.position(id)?;
        self.tx
            .release_savepoint(&id.store_name())
            .await
            .map_err(|e| self.store_failure(id, e))?;
        self.context.savepoints.truncate(pos);
        Ok(())
    }

    /// Undoes writes issued after the savepoint. The savepoint itself stays
    /// live; later ones are discarded.
    pub async fn rollback_to_savepoint(&mut self, id: SavepointId) -> DomainResult<()> {
        let pos = self.position(id)?;
        self.tx
            .rollback_to_savepoint(&id.store_name())
            .await
            .map_err(|e| self.store_failure(id, e))?;
        self.context.savepoints.truncate(pos + 1);
        tracing::debug!(
            transaction_id = %self.context.id,
            savepoint = %self.context.savepoints[pos].name,
            "rolled back to savepoint"
        );
        Ok(())
    }

    fn position(&self, id: SavepointId) -> Result<usize, SavepointError> {
        let label = self.label(id);
        if id.transaction_id != self.context.id {
            return Err(SavepointError {
                transaction_id: self.context.id,
                savepoint: label,
                reason: SavepointFailure::ForeignContext(id.transaction_id),
            });
        }
        self.context
            .savepoints
            .iter()
            .position(|s| s.id == id)
            .ok_or(SavepointError {
                transaction_id: self.context.id,
                savepoint: label,
                reason: SavepointFailure::NotFound,
            })
    }

    fn label(&self, id: SavepointId) -> String {
        self.context
            .savepoints
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| id.store_name())
    }

    fn store_failure(&self, id: SavepointId, e: StoreError) -> DomainError {
        match e {
            StoreError::UnknownSavepoint(_) => DomainError::Savepoint(SavepointError {
                transaction_id: self.context.id,
                savepoint: self.label(id),
                reason: SavepointFailure::NotFound,
            }),
            other => DomainError::Store(other),
        }
    }
}
