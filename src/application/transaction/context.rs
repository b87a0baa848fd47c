//! Transaction context
//!
//! Observable record of one managed transaction: identity, lifecycle
//! status, savepoint stack and caller metadata. The same context id spans
//! every retry attempt of an `execute` call.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::options::TransactionOptions;
use crate::domain::{IsolationLevel, TransactionPriority};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Active,
    Committed,
    /// Work failed with a non-contention error and its writes were undone.
    RolledBack,
    /// Contention or savepoint failure that outlived the retry budget.
    Failed,
    Timeout,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Active)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Handle to a savepoint, valid only within the context that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SavepointId {
    pub transaction_id: Uuid,
    pub seq: u32,
}

impl SavepointId {
    /// Identifier sent to the store; never derived from caller input.
    pub(crate) fn store_name(&self) -> String {
        format!("sp_{}", self.seq)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Savepoint {
    pub id: SavepointId,
    /// Caller label, e.g. "reservation"
    pub name: String,
    /// 1 for the outermost savepoint
    pub depth: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionContext {
    pub id: Uuid,
    /// Set for nested units run inside another context's savepoint
    pub parent_id: Option<Uuid>,
    pub status: TransactionStatus,
    pub isolation: IsolationLevel,
    pub priority: TransactionPriority,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// 1-based attempt number
    pub attempt: u32,
    pub savepoints: Vec<Savepoint>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl TransactionContext {
    pub fn new(options: &TransactionOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: None,
            status: TransactionStatus::Pending,
            isolation: options.isolation,
            priority: options.priority,
            started_at: Utc::now(),
            ended_at: None,
            attempt: 0,
            savepoints: Vec::new(),
            metadata: options.metadata.clone(),
        }
    }

    /// Context for a nested unit named `name` running inside this one.
    pub fn child(&self, name: &str) -> Self {
        let mut metadata = self.metadata.clone();
        metadata.insert("nested".to_string(), serde_json::Value::String(name.to_string()));
        Self {
            id: Uuid::new_v4(),
            parent_id: Some(self.id),
            status: TransactionStatus::Active,
            isolation: self.isolation,
            priority: self.priority,
            started_at: Utc::now(),
            ended_at: None,
            attempt: 1,
            savepoints: Vec::new(),
            metadata,
        }
    }

    pub fn depth(&self) -> usize {
        self.savepoints.len()
    }

    pub fn finish(&mut self, status: TransactionStatus) {
        self.status = status;
        self.ended_at = Some(Utc::now());
    }

    pub fn elapsed_ms(&self) -> u64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds().max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_links_to_parent() {
        let parent = TransactionContext::new(
            &TransactionOptions::default().with_metadata("operation", "check_in"),
        );
        let child = parent.child("reservation");
        assert_eq!(child.parent_id, Some(parent.id));
        assert_ne!(child.id, parent.id);
        assert_eq!(child.metadata["operation"], serde_json::json!("check_in"));
        assert_eq!(child.metadata["nested"], serde_json::json!("reservation"));
    }

    #[test]
    fn finish_is_terminal() {
        let mut ctx = TransactionContext::new(&TransactionOptions::default());
        assert!(!ctx.status.is_terminal());
        ctx.finish(TransactionStatus::Committed);
        assert!(ctx.status.is_terminal());
        assert!(ctx.ended_at.is_some());
    }
}
