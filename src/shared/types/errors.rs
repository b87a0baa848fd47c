use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Coarse classification used by callers to decide how to react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad request data; never retried, surfaced verbatim.
    Input,
    /// Lost a race for shared state; retried by the transaction manager.
    Contention,
    /// Garage full or similar; a normal negative result.
    Capacity,
    /// Storage, timeout or configuration failure.
    Infrastructure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Contention => "contention",
            Self::Capacity => "capacity",
            Self::Infrastructure => "infrastructure",
        }
    }
}

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Not found: {entity} with {field}={value}")]
    NotFound {
        entity: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("Validation: {0}")]
    Validation(String),

    #[error("Invalid vehicle type: {0}")]
    InvalidVehicleType(String),

    #[error("Invalid parking duration: {minutes} minute(s) up to {as_of}")]
    InvalidDuration { minutes: i64, as_of: DateTime<Utc> },

    #[error("Parking session {0} is already closed")]
    SessionAlreadyClosed(i32),

    #[error("Vehicle {0} already has an active parking session")]
    VehicleAlreadyParked(String),

    #[error("Vehicle {plate} is registered as {registered}, not {requested}")]
    VehicleTypeMismatch {
        plate: String,
        registered: String,
        requested: String,
    },

    #[error("No rate schedule configured for garage {0}")]
    RateScheduleNotFound(i32),

    #[error("No {rate_type} rate configured for garage {garage_id}")]
    RateNotConfigured { garage_id: i32, rate_type: String },

    #[error("No parking spot available")]
    NoAvailability,

    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Savepoint(#[from] SavepointError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. }
            | Self::Validation(_)
            | Self::InvalidVehicleType(_)
            | Self::InvalidDuration { .. }
            | Self::SessionAlreadyClosed(_)
            | Self::VehicleAlreadyParked(_)
            | Self::VehicleTypeMismatch { .. }
            | Self::Savepoint(_) => ErrorKind::Input,
            Self::NoAvailability => ErrorKind::Capacity,
            Self::Store(e) if e.is_retryable() => ErrorKind::Contention,
            Self::Transaction(e) => e.kind(),
            Self::RateScheduleNotFound(_)
            | Self::RateNotConfigured { .. }
            | Self::Invariant(_)
            | Self::Store(_) => ErrorKind::Infrastructure,
        }
    }

    /// Whether the transaction manager may re-run the unit of work.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_retryable())
    }
}

/// Errors raised by a storage backend.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Write conflict on {entity} {id}")]
    Conflict { entity: &'static str, id: String },

    #[error("Deadlock: {0}")]
    Deadlock(String),

    #[error("Timed out waiting for a lock")]
    LockTimeout,

    #[error("Savepoint {0} does not exist")]
    UnknownSavepoint(String),

    #[error("Store transaction is no longer active")]
    Closed,

    #[error("Duplicate {entity}: {value}")]
    Duplicate { entity: &'static str, value: String },

    #[error("{entity} {id} does not exist")]
    Missing { entity: &'static str, id: i32 },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Conflicts and deadlocks are the storage signals that justify a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Deadlock(_))
    }
}

/// Which part of a managed transaction ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPhase {
    /// Waiting for the store to open the transaction or grant a lock.
    Acquire,
    /// Running the unit of work.
    Execute,
}

impl std::fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Acquire => write!(f, "acquire"),
            Self::Execute => write!(f, "execute"),
        }
    }
}

/// Failures surfaced by the transaction manager. Every variant carries the
/// id of the transaction context for log correlation.
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Transaction {transaction_id} timed out during {phase} after {elapsed_ms} ms")]
    Timeout {
        transaction_id: Uuid,
        phase: TimeoutPhase,
        elapsed_ms: u64,
    },

    #[error("Transaction {transaction_id} deadlocked after {attempts} attempt(s): {detail}")]
    Deadlock {
        transaction_id: Uuid,
        attempts: u32,
        detail: String,
    },

    #[error("Transaction {transaction_id} conflicted after {attempts} attempt(s): {detail}")]
    Conflict {
        transaction_id: Uuid,
        attempts: u32,
        detail: String,
    },

    #[error(transparent)]
    Savepoint(SavepointError),

    #[error("Transaction {transaction_id} aborted: {source}")]
    Aborted {
        transaction_id: Uuid,
        source: Box<DomainError>,
    },
}

impl TransactionError {
    pub fn transaction_id(&self) -> Uuid {
        match self {
            Self::Timeout { transaction_id, .. }
            | Self::Deadlock { transaction_id, .. }
            | Self::Conflict { transaction_id, .. }
            | Self::Aborted { transaction_id, .. } => *transaction_id,
            Self::Savepoint(e) => e.transaction_id,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Deadlock { .. } | Self::Conflict { .. } => ErrorKind::Contention,
            Self::Timeout { .. } => ErrorKind::Infrastructure,
            Self::Savepoint(_) => ErrorKind::Input,
            Self::Aborted { source, .. } => source.kind(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SavepointFailure {
    /// No savepoint with that id is live in the transaction.
    NotFound,
    /// The savepoint was created by another transaction context.
    ForeignContext(Uuid),
}

impl std::fmt::Display for SavepointFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "savepoint does not exist"),
            Self::ForeignContext(owner) => write!(f, "savepoint belongs to transaction {}", owner),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Savepoint {savepoint} in transaction {transaction_id}: {reason}")]
pub struct SavepointError {
    pub transaction_id: Uuid,
    pub savepoint: String,
    pub reason: SavepointFailure,
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_conflicts_are_contention() {
        let err = DomainError::from(StoreError::Conflict {
            entity: "spot",
            id: "7".into(),
        });
        assert!(err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::Contention);
    }

    #[test]
    fn unavailable_store_is_infrastructure() {
        let err = DomainError::from(StoreError::Unavailable("pool closed".into()));
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
    }

    #[test]
    fn aborted_transaction_reports_source_kind() {
        let err = TransactionError::Aborted {
            transaction_id: Uuid::new_v4(),
            source: Box::new(DomainError::SessionAlreadyClosed(3)),
        };
        assert_eq!(err.kind(), ErrorKind::Input);
        assert!(err.to_string().contains("already closed"));
    }

    #[test]
    fn capacity_is_not_retryable() {
        assert_eq!(DomainError::NoAvailability.kind(), ErrorKind::Capacity);
        assert!(!DomainError::NoAvailability.is_retryable());
    }
}
