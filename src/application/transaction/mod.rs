//! Managed transactions
//!
//! - `TransactionManager` — begin / run / commit with timeouts and retry
//! - `TxHandle` — repository access and savepoints for a unit of work
//! - `TransactionContext` — observable record of one managed transaction

mod context;
mod handle;
mod manager;
mod options;
mod stats;

pub use context::{Savepoint, SavepointId, TransactionContext, TransactionStatus};
pub use handle::TxHandle;
pub use manager::{TransactionManager, TransactionResult};
pub use options::TransactionOptions;
pub use stats::{TransactionStats, TransactionStatsSnapshot};
