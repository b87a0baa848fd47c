pub mod assignment;
pub mod billing;
pub mod parking;
pub mod transaction;

// Re-export key types for convenience
pub use assignment::{Assignment, AssignmentEngine, AssignmentOutcome};
pub use billing::{BillingEngine, BillingResult, CostBreakdown, Estimate};
pub use parking::{
    Availability, CheckInOutcome, CheckInRequest, CheckOutOutcome, RejectionReason,
    SessionOrchestrator,
};
pub use transaction::{
    TransactionContext, TransactionManager, TransactionOptions, TransactionResult,
    TransactionStatus, TxHandle,
};
