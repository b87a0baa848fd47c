//! Parking sessions
//!
//! `SessionOrchestrator` composes assignment, billing and payment into the
//! check-in and check-out transactions.

pub mod dto;
mod orchestrator;

pub use dto::{
    Availability, CheckInOutcome, CheckInReceipt, CheckInRequest, CheckOutOutcome,
    CheckOutReceipt, RejectionReason,
};
pub use orchestrator::SessionOrchestrator;
