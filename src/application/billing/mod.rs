//! Billing
//!
//! - `calculator` — pure cost calculation from a rate schedule
//! - `peak` — peak window overlap in garage-local time
//! - `BillingEngine` — estimates and check-out finalisation

pub mod calculator;
mod engine;
pub mod peak;

pub use calculator::{calculate_cost, AppliedDiscount, CostBreakdown, StayQuote};
pub use engine::{BillingEngine, BillingResult, Estimate};
