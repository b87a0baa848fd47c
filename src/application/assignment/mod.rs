//! Spot assignment
//!
//! - `compatibility` — which spot types and features fit a vehicle
//! - `scoring` — ordering of eligible spots
//! - `AssignmentEngine` — claims the best spot inside a transaction

pub mod compatibility;
mod engine;
pub mod scoring;

pub use engine::{Assignment, AssignmentEngine, AssignmentOutcome};
pub use scoring::Candidate;
