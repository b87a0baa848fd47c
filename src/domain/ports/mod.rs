//! Outbound ports
//!
//! Collaborators the core consumes but does not own: the clock, the garage
//! configuration that supplies rate schedules, and the payment gateway.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::rate_schedule::RateSchedule;
use super::repositories::DomainResult;

/// Source of "now". Injected so tests can pin time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Garage configuration provider
#[async_trait]
pub trait RateScheduleProvider: Send + Sync {
    /// Active schedule for the garage, `None` when the garage has none.
    async fn active_schedule(&self, garage_id: i32) -> DomainResult<Option<RateSchedule>>;
}

/// A charge request. `idempotency_key` is stable per session so a retried
/// unit of work cannot bill twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub idempotency_key: String,
    pub session_id: i32,
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PaymentOutcome {
    Approved { reference: String },
    Declined { reason: String },
}

/// Opaque payment collaborator: `charge(amount) → approved | declined`
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, request: ChargeRequest) -> DomainResult<PaymentOutcome>;
}
