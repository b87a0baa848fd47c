//! In-process payment gateway
//!
//! Stands in for a real payment provider. Outcomes are remembered per
//! idempotency key, so a charge replayed by a retried transaction returns
//! the first decision instead of billing again.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{info, warn};

use crate::domain::{ChargeRequest, DomainResult, PaymentGateway, PaymentOutcome};

#[derive(Debug, Clone)]
enum Decision {
    Approve,
    Decline(String),
}

pub struct InMemoryPaymentGateway {
    decision: Decision,
    charges: DashMap<String, (ChargeRequest, PaymentOutcome)>,
    sequence: AtomicU64,
}

impl InMemoryPaymentGateway {
    /// Approves every charge.
    pub fn approving() -> Self {
        Self::with_decision(Decision::Approve)
    }

    /// Declines every charge with `reason`.
    pub fn declining(reason: impl Into<String>) -> Self {
        Self::with_decision(Decision::Decline(reason.into()))
    }

    fn with_decision(decision: Decision) -> Self {
        Self {
            decision,
            charges: DashMap::new(),
            sequence: AtomicU64::new(1),
        }
    }

    /// Number of distinct charges seen
    pub fn charge_count(&self) -> usize {
        self.charges.len()
    }

    pub fn charge_for(&self, idempotency_key: &str) -> Option<(ChargeRequest, PaymentOutcome)> {
        self.charges.get(idempotency_key).map(|e| e.value().clone())
    }
}

impl Default for InMemoryPaymentGateway {
    fn default() -> Self {
        Self::approving()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn charge(&self, request: ChargeRequest) -> DomainResult<PaymentOutcome> {
        if let Some(previous) = self.charges.get(&request.idempotency_key) {
            return Ok(previous.value().1.clone());
        }

        let outcome = match &self.decision {
            Decision::Approve => PaymentOutcome::Approved {
                reference: format!("pay-{:06}", self.sequence.fetch_add(1, Ordering::SeqCst)),
            },
            Decision::Decline(reason) => PaymentOutcome::Declined {
                reason: reason.clone(),
            },
        };

        match &outcome {
            PaymentOutcome::Approved { reference } => info!(
                session_id = request.session_id,
                amount = %request.amount,
                currency = %request.currency,
                reference = %reference,
                "payment approved"
            ),
            PaymentOutcome::Declined { reason } => warn!(
                session_id = request.session_id,
                amount = %request.amount,
                reason = %reason,
                "payment declined"
            ),
        }

        let stored = self
            .charges
            .entry(request.idempotency_key.clone())
            .or_insert((request, outcome));
        Ok(stored.value().1.clone())
    }
}
