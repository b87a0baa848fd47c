//! Session orchestrator
//!
//! Entry point for check-in, estimate and check-out. Each mutating call is
//! one managed transaction; audit entries are written in that transaction
//! and savepoints keep them when a later step is rolled back.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use rust_decimal::Decimal;
use tracing::{info, warn};
use validator::Validate;

use super::dto::{
    Availability, CheckInOutcome, CheckInReceipt, CheckInRequest, CheckOutOutcome,
    CheckOutReceipt, RejectionReason,
};
use crate::application::assignment::{AssignmentEngine, AssignmentOutcome};
use crate::application::billing::{BillingEngine, Estimate};
use crate::application::transaction::{TransactionManager, TransactionOptions, TxHandle};
use crate::domain::{
    AuditAction, AuditEntry, AuditFilter, ChargeRequest, Clock, DomainResult, NewAuditEntry,
    NewVehicle, ParkingSession, PaymentGateway, PaymentOutcome, RateSchedule,
    RateScheduleProvider, SessionFilter, Spot, SpotFilter, SpotStatus, Store, Vehicle,
    VehicleType,
};
use crate::shared::errors::{DomainError, StoreError};
use crate::shared::validations::normalize_plate;

/// Everything a unit of work needs, shared across retries
struct Collaborators {
    assignment: Arc<AssignmentEngine>,
    billing: Arc<BillingEngine>,
    rates: Arc<dyn RateScheduleProvider>,
    payments: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
}

pub struct SessionOrchestrator {
    manager: Arc<TransactionManager>,
    deps: Arc<Collaborators>,
}

impl SessionOrchestrator {
    pub fn new(
        manager: Arc<TransactionManager>,
        assignment: Arc<AssignmentEngine>,
        billing: Arc<BillingEngine>,
        rates: Arc<dyn RateScheduleProvider>,
        payments: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            manager,
            deps: Arc::new(Collaborators {
                assignment,
                billing,
                rates,
                payments,
                clock,
            }),
        }
    }

    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    fn store(&self) -> &dyn Store {
        self.manager.store().as_ref()
    }

    // ── Check-in ───────────────────────────────────────────────

    pub async fn check_in(&self, request: CheckInRequest) -> DomainResult<CheckInOutcome> {
        self.check_in_with(request, self.manager.options()).await
    }

    pub async fn check_in_with(
        &self,
        request: CheckInRequest,
        options: TransactionOptions,
    ) -> DomainResult<CheckInOutcome> {
        request
            .validate()
            .map_err(|e| DomainError::Validation(e.to_string()))?;
        let request = Arc::new(CheckInRequest {
            license_plate: normalize_plate(&request.license_plate),
            ..request
        });

        let deps = self.deps.clone();
        let work_request = request.clone();
        let result = self
            .manager
            .execute(options, move |tx| {
                let deps = deps.clone();
                let request = work_request.clone();
                async move { deps.check_in(tx, &request).await }.boxed()
            })
            .await;
        let attempts = result.attempts;
        let outcome = result.into_domain();

        match &outcome {
            Ok(CheckInOutcome::CheckedIn(receipt)) => info!(
                transaction_id = %receipt.transaction_id,
                plate = %request.license_plate,
                session_id = receipt.session.id,
                spot_id = receipt.location.spot_id,
                attempts,
                "checked in at {}",
                receipt.location
            ),
            Ok(CheckInOutcome::Rejected {
                transaction_id,
                reason,
                ..
            }) => info!(
                transaction_id = %transaction_id,
                plate = %request.license_plate,
                reason = %reason,
                "check-in rejected"
            ),
            Err(e) => warn!(plate = %request.license_plate, error = %e, "check-in failed"),
        }
        let label = outcome.as_ref().map_or("error", |o| o.as_str());
        metrics::counter!("parking_check_ins_total", "outcome" => label).increment(1);
        outcome
    }

    // ── Check-out ──────────────────────────────────────────────

    pub async fn check_out(&self, session_id: i32) -> DomainResult<CheckOutOutcome> {
        self.check_out_with(session_id, self.manager.options()).await
    }

    pub async fn check_out_with(
        &self,
        session_id: i32,
        options: TransactionOptions,
    ) -> DomainResult<CheckOutOutcome> {
        let deps = self.deps.clone();
        let result = self
            .manager
            .execute(options, move |tx| {
                let deps = deps.clone();
                async move { deps.check_out(tx, session_id).await }.boxed()
            })
            .await;
        let attempts = result.attempts;
        let outcome = result.into_domain();

        match &outcome {
            Ok(CheckOutOutcome::CheckedOut(receipt)) => info!(
                transaction_id = %receipt.transaction_id,
                session_id,
                total = %receipt.cost.total,
                attempts,
                "checked out"
            ),
            Ok(CheckOutOutcome::Rejected {
                transaction_id,
                reason,
                detail,
            }) => info!(
                transaction_id = %transaction_id,
                session_id,
                reason = %reason,
                detail = detail.as_deref().unwrap_or(""),
                "check-out rejected"
            ),
            Err(DomainError::SessionAlreadyClosed(_)) => {
                info!(session_id, "check-out of closed session refused")
            }
            Err(e) => warn!(session_id, error = %e, "check-out failed"),
        }
        let label = outcome.as_ref().map_or("error", |o| o.as_str());
        metrics::counter!("parking_check_outs_total", "outcome" => label).increment(1);
        outcome
    }

    // ── Read-only queries ──────────────────────────────────────

    /// Cost of an open session as of `as_of` (now when absent). Writes nothing.
    pub async fn estimate_checkout(
        &self,
        session_id: i32,
        as_of: Option<DateTime<Utc>>,
    ) -> DomainResult<Estimate> {
        let store = self.store();
        let session = find_session(store.sessions().find_by_id(session_id).await?, session_id)?;
        let vehicle = store
            .vehicles()
            .find_by_id(session.vehicle_id)
            .await?
            .ok_or_else(|| missing_vehicle(&session))?;
        let spot = store.spots().find_by_id(session.spot_id).await?;
        let schedule = self.deps.schedule(session.garage_id).await?;
        let as_of = as_of.unwrap_or_else(|| self.deps.clock.now());

        self.deps.billing.estimate_cost(
            &session,
            vehicle.vehicle_type,
            spot.as_ref(),
            &schedule,
            as_of,
        )
    }

    /// The spot a check-in would be offered right now, without claiming it.
    pub async fn find_best_spot(
        &self,
        vehicle_type: VehicleType,
        required_features: &[String],
        garage_id: Option<i32>,
    ) -> DomainResult<Option<Spot>> {
        self.deps
            .assignment
            .find_best_spot(self.store().spots(), vehicle_type, required_features, garage_id)
            .await
    }

    pub async fn availability(&self, garage_id: Option<i32>) -> DomainResult<Availability> {
        let spots = self
            .store()
            .spots()
            .find_many(&SpotFilter::default().in_garage(garage_id))
            .await?;

        let mut availability = Availability {
            garage_id,
            total: spots.len(),
            ..Default::default()
        };
        for spot in &spots {
            match spot.status {
                SpotStatus::Available => {
                    availability.available += 1;
                    *availability
                        .available_by_type
                        .entry(spot.spot_type)
                        .or_default() += 1;
                }
                SpotStatus::Occupied => availability.occupied += 1,
                SpotStatus::Reserved => availability.reserved += 1,
                SpotStatus::Maintenance => availability.maintenance += 1,
            }
        }
        Ok(availability)
    }

    pub async fn session(&self, session_id: i32) -> DomainResult<ParkingSession> {
        find_session(self.store().sessions().find_by_id(session_id).await?, session_id)
    }

    pub async fn audit_trail(&self, filter: &AuditFilter) -> DomainResult<Vec<AuditEntry>> {
        Ok(self.store().audit().find_many(filter).await?)
    }
}

// ── Units of work ──────────────────────────────────────────────

impl Collaborators {
    async fn check_in(&self, tx: &mut TxHandle, request: &CheckInRequest) -> DomainResult<CheckInOutcome> {
        let transaction_id = tx.transaction_id();
        let vehicle = resolve_vehicle(tx, &request.license_plate, request.vehicle_type).await?;

        let open = tx
            .sessions()
            .find_many(&SessionFilter::active_for_vehicle(vehicle.id))
            .await?;
        if !open.is_empty() {
            return Err(DomainError::VehicleAlreadyParked(vehicle.license_plate));
        }

        self.audit(
            tx,
            NewAuditEntry::new(transaction_id, AuditAction::CheckInRequested, self.clock.now())
                .vehicle(vehicle.id)
                .detail(vehicle.license_plate.clone()),
        )
        .await?;

        let reservation = tx.create_savepoint("reservation").await?;
        let assignment = match self
            .assignment
            .assign_spot(tx, &vehicle, &request.required_features, request.garage_id)
            .await
            .map_err(|e| match e {
                DomainError::Store(StoreError::Duplicate {
                    entity: "parking_session",
                    ..
                }) => StoreError::Conflict {
                    entity: "vehicle",
                    id: vehicle.id.to_string(),
                }
                .into(),
                e => e,
            })?
        {
            AssignmentOutcome::Assigned(assignment) => assignment,
            AssignmentOutcome::NoAvailability => {
                self.audit(
                    tx,
                    NewAuditEntry::new(transaction_id, AuditAction::CheckInRejected, self.clock.now())
                        .vehicle(vehicle.id)
                        .detail(RejectionReason::NoAvailability.as_str()),
                )
                .await?;
                return Ok(CheckInOutcome::Rejected {
                    transaction_id,
                    reason: RejectionReason::NoAvailability,
                    detail: None,
                });
            }
        };

        let quote = match self.schedule(assignment.session.garage_id).await {
            Ok(schedule) => self.billing.ensure_billable(
                &assignment.session,
                vehicle.vehicle_type,
                Some(&assignment.spot),
                &schedule,
            ),
            Err(e) => Err(e),
        };

        match quote {
            Ok(quote) => {
                tx.release_savepoint(reservation).await?;
                self.audit(
                    tx,
                    NewAuditEntry::new(transaction_id, AuditAction::SpotAssigned, self.clock.now())
                        .session(assignment.session.id)
                        .spot(assignment.spot.id)
                        .vehicle(vehicle.id)
                        .detail(assignment.location.to_string()),
                )
                .await?;
                Ok(CheckInOutcome::CheckedIn(CheckInReceipt {
                    transaction_id,
                    vehicle,
                    session: assignment.session,
                    location: assignment.location,
                    quote,
                }))
            }
            Err(
                e @ (DomainError::RateScheduleNotFound(_) | DomainError::RateNotConfigured { .. }),
            ) => {
                tx.rollback_to_savepoint(reservation).await?;
                let detail = e.to_string();
                self.audit(
                    tx,
                    NewAuditEntry::new(transaction_id, AuditAction::CheckInRolledBack, self.clock.now())
                        .spot(assignment.spot.id)
                        .vehicle(vehicle.id)
                        .detail(detail.clone()),
                )
                .await?;
                Ok(CheckInOutcome::Rejected {
                    transaction_id,
                    reason: RejectionReason::RateUnavailable,
                    detail: Some(detail),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn check_out(&self, tx: &mut TxHandle, session_id: i32) -> DomainResult<CheckOutOutcome> {
        let transaction_id = tx.transaction_id();
        let session = find_session(tx.sessions().find_by_id(session_id).await?, session_id)?;
        if !session.is_active() {
            return Err(DomainError::SessionAlreadyClosed(session_id));
        }
        let schedule = self.schedule(session.garage_id).await?;

        self.audit(
            tx,
            NewAuditEntry::new(transaction_id, AuditAction::CheckOutRequested, self.clock.now())
                .session(session.id)
                .spot(session.spot_id)
                .vehicle(session.vehicle_id),
        )
        .await?;

        let billing = tx.create_savepoint("billing").await?;
        let billed = self.billing.finalize_checkout(tx, session_id, &schedule).await?;

        let mut payment_reference = None;
        if billed.cost.total > Decimal::ZERO {
            let request = ChargeRequest {
                idempotency_key: format!("parking-session-{}", session_id),
                session_id,
                amount: billed.cost.total,
                currency: billed.cost.currency.clone(),
            };
            match self.payments.charge(request).await? {
                PaymentOutcome::Approved { reference } => payment_reference = Some(reference),
                PaymentOutcome::Declined { reason } => {
                    tx.rollback_to_savepoint(billing).await?;
                    self.audit(
                        tx,
                        NewAuditEntry::new(transaction_id, AuditAction::PaymentDeclined, self.clock.now())
                            .session(session.id)
                            .spot(session.spot_id)
                            .vehicle(session.vehicle_id)
                            .detail(reason.clone()),
                    )
                    .await?;
                    return Ok(CheckOutOutcome::Rejected {
                        transaction_id,
                        reason: RejectionReason::PaymentDeclined,
                        detail: Some(reason),
                    });
                }
            }
        }

        tx.release_savepoint(billing).await?;
        self.audit(
            tx,
            NewAuditEntry::new(transaction_id, AuditAction::SessionCompleted, self.clock.now())
                .session(session.id)
                .spot(session.spot_id)
                .vehicle(session.vehicle_id)
                .detail(format!("{} {}", billed.cost.total, billed.cost.currency)),
        )
        .await?;

        Ok(CheckOutOutcome::CheckedOut(CheckOutReceipt {
            transaction_id,
            session: billed.session,
            cost: billed.cost,
            payment_reference,
            spot_released: billed.spot_released,
        }))
    }

    async fn schedule(&self, garage_id: i32) -> DomainResult<RateSchedule> {
        self.rates
            .active_schedule(garage_id)
            .await?
            .ok_or(DomainError::RateScheduleNotFound(garage_id))
    }

    async fn audit(&self, tx: &TxHandle, entry: NewAuditEntry) -> DomainResult<()> {
        tx.audit().append(entry).await?;
        Ok(())
    }
}

/// Finds the vehicle by plate or registers it. An existing vehicle is locked
/// for update, so two check-ins of the same plate conflict instead of both
/// passing the active-session check. A plate registered by a concurrent
/// transaction surfaces as a conflict so the attempt is retried and sees the
/// committed row.
async fn resolve_vehicle(
    tx: &TxHandle,
    plate: &str,
    vehicle_type: VehicleType,
) -> DomainResult<Vehicle> {
    if let Some(vehicle) = tx.vehicles().find_by_plate(plate).await? {
        if vehicle.vehicle_type != vehicle_type {
            return Err(DomainError::VehicleTypeMismatch {
                plate: vehicle.license_plate,
                registered: vehicle.vehicle_type.to_string(),
                requested: vehicle_type.to_string(),
            });
        }
        return Ok(tx.vehicles().lock_for_update(vehicle.id).await?);
    }

    match tx.vehicles().create(NewVehicle::new(plate, vehicle_type)).await {
        Ok(vehicle) => Ok(vehicle),
        Err(StoreError::Duplicate { .. }) => Err(StoreError::Conflict {
            entity: "vehicle",
            id: plate.to_string(),
        }
        .into()),
        Err(e) => Err(e.into()),
    }
}

fn find_session(session: Option<ParkingSession>, session_id: i32) -> DomainResult<ParkingSession> {
    session.ok_or_else(|| DomainError::NotFound {
        entity: "parking_session",
        field: "id",
        value: session_id.to_string(),
    })
}

fn missing_vehicle(session: &ParkingSession) -> DomainError {
    DomainError::Invariant(format!(
        "session {} references missing vehicle {}",
        session.id, session.vehicle_id
    ))
}

// ── Tests ──────────────────────────────────────────────────────
