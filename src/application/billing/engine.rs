//! Billing engine
//!
//! Prices sessions and closes them out inside the caller's transaction.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::calculator::{calculate_cost, CostBreakdown, StayQuote};
use crate::application::transaction::TxHandle;
use crate::domain::{
    Clock, DomainResult, ParkingSession, RateSchedule, Spot, SpotStatus, VehicleType,
};
use crate::shared::errors::DomainError;

/// Cost of an open session as of some instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub session_id: i32,
    pub garage_id: i32,
    pub check_in_time: DateTime<Utc>,
    pub as_of: DateTime<Utc>,
    pub cost: CostBreakdown,
}

/// A session closed by `finalize_checkout`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingResult {
    pub session: ParkingSession,
    pub cost: CostBreakdown,
    /// False when the spot had been taken out of service meanwhile
    pub spot_released: bool,
}

pub struct BillingEngine {
    clock: Arc<dyn Clock>,
}

impl BillingEngine {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Prices an open session without touching storage.
    pub fn estimate_cost(
        &self,
        session: &ParkingSession,
        vehicle_type: VehicleType,
        spot: Option<&Spot>,
        schedule: &RateSchedule,
        as_of: DateTime<Utc>,
    ) -> DomainResult<Estimate> {
        if !session.is_active() {
            return Err(DomainError::SessionAlreadyClosed(session.id));
        }
        let cost = calculate_cost(schedule, &quote(session, vehicle_type, spot, as_of))?;
        Ok(Estimate {
            session_id: session.id,
            garage_id: session.garage_id,
            check_in_time: session.check_in_time,
            as_of,
            cost,
        })
    }

    /// Quotes one billing unit of a fresh session, which fails exactly when
    /// the schedule could not bill it at check-out.
    pub fn ensure_billable(
        &self,
        session: &ParkingSession,
        vehicle_type: VehicleType,
        spot: Option<&Spot>,
        schedule: &RateSchedule,
    ) -> DomainResult<CostBreakdown> {
        let as_of =
            session.check_in_time + chrono::Duration::minutes(session.rate_type.unit_minutes());
        calculate_cost(schedule, &quote(session, vehicle_type, spot, as_of))
    }

    /// Closes the session at `clock.now()` and frees its spot.
    pub async fn finalize_checkout(
        &self,
        tx: &TxHandle,
        session_id: i32,
        schedule: &RateSchedule,
    ) -> DomainResult<BillingResult> {
        let mut session = tx
            .sessions()
            .find_by_id(session_id)
            .await?
            .ok_or_else(|| DomainError::NotFound {
                entity: "parking_session",
                field: "id",
                value: session_id.to_string(),
            })?;
        if !session.is_active() {
            return Err(DomainError::SessionAlreadyClosed(session_id));
        }

        let vehicle = tx
            .vehicles()
            .find_by_id(session.vehicle_id)
            .await?
            .ok_or_else(|| {
                DomainError::Invariant(format!(
                    "session {} references missing vehicle {}",
                    session_id, session.vehicle_id
                ))
            })?;
        let spot = tx.spots().find_by_id(session.spot_id).await?;

        let now = self.clock.now();
        let cost = calculate_cost(
            schedule,
            &quote(&session, vehicle.vehicle_type, spot.as_ref(), now),
        )?;
        session.complete(now, cost.total);
        tx.sessions().update(&session).await?;

        let spot_released = self.release_spot(tx, &session).await?;

        tracing::debug!(
            transaction_id = %tx.transaction_id(),
            session_id,
            spot_id = session.spot_id,
            total = %cost.total,
            "session billed"
        );
        Ok(BillingResult {
            session,
            cost,
            spot_released,
        })
    }

    async fn release_spot(&self, tx: &TxHandle, session: &ParkingSession) -> DomainResult<bool> {
        let released = tx
            .spots()
            .transition_status(session.spot_id, SpotStatus::Occupied, SpotStatus::Available)
            .await?;
        if released {
            return Ok(true);
        }

        let status = tx
            .spots()
            .find_by_id(session.spot_id)
            .await?
            .map(|s| s.status);
        match status {
            Some(SpotStatus::Maintenance) => {
                tracing::warn!(
                    transaction_id = %tx.transaction_id(),
                    spot_id = session.spot_id,
                    session_id = session.id,
                    "spot went into maintenance during the session, leaving it there"
                );
                Ok(false)
            }
            other => Err(DomainError::Invariant(format!(
                "spot {} held by session {} was {}",
                session.spot_id,
                session.id,
                other.map_or("missing", |s| s.as_str())
            ))),
        }
    }
}

fn quote(
    session: &ParkingSession,
    vehicle_type: VehicleType,
    spot: Option<&Spot>,
    as_of: DateTime<Utc>,
) -> StayQuote {
    StayQuote {
        check_in: session.check_in_time,
        as_of,
        rate_type: session.rate_type,
        vehicle_type,
        hourly_rate_override: spot.and_then(|s| s.hourly_rate_override),
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::{Duration, TimeZone};
    use futures_util::FutureExt;
    use rust_decimal::Decimal;

    use super::*;
    use crate::application::transaction::{TransactionManager, TransactionOptions};
    use crate::domain::rate_schedule::GracePeriod;
    use crate::domain::{
        NewParkingSession, NewSpot, NewVehicle, RateType, SessionStatus, SpotType, Store,
    };
    use crate::infrastructure::{InMemoryStore, ManualClock};

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).unwrap()
    }

    fn sample_schedule() -> RateSchedule {
        let mut schedule = RateSchedule::hourly(1, "USD", dec("5"));
        schedule.grace_period = Some(GracePeriod {
            minutes: 15,
            rate_types: None,
        });
        schedule
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
    }

    struct Fixture {
        store: Arc<InMemoryStore>,
        clock: Arc<ManualClock>,
        engine: Arc<BillingEngine>,
        session: ParkingSession,
    }

    async fn sample_fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let spot = store
            .spots()
            .create(NewSpot::new(1, 1, "A", 1, SpotType::Standard).with_status(SpotStatus::Occupied))
            .await
            .unwrap();
        let vehicle = store
            .vehicles()
            .create(NewVehicle::new("ABC123", VehicleType::Standard))
            .await
            .unwrap();
        let session = store
            .sessions()
            .create(NewParkingSession {
                garage_id: 1,
                spot_id: spot.id,
                vehicle_id: vehicle.id,
                check_in_time: start(),
                rate_type: RateType::Hourly,
            })
            .await
            .unwrap();
        let clock = Arc::new(ManualClock::new(start()));
        let engine = Arc::new(BillingEngine::new(clock.clone()));
        Fixture {
            store,
            clock,
            engine,
            session,
        }
    }

    async fn checkout(fixture: &Fixture) -> DomainResult<BillingResult> {
        let manager = TransactionManager::new(fixture.store.clone());
        let engine = fixture.engine.clone();
        let session_id = fixture.session.id;
        manager
            .execute(TransactionOptions::default().without_retry(), move |tx| {
                let engine = engine.clone();
                async move {
                    let schedule = sample_schedule();
                    engine.finalize_checkout(tx, session_id, &schedule).await
                }
                .boxed()
            })
            .await
            .into_domain()
    }

    #[tokio::test]
    async fn estimate_is_pure() {
        let fixture = sample_fixture().await;
        let as_of = start() + Duration::minutes(75);

        let first = fixture
            .engine
            .estimate_cost(&fixture.session, VehicleType::Standard, None, &sample_schedule(), as_of)
            .unwrap();
        let second = fixture
            .engine
            .estimate_cost(&fixture.session, VehicleType::Standard, None, &sample_schedule(), as_of)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first.cost.total, dec("10.00"));
        let stored = fixture
            .store
            .sessions()
            .find_by_id(fixture.session.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, fixture.session);
    }

    #[tokio::test]
    async fn estimate_matches_checkout_at_same_instant() {
        let fixture = sample_fixture().await;
        fixture.clock.advance(Duration::minutes(75));
        let estimate = fixture
            .engine
            .estimate_cost(
                &fixture.session,
                VehicleType::Standard,
                None,
                &sample_schedule(),
                fixture.clock.now(),
            )
            .unwrap();

        let billed = checkout(&fixture).await.unwrap();
        assert_eq!(billed.cost, estimate.cost);
        assert_eq!(billed.session.status, SessionStatus::Completed);
        assert_eq!(billed.session.total_amount, Some(dec("10.00")));
        assert!(billed.spot_released);

        let spot = fixture
            .store
            .spots()
            .find_by_id(fixture.session.spot_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(spot.status, SpotStatus::Available);
    }

    #[tokio::test]
    async fn closed_session_cannot_be_billed_again() {
        let fixture = sample_fixture().await;
        fixture.clock.advance(Duration::minutes(30));
        let first = checkout(&fixture).await.unwrap();

        fixture.clock.advance(Duration::hours(5));
        let second = checkout(&fixture).await;
        assert!(matches!(second, Err(DomainError::SessionAlreadyClosed(id)) if id == fixture.session.id));

        let stored = fixture
            .store
            .sessions()
            .find_by_id(fixture.session.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.total_amount, first.session.total_amount);
    }

    #[tokio::test]
    async fn spot_in_maintenance_is_left_alone() {
        let fixture = sample_fixture().await;
        let mut spot = fixture
            .store
            .spots()
            .find_by_id(fixture.session.spot_id)
            .await
            .unwrap()
            .unwrap();
        spot.status = SpotStatus::Maintenance;
        fixture.store.spots().update(&spot).await.unwrap();
        fixture.clock.advance(Duration::minutes(30));

        let billed = checkout(&fixture).await.unwrap();
        assert!(!billed.spot_released);
    }

    #[tokio::test]
    async fn estimate_rejects_closed_session() {
        let fixture = sample_fixture().await;
        let mut closed = fixture.session.clone();
        closed.complete(start() + Duration::minutes(20), dec("5"));
        let result = fixture.engine.estimate_cost(
            &closed,
            VehicleType::Standard,
            None,
            &sample_schedule(),
            start() + Duration::minutes(40),
        );
        assert!(matches!(result, Err(DomainError::SessionAlreadyClosed(_))));
    }

    #[test]
    fn billable_quote_needs_rate_tier() {
        let clock = Arc::new(ManualClock::new(start()));
        let engine = BillingEngine::new(clock);
        let mut session = NewParkingSession {
            garage_id: 1,
            spot_id: 1,
            vehicle_id: 1,
            check_in_time: start(),
            rate_type: RateType::Hourly,
        }
        .into_session(1);
        let quote = engine
            .ensure_billable(&session, VehicleType::Compact, None, &sample_schedule())
            .unwrap();
        assert_eq!(quote.total, dec("5.00"));

        session.rate_type = RateType::Weekly;
        assert!(matches!(
            engine.ensure_billable(&session, VehicleType::Compact, None, &sample_schedule()),
            Err(DomainError::RateNotConfigured { .. })
        ));
    }
}
