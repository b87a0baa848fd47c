//! Spot assignment engine

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;

use super::compatibility::eligible_spot_types;
use super::scoring::{rank_candidates, Candidate};
use crate::application::transaction::TxHandle;
use crate::domain::{
    Clock, DomainResult, NewParkingSession, ParkingSession, RateType, Spot, SpotFilter,
    SpotLocation, SpotRepository, SpotStatus, Vehicle, VehicleType,
};
use crate::shared::errors::StoreError;

/// A spot claimed for a vehicle along with the session that holds it
#[derive(Debug, Clone, Serialize)]
pub struct Assignment {
    pub spot: Spot,
    pub location: SpotLocation,
    pub session: ParkingSession,
    /// Times the best candidate was taken by someone else before a claim stuck
    pub revalidations: u32,
}

#[derive(Debug, Clone)]
pub enum AssignmentOutcome {
    Assigned(Assignment),
    NoAvailability,
}

pub struct AssignmentEngine {
    clock: Arc<dyn Clock>,
    default_rate_types: HashMap<VehicleType, RateType>,
}

impl AssignmentEngine {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            default_rate_types: HashMap::new(),
        }
    }

    pub fn with_default_rate_types(mut self, rate_types: HashMap<VehicleType, RateType>) -> Self {
        self.default_rate_types = rate_types;
        self
    }

    /// Rate type a new session starts on. Hourly unless configured.
    pub fn default_rate_type(&self, vehicle_type: VehicleType) -> RateType {
        self.default_rate_types
            .get(&vehicle_type)
            .copied()
            .unwrap_or_default()
    }

    /// Best available spot without claiming it.
    pub async fn find_best_spot(
        &self,
        spots: &dyn SpotRepository,
        vehicle_type: VehicleType,
        required_features: &[String],
        garage_id: Option<i32>,
    ) -> DomainResult<Option<Spot>> {
        let ranked = candidates(spots, vehicle_type, required_features, garage_id, &HashSet::new()).await?;
        Ok(ranked.into_iter().next().map(|c| c.spot))
    }

    /// Claims the best spot for `vehicle` and opens a session on it, inside
    /// the caller's transaction.
    ///
    /// A candidate lost to a concurrent claim is excluded and ranking starts
    /// over. After as many losses as there were candidates initially the
    /// attempt gives up with a conflict so the transaction manager decides
    /// whether to retry.
    pub async fn assign_spot(
        &self,
        tx: &TxHandle,
        vehicle: &Vehicle,
        required_features: &[String],
        garage_id: Option<i32>,
    ) -> DomainResult<AssignmentOutcome> {
        let mut contested: HashSet<i32> = HashSet::new();
        let mut budget: Option<usize> = None;

        loop {
            let ranked = candidates(
                tx.spots(),
                vehicle.vehicle_type,
                required_features,
                garage_id,
                &contested,
            )
            .await?;
            let budget = *budget.get_or_insert(ranked.len());

            let Some(best) = ranked.into_iter().next() else {
                if contested.is_empty() {
                    tracing::debug!(
                        transaction_id = %tx.transaction_id(),
                        plate = %vehicle.license_plate,
                        "no compatible spot available"
                    );
                    return Ok(AssignmentOutcome::NoAvailability);
                }
                return Err(exhausted(&contested).into());
            };

            let spot_id = best.spot.id;
            let claimed = tx
                .spots()
                .transition_status(spot_id, SpotStatus::Available, SpotStatus::Occupied)
                .await?;

            if claimed {
                let mut spot = best.spot;
                spot.status = SpotStatus::Occupied;
                let session = tx
                    .sessions()
                    .create(NewParkingSession {
                        garage_id: spot.garage_id,
                        spot_id,
                        vehicle_id: vehicle.id,
                        check_in_time: self.clock.now(),
                        rate_type: self.default_rate_type(vehicle.vehicle_type),
                    })
                    .await?;

                tracing::debug!(
                    transaction_id = %tx.transaction_id(),
                    spot_id,
                    session_id = session.id,
                    revalidations = contested.len(),
                    "spot assigned"
                );
                return Ok(AssignmentOutcome::Assigned(Assignment {
                    location: spot.location(),
                    spot,
                    session,
                    revalidations: contested.len() as u32,
                }));
            }

            metrics::counter!("parking_assignment_revalidations_total").increment(1);
            tracing::debug!(
                transaction_id = %tx.transaction_id(),
                spot_id,
                "candidate taken concurrently, re-ranking"
            );
            contested.insert(spot_id);
            if contested.len() >= budget {
                return Err(exhausted(&contested).into());
            }
        }
    }
}

async fn candidates(
    spots: &dyn SpotRepository,
    vehicle_type: VehicleType,
    required_features: &[String],
    garage_id: Option<i32>,
    excluded: &HashSet<i32>,
) -> DomainResult<Vec<Candidate>> {
    let filter = SpotFilter::available()
        .in_garage(garage_id)
        .of_types(eligible_spot_types(vehicle_type, required_features));
    let found = spots.find_many(&filter).await?;
    let remaining = found.into_iter().filter(|s| !excluded.contains(&s.id)).collect();
    Ok(rank_candidates(remaining, vehicle_type, required_features))
}

fn exhausted(contested: &HashSet<i32>) -> StoreError {
    let mut ids: Vec<i32> = contested.iter().copied().collect();
    ids.sort_unstable();
    let ids: Vec<String> = ids.iter().map(i32::to_string).collect();
    StoreError::Conflict {
        entity: "spot",
        id: ids.join(","),
    }
}

// ── Tests ──────────────────────────────────────────────────────
