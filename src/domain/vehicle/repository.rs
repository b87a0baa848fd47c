//! Vehicle repository interface

use async_trait::async_trait;

use super::model::{NewVehicle, Vehicle};
use crate::domain::StoreResult;

#[async_trait]
pub trait VehicleRepository: Send + Sync {
    async fn find_by_id(&self, id: i32) -> StoreResult<Option<Vehicle>>;
    /// Looks up by normalised plate.
    async fn find_by_plate(&self, license_plate: &str) -> StoreResult<Option<Vehicle>>;
    /// Fails with `StoreError::Duplicate` when the plate is taken.
    async fn create(&self, vehicle: NewVehicle) -> StoreResult<Vehicle>;
    /// Takes the vehicle row for update; two transactions locking the same
    /// vehicle conflict. Fails with `StoreError::Missing` when absent.
    async fn lock_for_update(&self, id: i32) -> StoreResult<Vehicle>;
}
