//! Spot repository interface

use async_trait::async_trait;

use super::model::{NewSpot, Spot, SpotFilter, SpotStatus};
use crate::domain::StoreResult;

#[async_trait]
pub trait SpotRepository: Send + Sync {
    async fn find_by_id(&self, id: i32) -> StoreResult<Option<Spot>>;
    async fn find_many(&self, filter: &SpotFilter) -> StoreResult<Vec<Spot>>;
    async fn create(&self, spot: NewSpot) -> StoreResult<Spot>;
    async fn update(&self, spot: &Spot) -> StoreResult<()>;

    /// Compare-and-set on `status`. Re-reads the spot and moves it from
    /// `from` to `to` only if it is still in `from`; returns whether the
    /// write happened.
    async fn transition_status(&self, id: i32, from: SpotStatus, to: SpotStatus)
        -> StoreResult<bool>;
}
