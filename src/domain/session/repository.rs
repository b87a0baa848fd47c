//! Parking session repository interface

use async_trait::async_trait;

use super::model::{NewParkingSession, ParkingSession, SessionFilter};
use crate::domain::StoreResult;

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn find_by_id(&self, id: i32) -> StoreResult<Option<ParkingSession>>;
    async fn find_many(&self, filter: &SessionFilter) -> StoreResult<Vec<ParkingSession>>;
    async fn create(&self, session: NewParkingSession) -> StoreResult<ParkingSession>;
    async fn update(&self, session: &ParkingSession) -> StoreResult<()>;
}
