//! Rate schedule provider backed by static garage configuration

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::info;

use crate::domain::{DomainResult, RateSchedule, RateScheduleProvider};

/// Holds one validated schedule per garage. Schedules can be replaced at
/// runtime; sessions already open are billed with whatever is active at
/// check-out.
#[derive(Default)]
pub struct StaticRateScheduleProvider {
    schedules: DashMap<i32, RateSchedule>,
}

impl StaticRateScheduleProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schedules(schedules: impl IntoIterator<Item = RateSchedule>) -> DomainResult<Self> {
        let provider = Self::new();
        for schedule in schedules {
            provider.insert(schedule)?;
        }
        Ok(provider)
    }

    /// Validates and installs a schedule, replacing the garage's previous one.
    pub fn insert(&self, schedule: RateSchedule) -> DomainResult<()> {
        schedule.validate()?;
        info!(
            garage_id = schedule.garage_id,
            currency = %schedule.currency,
            "rate schedule installed"
        );
        self.schedules.insert(schedule.garage_id, schedule);
        Ok(())
    }

    pub fn remove(&self, garage_id: i32) -> Option<RateSchedule> {
        self.schedules.remove(&garage_id).map(|(_, s)| s)
    }

    pub fn garage_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.schedules.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }
}

#[async_trait]
impl RateScheduleProvider for StaticRateScheduleProvider {
    async fn active_schedule(&self, garage_id: i32) -> DomainResult<Option<RateSchedule>> {
        Ok(self.schedules.get(&garage_id).map(|s| s.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn serves_installed_schedules() {
        let provider =
            StaticRateScheduleProvider::with_schedules([RateSchedule::hourly(1, "USD", Decimal::new(5, 0))])
                .unwrap();
        assert!(provider.active_schedule(1).await.unwrap().is_some());
        assert!(provider.active_schedule(2).await.unwrap().is_none());
        assert_eq!(provider.garage_ids(), vec![1]);
    }

    #[test]
    fn rejects_invalid_schedule() {
        let provider = StaticRateScheduleProvider::new();
        let broken = RateSchedule::hourly(1, "USD", Decimal::new(-1, 0));
        assert!(provider.insert(broken).is_err());
    }
}
