//! Rate schedule aggregate
//!
//! Per-garage pricing: rate tiers, peak windows, grace period, overtime
//! and discount rules.

pub mod model;

pub use model::{
    DiscountConditions, DiscountKind, DiscountRule, GracePeriod, OvertimeRule, PeakPricing,
    PeakWindow, RateSchedule, RateTier, RateType,
};
