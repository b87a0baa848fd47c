//! Parking cost calculation
//!
//! Pure function of the stay, the vehicle and the garage's rate schedule.
//! Steps run in a fixed order: grace period, base cost with tier cap, peak
//! pricing, first matching discount, overtime surcharge, rounding.

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::peak::overlapping_windows;
use crate::domain::rate_schedule::{DiscountKind, PeakPricing};
use crate::domain::{DomainResult, RateSchedule, RateType, VehicleType};
use crate::shared::errors::DomainError;

const MS_PER_MINUTE: i64 = 60_000;

/// What is being priced
#[derive(Debug, Clone, PartialEq)]
pub struct StayQuote {
    pub check_in: DateTime<Utc>,
    pub as_of: DateTime<Utc>,
    pub rate_type: RateType,
    pub vehicle_type: VehicleType,
    /// Replaces the schedule's hourly rate for this spot
    pub hourly_rate_override: Option<Decimal>,
}

/// Itemised cost. Components are rounded for display; `total` is rounded
/// once from the exact running amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub currency: String,
    pub rate_type: RateType,
    pub duration_minutes: i64,
    pub grace_applied: bool,
    pub billable_units: i64,
    pub unit_rate: Decimal,
    pub base_cost: Decimal,
    pub capped: bool,
    pub peak_surcharge: Decimal,
    pub discount: Option<AppliedDiscount>,
    pub overtime_surcharge: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedDiscount {
    pub name: String,
    pub amount: Decimal,
}

pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Whole minutes parked, rounded up. Zero or negative stays are rejected.
pub fn duration_minutes(check_in: DateTime<Utc>, as_of: DateTime<Utc>) -> DomainResult<i64> {
    let ms = (as_of - check_in).num_milliseconds();
    if ms <= 0 {
        return Err(DomainError::InvalidDuration {
            minutes: ms / MS_PER_MINUTE,
            as_of,
        });
    }
    Ok((ms + MS_PER_MINUTE - 1) / MS_PER_MINUTE)
}

pub fn calculate_cost(schedule: &RateSchedule, quote: &StayQuote) -> DomainResult<CostBreakdown> {
    let duration = duration_minutes(quote.check_in, quote.as_of)?;
    let zero = Decimal::ZERO;

    let mut breakdown = CostBreakdown {
        currency: schedule.currency.clone(),
        rate_type: quote.rate_type,
        duration_minutes: duration,
        grace_applied: false,
        billable_units: 0,
        unit_rate: zero,
        base_cost: zero,
        capped: false,
        peak_surcharge: zero,
        discount: None,
        overtime_surcharge: zero,
        total: zero,
    };

    if let Some(grace) = &schedule.grace_period {
        if grace.applies_to(quote.rate_type) && duration <= grace.minutes {
            breakdown.grace_applied = true;
            return Ok(breakdown);
        }
    }

    // Base
    let tier = schedule.tier(quote.rate_type);
    let rate = match (quote.rate_type, quote.hourly_rate_override, tier) {
        (RateType::Hourly, Some(rate), _) => rate,
        (_, _, Some(tier)) => tier.rate,
        (_, _, None) => {
            return Err(DomainError::RateNotConfigured {
                garage_id: schedule.garage_id,
                rate_type: quote.rate_type.to_string(),
            })
        }
    };
    let unit = quote.rate_type.unit_minutes();
    let units = (duration + unit - 1) / unit;
    let mut base = Decimal::from(units) * rate;
    if let Some(max) = tier.and_then(|t| t.max_charge) {
        if base > max {
            base = max;
            breakdown.capped = true;
        }
    }
    breakdown.billable_units = units;
    breakdown.unit_rate = rate;
    breakdown.base_cost = round_money(base);

    // Peak
    let offset = schedule.local_offset()?;
    let windows = overlapping_windows(&schedule.peak_windows, quote.check_in, quote.as_of, offset);
    let peak = match schedule.peak_pricing {
        PeakPricing::WholeCost => windows
            .iter()
            .map(|w| w.multiplier)
            .max()
            .map_or(zero, |m| base * m - base),
        PeakPricing::Additive => windows
            .iter()
            .map(|w| (w.multiplier - Decimal::ONE) * base)
            .sum(),
    };
    breakdown.peak_surcharge = round_money(peak);
    let mut running = base + peak;

    // Discount
    let weekday = quote.check_in.with_timezone(&offset).weekday();
    if let Some(rule) = schedule
        .discounts
        .iter()
        .find(|r| r.conditions.matches(duration, quote.vehicle_type, weekday))
    {
        let amount = match &rule.kind {
            DiscountKind::Percentage(percent) => running * *percent / Decimal::ONE_HUNDRED,
            DiscountKind::Fixed(amount) => (*amount).min(running),
        };
        running = (running - amount).max(zero);
        breakdown.discount = Some(AppliedDiscount {
            name: rule.name.clone(),
            amount: round_money(amount),
        });
    }

    // Overtime
    if let Some(overtime) = &schedule.overtime {
        if duration > overtime.threshold_minutes {
            let over = Decimal::from(duration - overtime.threshold_minutes);
            let share = running * over / Decimal::from(duration);
            let surcharge = share * (overtime.multiplier - Decimal::ONE);
            running += surcharge;
            breakdown.overtime_surcharge = round_money(surcharge);
        }
    }

    breakdown.total = round_money(running);
    Ok(breakdown)
}

// ── Tests ──────────────────────────────────────────────────────
