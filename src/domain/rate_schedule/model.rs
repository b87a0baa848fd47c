//! Rate schedule domain entity
//!
//! Pricing configuration of one garage. Owned by garage configuration and
//! read-only for the billing engine. Every optional knob is an explicit
//! `Option` so the calculator matches on it instead of probing for keys.

use chrono::{FixedOffset, NaiveTime, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::vehicle::VehicleType;
use crate::shared::errors::DomainError;

/// Billing granularity of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateType {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl RateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "hourly" => Some(Self::Hourly),
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            _ => None,
        }
    }

    /// Length of one billable unit. A month is billed as 30 days.
    pub fn unit_minutes(&self) -> i64 {
        match self {
            Self::Hourly => 60,
            Self::Daily => 1_440,
            Self::Weekly => 10_080,
            Self::Monthly => 43_200,
        }
    }
}

impl Default for RateType {
    fn default() -> Self {
        Self::Hourly
    }
}

impl std::fmt::Display for RateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Price of one unit of a rate type, with an optional ceiling on the base cost
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateTier {
    pub rate: Decimal,
    #[serde(default)]
    pub max_charge: Option<Decimal>,
}

impl RateTier {
    pub fn new(rate: Decimal) -> Self {
        Self {
            rate,
            max_charge: None,
        }
    }

    pub fn capped_at(mut self, max_charge: Decimal) -> Self {
        self.max_charge = Some(max_charge);
        self
    }
}

/// How peak multipliers combine with the base cost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeakPricing {
    /// The whole base cost is multiplied by the highest overlapping multiplier.
    WholeCost,
    /// Each overlapping window adds `(multiplier - 1) × base`.
    Additive,
}

impl Default for PeakPricing {
    fn default() -> Self {
        Self::WholeCost
    }
}

/// Local-time window with elevated pricing. `end <= start` wraps past midnight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeakWindow {
    /// Days the window starts on; empty means every day
    #[serde(default)]
    pub days: Vec<Weekday>,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub multiplier: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GracePeriod {
    pub minutes: i64,
    /// Rate types the grace period covers; `None` covers all of them
    #[serde(default)]
    pub rate_types: Option<Vec<RateType>>,
}

impl GracePeriod {
    pub fn applies_to(&self, rate_type: RateType) -> bool {
        self.rate_types
            .as_ref()
            .map_or(true, |types| types.contains(&rate_type))
    }
}

/// Surcharge on the part of a stay beyond `threshold_minutes`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OvertimeRule {
    pub threshold_minutes: i64,
    pub multiplier: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DiscountKind {
    /// Percent off, 0–100
    Percentage(Decimal),
    /// Fixed amount off, never below zero
    Fixed(Decimal),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountConditions {
    #[serde(default)]
    pub min_duration_minutes: Option<i64>,
    #[serde(default)]
    pub max_duration_minutes: Option<i64>,
    #[serde(default)]
    pub vehicle_types: Option<Vec<VehicleType>>,
    /// Matched against the local weekday of check-in
    #[serde(default)]
    pub days_of_week: Option<Vec<Weekday>>,
}

impl DiscountConditions {
    pub fn matches(&self, duration_minutes: i64, vehicle_type: VehicleType, weekday: Weekday) -> bool {
        self.min_duration_minutes
            .map_or(true, |min| duration_minutes >= min)
            && self
                .max_duration_minutes
                .map_or(true, |max| duration_minutes <= max)
            && self
                .vehicle_types
                .as_ref()
                .map_or(true, |types| types.contains(&vehicle_type))
            && self
                .days_of_week
                .as_ref()
                .map_or(true, |days| days.contains(&weekday))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountRule {
    pub name: String,
    pub kind: DiscountKind,
    #[serde(default)]
    pub conditions: DiscountConditions,
}

/// Pricing of one garage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateSchedule {
    /// Filled from the enclosing garage when loaded from configuration
    #[serde(default)]
    pub garage_id: i32,
    /// ISO 4217 currency code
    pub currency: String,
    #[serde(default)]
    pub hourly: Option<RateTier>,
    #[serde(default)]
    pub daily: Option<RateTier>,
    #[serde(default)]
    pub weekly: Option<RateTier>,
    #[serde(default)]
    pub monthly: Option<RateTier>,
    #[serde(default)]
    pub peak_windows: Vec<PeakWindow>,
    #[serde(default)]
    pub peak_pricing: PeakPricing,
    #[serde(default)]
    pub grace_period: Option<GracePeriod>,
    #[serde(default)]
    pub overtime: Option<OvertimeRule>,
    /// Evaluated in order; the first match wins
    #[serde(default)]
    pub discounts: Vec<DiscountRule>,
    /// Offset of the garage's local time from UTC
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl RateSchedule {
    /// Schedule with only an hourly rate and no extras.
    pub fn hourly(garage_id: i32, currency: impl Into<String>, rate: Decimal) -> Self {
        Self {
            garage_id,
            currency: currency.into(),
            hourly: Some(RateTier::new(rate)),
            daily: None,
            weekly: None,
            monthly: None,
            peak_windows: Vec::new(),
            peak_pricing: PeakPricing::WholeCost,
            grace_period: None,
            overtime: None,
            discounts: Vec::new(),
            utc_offset_minutes: 0,
        }
    }

    pub fn tier(&self, rate_type: RateType) -> Option<&RateTier> {
        match rate_type {
            RateType::Hourly => self.hourly.as_ref(),
            RateType::Daily => self.daily.as_ref(),
            RateType::Weekly => self.weekly.as_ref(),
            RateType::Monthly => self.monthly.as_ref(),
        }
    }

    pub fn local_offset(&self) -> Result<FixedOffset, DomainError> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            DomainError::Validation(format!(
                "utc_offset_minutes out of range: {}",
                self.utc_offset_minutes
            ))
        })
    }

    /// Checks values that deserialisation alone cannot rule out.
    pub fn validate(&self) -> Result<(), DomainError> {
        let invalid = |msg: String| {
            Err(DomainError::Validation(format!(
                "rate schedule for garage {}: {}",
                self.garage_id, msg
            )))
        };

        if self.currency.len() != 3 {
            return invalid(format!("currency must be an ISO 4217 code, got {:?}", self.currency));
        }

        let tiers = [
            (RateType::Hourly, &self.hourly),
            (RateType::Daily, &self.daily),
            (RateType::Weekly, &self.weekly),
            (RateType::Monthly, &self.monthly),
        ];
        if tiers.iter().all(|(_, t)| t.is_none()) {
            return invalid("at least one rate tier is required".to_string());
        }
        for (rate_type, tier) in tiers {
            if let Some(tier) = tier {
                if tier.rate.is_sign_negative() {
                    return invalid(format!("{} rate is negative", rate_type));
                }
                if tier.max_charge.map_or(false, |m| m.is_sign_negative()) {
                    return invalid(format!("{} max_charge is negative", rate_type));
                }
            }
        }

        for window in &self.peak_windows {
            if window.start == window.end {
                return invalid(format!("peak window {} has zero length", window.start));
            }
            if window.multiplier <= Decimal::ZERO {
                return invalid("peak multiplier must be positive".to_string());
            }
        }

        if let Some(grace) = &self.grace_period {
            if grace.minutes < 0 {
                return invalid("grace period minutes must not be negative".to_string());
            }
        }

        if let Some(overtime) = &self.overtime {
            if overtime.threshold_minutes <= 0 || overtime.multiplier < Decimal::ONE {
                return invalid(
                    "overtime needs a positive threshold and a multiplier >= 1".to_string(),
                );
            }
        }

        for rule in &self.discounts {
            match &rule.kind {
                DiscountKind::Percentage(p) if *p < Decimal::ZERO || *p > Decimal::ONE_HUNDRED => {
                    return invalid(format!("discount {} percentage out of range", rule.name));
                }
                DiscountKind::Fixed(a) if a.is_sign_negative() => {
                    return invalid(format!("discount {} amount is negative", rule.name));
                }
                _ => {}
            }
        }

        self.local_offset().map(|_| ())
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schedule() -> RateSchedule {
        let mut s = RateSchedule::hourly(1, "USD", Decimal::new(5, 0));
        s.daily = Some(RateTier::new(Decimal::new(30, 0)).capped_at(Decimal::new(50, 0)));
        s
    }

    #[test]
    fn unit_minutes_per_rate_type() {
        assert_eq!(RateType::Hourly.unit_minutes(), 60);
        assert_eq!(RateType::Daily.unit_minutes(), 1_440);
        assert_eq!(RateType::Weekly.unit_minutes(), 10_080);
        assert_eq!(RateType::Monthly.unit_minutes(), 43_200);
    }

    #[test]
    fn tier_lookup() {
        let s = sample_schedule();
        assert_eq!(s.tier(RateType::Hourly).map(|t| t.rate), Some(Decimal::new(5, 0)));
        assert!(s.tier(RateType::Weekly).is_none());
    }

    #[test]
    fn grace_period_scope() {
        let all = GracePeriod {
            minutes: 15,
            rate_types: None,
        };
        assert!(all.applies_to(RateType::Monthly));
        let hourly_only = GracePeriod {
            minutes: 15,
            rate_types: Some(vec![RateType::Hourly]),
        };
        assert!(hourly_only.applies_to(RateType::Hourly));
        assert!(!hourly_only.applies_to(RateType::Daily));
    }

    #[test]
    fn discount_conditions() {
        let cond = DiscountConditions {
            min_duration_minutes: Some(60),
            max_duration_minutes: Some(240),
            vehicle_types: Some(vec![VehicleType::Electric]),
            days_of_week: Some(vec![Weekday::Sat, Weekday::Sun]),
        };
        assert!(cond.matches(120, VehicleType::Electric, Weekday::Sat));
        assert!(!cond.matches(30, VehicleType::Electric, Weekday::Sat));
        assert!(!cond.matches(300, VehicleType::Electric, Weekday::Sat));
        assert!(!cond.matches(120, VehicleType::Standard, Weekday::Sat));
        assert!(!cond.matches(120, VehicleType::Electric, Weekday::Mon));
        assert!(DiscountConditions::default().matches(1, VehicleType::Compact, Weekday::Wed));
    }

    #[test]
    fn validate_accepts_sample() {
        assert!(sample_schedule().validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut s = sample_schedule();
        s.currency = "DOLLARS".into();
        assert!(s.validate().is_err());

        let mut s = sample_schedule();
        s.hourly = None;
        s.daily = None;
        assert!(s.validate().is_err());

        let mut s = sample_schedule();
        s.overtime = Some(OvertimeRule {
            threshold_minutes: 60,
            multiplier: Decimal::new(5, 1),
        });
        assert!(s.validate().is_err());

        let mut s = sample_schedule();
        s.discounts.push(DiscountRule {
            name: "too much".into(),
            kind: DiscountKind::Percentage(Decimal::new(150, 0)),
            conditions: DiscountConditions::default(),
        });
        assert!(s.validate().is_err());

        let mut s = sample_schedule();
        s.utc_offset_minutes = 24 * 60;
        assert!(s.validate().is_err());
    }

    #[test]
    fn deserializes_from_toml() {
        let toml_src = r#"
            garage_id = 3
            currency = "EUR"
            peak_pricing = "additive"
            utc_offset_minutes = 60

            [hourly]
            rate = "2.50"

            [daily]
            rate = "20"
            max_charge = "35"

            [grace_period]
            minutes = 10

            [overtime]
            threshold_minutes = 1440
            multiplier = "1.5"

            [[peak_windows]]
            days = ["Mon", "Tue"]
            start = "07:00:00"
            end = "10:00:00"
            multiplier = "1.25"

            [[discounts]]
            name = "ev"
            kind = { type = "percentage", value = "10" }
            conditions = { vehicle_types = ["electric"] }
        "#;
        let s: RateSchedule = toml::from_str(toml_src).unwrap();
        assert_eq!(s.garage_id, 3);
        assert_eq!(s.peak_pricing, PeakPricing::Additive);
        assert_eq!(s.hourly.as_ref().map(|t| t.rate), Some(Decimal::new(250, 2)));
        assert_eq!(s.daily.as_ref().and_then(|t| t.max_charge), Some(Decimal::new(35, 0)));
        assert_eq!(s.peak_windows[0].days, vec![Weekday::Mon, Weekday::Tue]);
        assert!(s.weekly.is_none());
        assert_eq!(
            s.discounts[0].conditions.vehicle_types,
            Some(vec![VehicleType::Electric])
        );
        assert!(s.validate().is_ok());
    }
}
