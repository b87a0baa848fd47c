//! Parking spot domain entity

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Physical kind of a spot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpotType {
    Standard,
    Compact,
    Oversized,
    Handicap,
    Electric,
}

impl SpotType {
    pub const ALL: [SpotType; 5] = [
        Self::Standard,
        Self::Compact,
        Self::Oversized,
        Self::Handicap,
        Self::Electric,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Compact => "compact",
            Self::Oversized => "oversized",
            Self::Handicap => "handicap",
            Self::Electric => "electric",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(Self::Standard),
            "compact" => Some(Self::Compact),
            "oversized" => Some(Self::Oversized),
            "handicap" => Some(Self::Handicap),
            "electric" => Some(Self::Electric),
            _ => None,
        }
    }
}

impl std::fmt::Display for SpotType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Spot availability status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpotStatus {
    Available,
    Occupied,
    Reserved,
    Maintenance,
}

impl SpotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Occupied => "occupied",
            Self::Reserved => "reserved",
            Self::Maintenance => "maintenance",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "available" => Some(Self::Available),
            "occupied" => Some(Self::Occupied),
            "reserved" => Some(Self::Reserved),
            "maintenance" => Some(Self::Maintenance),
            _ => None,
        }
    }

    /// Transitions this core is allowed to perform. Maintenance moves are
    /// administrative and happen elsewhere.
    pub fn can_transition_to(&self, next: SpotStatus) -> bool {
        matches!(
            (self, next),
            (Self::Available, Self::Occupied) | (Self::Occupied, Self::Available)
        )
    }
}

impl std::fmt::Display for SpotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single parking space, the unit of allocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spot {
    pub id: i32,
    pub garage_id: i32,
    /// Floor number; lower floors are closer to the entrance
    pub floor: i32,
    /// Bay label on the floor (e.g. "A")
    pub bay: String,
    /// Spot number inside the bay
    pub spot_number: i32,
    pub spot_type: SpotType,
    pub status: SpotStatus,
    /// Feature tags such as `ev_charging` or `covered`
    pub features: Vec<String>,
    /// Replaces the garage's hourly rate for sessions on this spot
    pub hourly_rate_override: Option<Decimal>,
    pub updated_at: DateTime<Utc>,
}

impl Spot {
    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }

    pub fn is_available(&self) -> bool {
        self.status == SpotStatus::Available
    }

    pub fn location(&self) -> SpotLocation {
        SpotLocation {
            spot_id: self.id,
            garage_id: self.garage_id,
            floor: self.floor,
            bay: self.bay.clone(),
            spot_number: self.spot_number,
        }
    }
}

/// Where a vehicle was parked, as reported back to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotLocation {
    pub spot_id: i32,
    pub garage_id: i32,
    pub floor: i32,
    pub bay: String,
    pub spot_number: i32,
}

impl std::fmt::Display for SpotLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "garage {} / floor {} / bay {} / spot {}",
            self.garage_id, self.floor, self.bay, self.spot_number
        )
    }
}

/// Data needed to register a spot in a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSpot {
    pub garage_id: i32,
    pub floor: i32,
    pub bay: String,
    pub spot_number: i32,
    pub spot_type: SpotType,
    pub status: SpotStatus,
    pub features: Vec<String>,
    pub hourly_rate_override: Option<Decimal>,
}

impl NewSpot {
    pub fn new(
        garage_id: i32,
        floor: i32,
        bay: impl Into<String>,
        spot_number: i32,
        spot_type: SpotType,
    ) -> Self {
        Self {
            garage_id,
            floor,
            bay: bay.into(),
            spot_number,
            spot_type,
            status: SpotStatus::Available,
            features: Vec::new(),
            hourly_rate_override: None,
        }
    }

    pub fn with_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features = features.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_status(mut self, status: SpotStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_hourly_rate(mut self, rate: Decimal) -> Self {
        self.hourly_rate_override = Some(rate);
        self
    }

    pub fn into_spot(self, id: i32, updated_at: DateTime<Utc>) -> Spot {
        Spot {
            id,
            garage_id: self.garage_id,
            floor: self.floor,
            bay: self.bay,
            spot_number: self.spot_number,
            spot_type: self.spot_type,
            status: self.status,
            features: self.features,
            hourly_rate_override: self.hourly_rate_override,
            updated_at,
        }
    }
}

/// Filter for `SpotRepository::find_many`; `None` fields match everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpotFilter {
    pub garage_id: Option<i32>,
    pub statuses: Option<Vec<SpotStatus>>,
    pub spot_types: Option<Vec<SpotType>>,
}

impl SpotFilter {
    pub fn available() -> Self {
        Self {
            statuses: Some(vec![SpotStatus::Available]),
            ..Self::default()
        }
    }

    pub fn in_garage(mut self, garage_id: Option<i32>) -> Self {
        self.garage_id = garage_id;
        self
    }

    pub fn of_types(mut self, types: Vec<SpotType>) -> Self {
        self.spot_types = Some(types);
        self
    }

    pub fn matches(&self, spot: &Spot) -> bool {
        if let Some(garage_id) = self.garage_id {
            if spot.garage_id != garage_id {
                return false;
            }
        }
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&spot.status) {
                return false;
            }
        }
        if let Some(types) = &self.spot_types {
            if !types.contains(&spot.spot_type) {
                return false;
            }
        }
        true
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_spot() -> Spot {
        NewSpot::new(1, 2, "B", 14, SpotType::Electric)
            .with_features(["ev_charging", "covered"])
            .into_spot(9, Utc::now())
    }

    #[test]
    fn status_transitions_allowed_by_core() {
        assert!(SpotStatus::Available.can_transition_to(SpotStatus::Occupied));
        assert!(SpotStatus::Occupied.can_transition_to(SpotStatus::Available));
        assert!(!SpotStatus::Maintenance.can_transition_to(SpotStatus::Available));
        assert!(!SpotStatus::Available.can_transition_to(SpotStatus::Reserved));
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            SpotStatus::Available,
            SpotStatus::Occupied,
            SpotStatus::Reserved,
            SpotStatus::Maintenance,
        ] {
            assert_eq!(SpotStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(SpotStatus::from_str("broken"), None);
    }

    #[test]
    fn features_and_location() {
        let spot = sample_spot();
        assert!(spot.has_feature("ev_charging"));
        assert!(!spot.has_feature("valet"));
        let loc = spot.location();
        assert_eq!(loc.spot_id, 9);
        assert_eq!(loc.to_string(), "garage 1 / floor 2 / bay B / spot 14");
    }

    #[test]
    fn filter_matches_garage_status_and_type() {
        let spot = sample_spot();
        assert!(SpotFilter::available().matches(&spot));
        assert!(!SpotFilter::available().in_garage(Some(2)).matches(&spot));
        assert!(!SpotFilter::default()
            .of_types(vec![SpotType::Compact])
            .matches(&spot));
    }
}
