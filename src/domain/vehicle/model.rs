//! Vehicle domain entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::errors::DomainError;
use crate::shared::validations::normalize_plate;

/// Vehicle category used for spot compatibility and discounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    Compact,
    Standard,
    Oversized,
    Motorcycle,
    Electric,
}

impl VehicleType {
    pub const ALL: [VehicleType; 5] = [
        Self::Compact,
        Self::Standard,
        Self::Oversized,
        Self::Motorcycle,
        Self::Electric,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Standard => "standard",
            Self::Oversized => "oversized",
            Self::Motorcycle => "motorcycle",
            Self::Electric => "electric",
        }
    }
}

impl std::str::FromStr for VehicleType {
    type Err = DomainError;

    /// Parsing is the gate for external input: an unknown type is rejected
    /// here, before any spot query runs.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "standard" => Ok(Self::Standard),
            "oversized" => Ok(Self::Oversized),
            "motorcycle" => Ok(Self::Motorcycle),
            "electric" => Ok(Self::Electric),
            _ => Err(DomainError::InvalidVehicleType(s.to_string())),
        }
    }
}

impl std::fmt::Display for VehicleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A registered vehicle. Identity (id, plate, type) never changes once
/// stored; owner fields belong to the vehicle registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: i32,
    /// Normalised licence plate (unique)
    pub license_plate: String,
    pub vehicle_type: VehicleType,
    pub owner_name: Option<String>,
    pub owner_contact: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVehicle {
    pub license_plate: String,
    pub vehicle_type: VehicleType,
    pub owner_name: Option<String>,
    pub owner_contact: Option<String>,
}

impl NewVehicle {
    pub fn new(license_plate: &str, vehicle_type: VehicleType) -> Self {
        Self {
            license_plate: normalize_plate(license_plate),
            vehicle_type,
            owner_name: None,
            owner_contact: None,
        }
    }

    pub fn into_vehicle(self, id: i32, created_at: DateTime<Utc>) -> Vehicle {
        Vehicle {
            id,
            license_plate: self.license_plate,
            vehicle_type: self.vehicle_type,
            owner_name: self.owner_name,
            owner_contact: self.owner_contact,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_types_case_insensitively() {
        assert_eq!("Compact".parse::<VehicleType>().unwrap(), VehicleType::Compact);
        assert_eq!(" electric ".parse::<VehicleType>().unwrap(), VehicleType::Electric);
    }

    #[test]
    fn rejects_unknown_type() {
        let err = "hovercraft".parse::<VehicleType>().unwrap_err();
        assert!(matches!(err, DomainError::InvalidVehicleType(ref t) if t == "hovercraft"));
    }

    #[test]
    fn new_vehicle_normalises_plate() {
        let v = NewVehicle::new("abc 123", VehicleType::Standard);
        assert_eq!(v.license_plate, "ABC123");
    }
}
