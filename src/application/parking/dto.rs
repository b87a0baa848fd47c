//! Requests and outcomes of the session orchestrator

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::application::billing::CostBreakdown;
use crate::domain::{ParkingSession, SpotLocation, SpotType, Vehicle, VehicleType};
use crate::shared::validations::{validate_features, validate_plate};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CheckInRequest {
    #[validate(custom(function = "validate_plate"))]
    pub license_plate: String,
    pub vehicle_type: VehicleType,
    /// Restricts assignment to one garage; any garage when absent
    #[validate(range(min = 1, message = "garage_id must be ≥ 1"))]
    #[serde(default)]
    pub garage_id: Option<i32>,
    #[validate(custom(function = "validate_features"))]
    #[serde(default)]
    pub required_features: Vec<String>,
}

impl CheckInRequest {
    pub fn new(license_plate: impl Into<String>, vehicle_type: VehicleType) -> Self {
        Self {
            license_plate: license_plate.into(),
            vehicle_type,
            garage_id: None,
            required_features: Vec::new(),
        }
    }

    pub fn in_garage(mut self, garage_id: i32) -> Self {
        self.garage_id = Some(garage_id);
        self
    }

    pub fn requiring<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_features = features.into_iter().map(Into::into).collect();
        self
    }
}

/// Why an operation ended without effect. These are outcomes, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    NoAvailability,
    RateUnavailable,
    PaymentDeclined,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoAvailability => "no_availability",
            Self::RateUnavailable => "rate_unavailable",
            Self::PaymentDeclined => "payment_declined",
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckInReceipt {
    pub transaction_id: Uuid,
    pub vehicle: Vehicle,
    pub session: ParkingSession,
    pub location: SpotLocation,
    /// Price of the first billing unit
    pub quote: CostBreakdown,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckInOutcome {
    CheckedIn(CheckInReceipt),
    Rejected {
        transaction_id: Uuid,
        reason: RejectionReason,
        detail: Option<String>,
    },
}

impl CheckInOutcome {
    pub fn transaction_id(&self) -> Uuid {
        match self {
            Self::CheckedIn(receipt) => receipt.transaction_id,
            Self::Rejected { transaction_id, .. } => *transaction_id,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckedIn(_) => "checked_in",
            Self::Rejected { reason, .. } => reason.as_str(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckOutReceipt {
    pub transaction_id: Uuid,
    pub session: ParkingSession,
    pub cost: CostBreakdown,
    /// Gateway reference; absent when nothing was owed
    pub payment_reference: Option<String>,
    pub spot_released: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckOutOutcome {
    CheckedOut(CheckOutReceipt),
    Rejected {
        transaction_id: Uuid,
        reason: RejectionReason,
        detail: Option<String>,
    },
}

impl CheckOutOutcome {
    pub fn transaction_id(&self) -> Uuid {
        match self {
            Self::CheckedOut(receipt) => receipt.transaction_id,
            Self::Rejected { transaction_id, .. } => *transaction_id,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckedOut(_) => "checked_out",
            Self::Rejected { reason, .. } => reason.as_str(),
        }
    }
}

/// Spot counts for a garage, or all garages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub garage_id: Option<i32>,
    pub total: usize,
    pub available: usize,
    pub occupied: usize,
    pub reserved: usize,
    pub maintenance: usize,
    /// Available spots per spot type
    pub available_by_type: BTreeMap<SpotType, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_validation() {
        let ok = CheckInRequest::new("ABC123", VehicleType::Compact).requiring(["ev_charging"]);
        assert!(ok.validate().is_ok());

        assert!(CheckInRequest::new("A", VehicleType::Compact).validate().is_err());
        assert!(CheckInRequest::new("ABC123", VehicleType::Compact)
            .in_garage(0)
            .validate()
            .is_err());
        assert!(CheckInRequest::new("ABC123", VehicleType::Compact)
            .requiring(["EV Charging"])
            .validate()
            .is_err());
    }

    #[test]
    fn request_deserializes_with_defaults() {
        let request: CheckInRequest =
            serde_json::from_str(r#"{"license_plate":"xyz 999","vehicle_type":"motorcycle"}"#)
                .unwrap();
        assert_eq!(request.vehicle_type, VehicleType::Motorcycle);
        assert!(request.garage_id.is_none());
        assert!(request.required_features.is_empty());
    }

    #[test]
    fn rejection_serializes_tagged() {
        let outcome = CheckInOutcome::Rejected {
            transaction_id: Uuid::nil(),
            reason: RejectionReason::NoAvailability,
            detail: None,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "rejected");
        assert_eq!(json["reason"], "no_availability");
    }
}
