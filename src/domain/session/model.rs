//! Parking session domain entity

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::rate_schedule::RateType;

/// Parking session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Vehicle is in the garage
    Active,
    /// Checked out and billed
    Completed,
    /// Voided without billing
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One vehicle occupying one spot from check-in to check-out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkingSession {
    pub id: i32,
    pub garage_id: i32,
    pub spot_id: i32,
    pub vehicle_id: i32,
    pub status: SessionStatus,
    pub check_in_time: DateTime<Utc>,
    /// Set when the session is closed
    pub check_out_time: Option<DateTime<Utc>>,
    /// Rate type chosen at check-in
    pub rate_type: RateType,
    /// Final amount, set when the session is closed
    pub total_amount: Option<Decimal>,
}

impl ParkingSession {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Close the session with its billed amount
    pub fn complete(&mut self, check_out_time: DateTime<Utc>, total_amount: Decimal) {
        self.check_out_time = Some(check_out_time);
        self.total_amount = Some(total_amount);
        self.status = SessionStatus::Completed;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewParkingSession {
    pub garage_id: i32,
    pub spot_id: i32,
    pub vehicle_id: i32,
    pub check_in_time: DateTime<Utc>,
    pub rate_type: RateType,
}

impl NewParkingSession {
    pub fn into_session(self, id: i32) -> ParkingSession {
        ParkingSession {
            id,
            garage_id: self.garage_id,
            spot_id: self.spot_id,
            vehicle_id: self.vehicle_id,
            status: SessionStatus::Active,
            check_in_time: self.check_in_time,
            check_out_time: None,
            rate_type: self.rate_type,
            total_amount: None,
        }
    }
}

/// Filter for `SessionRepository::find_many`; `None` fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionFilter {
    pub garage_id: Option<i32>,
    pub spot_id: Option<i32>,
    pub vehicle_id: Option<i32>,
    pub status: Option<SessionStatus>,
}

impl SessionFilter {
    pub fn active_for_vehicle(vehicle_id: i32) -> Self {
        Self {
            vehicle_id: Some(vehicle_id),
            status: Some(SessionStatus::Active),
            ..Self::default()
        }
    }

    pub fn active_for_spot(spot_id: i32) -> Self {
        Self {
            spot_id: Some(spot_id),
            status: Some(SessionStatus::Active),
            ..Self::default()
        }
    }

    pub fn matches(&self, session: &ParkingSession) -> bool {
        self.garage_id.map_or(true, |id| session.garage_id == id)
            && self.spot_id.map_or(true, |id| session.spot_id == id)
            && self.vehicle_id.map_or(true, |id| session.vehicle_id == id)
            && self.status.map_or(true, |s| session.status == s)
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_session() -> ParkingSession {
        NewParkingSession {
            garage_id: 1,
            spot_id: 4,
            vehicle_id: 2,
            check_in_time: Utc::now(),
            rate_type: RateType::Hourly,
        }
        .into_session(11)
    }

    #[test]
    fn new_session_is_active_and_unbilled() {
        let s = sample_session();
        assert!(s.is_active());
        assert!(s.check_out_time.is_none());
        assert!(s.total_amount.is_none());
    }

    #[test]
    fn complete_sets_exit_and_total() {
        let mut s = sample_session();
        let exit = s.check_in_time + chrono::Duration::minutes(30);
        s.complete(exit, Decimal::new(750, 2));
        assert_eq!(s.status, SessionStatus::Completed);
        assert_eq!(s.check_out_time, Some(exit));
        assert_eq!(s.total_amount, Some(Decimal::new(750, 2)));
    }

    #[test]
    fn filter_matches_active_sessions() {
        let mut s = sample_session();
        assert!(SessionFilter::active_for_vehicle(2).matches(&s));
        assert!(SessionFilter::active_for_spot(4).matches(&s));
        assert!(!SessionFilter::active_for_spot(5).matches(&s));
        s.status = SessionStatus::Completed;
        assert!(!SessionFilter::active_for_vehicle(2).matches(&s));
    }
}
