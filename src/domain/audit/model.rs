//! Audit log entry
//!
//! Written inside the same transaction as the operation it describes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    CheckInRequested,
    SpotAssigned,
    CheckInRejected,
    CheckInRolledBack,
    CheckOutRequested,
    SessionCompleted,
    PaymentDeclined,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckInRequested => "check_in_requested",
            Self::SpotAssigned => "spot_assigned",
            Self::CheckInRejected => "check_in_rejected",
            Self::CheckInRolledBack => "check_in_rolled_back",
            Self::CheckOutRequested => "check_out_requested",
            Self::SessionCompleted => "session_completed",
            Self::PaymentDeclined => "payment_declined",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "check_in_requested" => Some(Self::CheckInRequested),
            "spot_assigned" => Some(Self::SpotAssigned),
            "check_in_rejected" => Some(Self::CheckInRejected),
            "check_in_rolled_back" => Some(Self::CheckInRolledBack),
            "check_out_requested" => Some(Self::CheckOutRequested),
            "session_completed" => Some(Self::SessionCompleted),
            "payment_declined" => Some(Self::PaymentDeclined),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i32,
    /// Transaction context that wrote the entry
    pub transaction_id: Uuid,
    pub action: AuditAction,
    pub session_id: Option<i32>,
    pub spot_id: Option<i32>,
    pub vehicle_id: Option<i32>,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAuditEntry {
    pub transaction_id: Uuid,
    pub action: AuditAction,
    pub session_id: Option<i32>,
    pub spot_id: Option<i32>,
    pub vehicle_id: Option<i32>,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewAuditEntry {
    pub fn new(transaction_id: Uuid, action: AuditAction, created_at: DateTime<Utc>) -> Self {
        Self {
            transaction_id,
            action,
            session_id: None,
            spot_id: None,
            vehicle_id: None,
            detail: None,
            created_at,
        }
    }

    pub fn session(mut self, id: i32) -> Self {
        self.session_id = Some(id);
        self
    }

    pub fn spot(mut self, id: i32) -> Self {
        self.spot_id = Some(id);
        self
    }

    pub fn vehicle(mut self, id: i32) -> Self {
        self.vehicle_id = Some(id);
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn into_entry(self, id: i32) -> AuditEntry {
        AuditEntry {
            id,
            transaction_id: self.transaction_id,
            action: self.action,
            session_id: self.session_id,
            spot_id: self.spot_id,
            vehicle_id: self.vehicle_id,
            detail: self.detail,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditFilter {
    pub transaction_id: Option<Uuid>,
    pub session_id: Option<i32>,
    pub vehicle_id: Option<i32>,
    pub action: Option<AuditAction>,
}

impl AuditFilter {
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.transaction_id.map_or(true, |id| entry.transaction_id == id)
            && self.session_id.map_or(true, |id| entry.session_id == Some(id))
            && self.vehicle_id.map_or(true, |id| entry.vehicle_id == Some(id))
            && self.action.map_or(true, |a| entry.action == a)
    }
}
