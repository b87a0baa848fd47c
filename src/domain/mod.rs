pub mod audit;
pub mod ports;
pub mod rate_schedule;
pub mod repositories;
pub mod session;
pub mod spot;
pub mod vehicle;

// Re-export commonly used types
pub use audit::{AuditAction, AuditEntry, AuditFilter, AuditRepository, NewAuditEntry};
pub use ports::{ChargeRequest, Clock, PaymentGateway, PaymentOutcome, RateScheduleProvider};
pub use rate_schedule::{RateSchedule, RateTier, RateType};
pub use repositories::{
    BeginOptions, DomainResult, IsolationLevel, Store, StoreResult, StoreTransaction,
    TransactionPriority,
};
pub use session::{NewParkingSession, ParkingSession, SessionFilter, SessionRepository, SessionStatus};
pub use spot::{NewSpot, Spot, SpotFilter, SpotLocation, SpotRepository, SpotStatus, SpotType};
pub use vehicle::{NewVehicle, Vehicle, VehicleRepository, VehicleType};

// Re-export DomainError from shared for convenience
pub use crate::shared::errors::DomainError;
