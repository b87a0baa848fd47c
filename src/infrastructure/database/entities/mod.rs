//! Database entities module

pub mod audit_log;
pub mod parking_session;
pub mod spot;
pub mod vehicle;

pub use audit_log::Entity as AuditLog;
pub use parking_session::Entity as ParkingSession;
pub use spot::Entity as Spot;
pub use vehicle::Entity as Vehicle;
