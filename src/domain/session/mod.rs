//! Parking session aggregate

pub mod model;
pub mod repository;

pub use model::{NewParkingSession, ParkingSession, SessionFilter, SessionStatus};
pub use repository::SessionRepository;
