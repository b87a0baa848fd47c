//! Spot aggregate
//!
//! Spot inventory records, their status machine and the repository seam.

pub mod model;
pub mod repository;

pub use model::{NewSpot, Spot, SpotFilter, SpotLocation, SpotStatus, SpotType};
pub use repository::SpotRepository;
