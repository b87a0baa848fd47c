//! # Parking Core
//!
//! Transactional spot assignment and billing for multi-floor parking
//! garages.
//!
//! ## Architecture
//!
//! - **domain**: entities, repository traits and outbound ports
//! - **application**: transaction manager, assignment, billing and the
//!   session orchestrator
//! - **infrastructure**: in-memory and SeaORM stores, clock, rate schedule
//!   provider, payment gateway
//! - **config** / **logging** / **bootstrap**: wiring from a TOML file

pub mod application;
pub mod bootstrap;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod logging;
pub mod shared;

pub use bootstrap::{BootstrapError, ParkingCore};
pub use config::{default_config_path, AppConfig, ConfigError};
pub use logging::init_tracing;

// Re-export database types for easy access
pub use infrastructure::{init_database, run_migrations, DatabaseConfig, SeaOrmStore};
