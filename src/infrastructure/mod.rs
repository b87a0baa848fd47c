//! Infrastructure layer - external concerns

pub mod clock;
pub mod database;
pub mod payments;
pub mod rates;
pub mod storage;

pub use clock::{ManualClock, SystemClock};
pub use database::{init_database, run_migrations, DatabaseConfig, SeaOrmStore};
pub use payments::InMemoryPaymentGateway;
pub use rates::StaticRateScheduleProvider;
pub use storage::InMemoryStore;
