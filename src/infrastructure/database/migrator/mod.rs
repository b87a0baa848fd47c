//! Database migrations module

pub use sea_orm_migration::prelude::*;

mod m20240101_000001_create_vehicles;
mod m20240101_000002_create_spots;
mod m20240101_000003_create_parking_sessions;
mod m20240101_000004_create_audit_log;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_vehicles::Migration),
            Box::new(m20240101_000002_create_spots::Migration),
            Box::new(m20240101_000003_create_parking_sessions::Migration),
            Box::new(m20240101_000004_create_audit_log::Migration),
        ]
    }
}
