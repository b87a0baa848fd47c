//! Create parking_sessions table

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::ConnectionTrait;

use super::m20240101_000001_create_vehicles::Vehicles;
use super::m20240101_000002_create_spots::Spots;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ParkingSessions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ParkingSessions::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ParkingSessions::GarageId).integer().not_null())
                    .col(ColumnDef::new(ParkingSessions::SpotId).integer().not_null())
                    .col(ColumnDef::new(ParkingSessions::VehicleId).integer().not_null())
                    .col(
                        ColumnDef::new(ParkingSessions::Status)
                            .string()
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(ParkingSessions::CheckInTime)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ParkingSessions::CheckOutTime).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(ParkingSessions::RateType)
                            .string()
                            .not_null()
                            .default("hourly"),
                    )
                    .col(ColumnDef::new(ParkingSessions::TotalAmount).string())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_parking_sessions_spot")
                            .from(ParkingSessions::Table, ParkingSessions::SpotId)
                            .to(Spots::Table, Spots::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_parking_sessions_vehicle")
                            .from(ParkingSessions::Table, ParkingSessions::VehicleId)
                            .to(Vehicles::Table, Vehicles::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_parking_sessions_vehicle_status")
                    .table(ParkingSessions::Table)
                    .col(ParkingSessions::VehicleId)
                    .col(ParkingSessions::Status)
                    .to_owned(),
            )
            .await?;

        // At most one active session per vehicle.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS uq_parking_sessions_active_vehicle \
                 ON parking_sessions (vehicle_id) WHERE status = 'active'",
            )
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ParkingSessions::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum ParkingSessions {
    Table,
    Id,
    GarageId,
    SpotId,
    VehicleId,
    Status,
    CheckInTime,
    CheckOutTime,
    RateType,
    TotalAmount,
}
