//! Create spots table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Spots::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Spots::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Spots::GarageId).integer().not_null())
                    .col(ColumnDef::new(Spots::Floor).integer().not_null())
                    .col(ColumnDef::new(Spots::Bay).string().not_null())
                    .col(ColumnDef::new(Spots::SpotNumber).integer().not_null())
                    .col(
                        ColumnDef::new(Spots::SpotType)
                            .string()
                            .not_null()
                            .default("standard"),
                    )
                    .col(
                        ColumnDef::new(Spots::Status)
                            .string()
                            .not_null()
                            .default("available"),
                    )
                    .col(
                        ColumnDef::new(Spots::Features)
                            .text()
                            .not_null()
                            .default("[]"),
                    )
                    .col(ColumnDef::new(Spots::HourlyRateOverride).string())
                    .col(
                        ColumnDef::new(Spots::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // One physical location per spot
        manager
            .create_index(
                Index::create()
                    .name("idx_spots_location")
                    .table(Spots::Table)
                    .col(Spots::GarageId)
                    .col(Spots::Floor)
                    .col(Spots::Bay)
                    .col(Spots::SpotNumber)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_spots_garage_status")
                    .table(Spots::Table)
                    .col(Spots::GarageId)
                    .col(Spots::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Spots::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Spots {
    Table,
    Id,
    GarageId,
    Floor,
    Bay,
    SpotNumber,
    SpotType,
    Status,
    Features,
    HourlyRateOverride,
    UpdatedAt,
}
