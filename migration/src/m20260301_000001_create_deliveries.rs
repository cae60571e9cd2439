//! Migration to create the deliveries table
//!
//! One row per order shipment. `status` is the local state machine
//! (NEW, IN_PROGRESS, COMPLETED); `carrier_status` mirrors the carrier's code.

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Deliveries::Table)
                    .if_not_exists()
                    .col(pk_auto(Deliveries::Id))
                    .col(string(Deliveries::Method).not_null())
                    .col(string_null(Deliveries::Address))
                    .col(string_null(Deliveries::PickupPoint))
                    .col(integer_null(Deliveries::CityCode))
                    .col(string_null(Deliveries::PostalCode))
                    .col(string_null(Deliveries::DeliveryId))
                    .col(string_null(Deliveries::TrackingNumber))
                    .col(string_null(Deliveries::CarrierStatus))
                    .col(string(Deliveries::Status).not_null().default("NEW"))
                    .col(timestamp_with_time_zone(Deliveries::CreatedAt).default(Expr::current_timestamp()))
                    .col(timestamp_with_time_zone(Deliveries::UpdatedAt).default(Expr::current_timestamp()))
                    .to_owned(),
            )
            .await?;

        // Scheduler scans by local status every tick
        manager
            .create_index(
                Index::create()
                    .name("idx_deliveries_status")
                    .table(Deliveries::Table)
                    .col(Deliveries::Status)
                    .to_owned(),
            )
            .await?;

        // Carrier-assigned id is unique once set
        manager
            .create_index(
                Index::create()
                    .name("idx_deliveries_delivery_id")
                    .table(Deliveries::Table)
                    .col(Deliveries::DeliveryId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Deliveries::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Deliveries {
    Table,
    Id,
    Method,
    Address,
    PickupPoint,
    CityCode,
    PostalCode,
    DeliveryId,
    TrackingNumber,
    CarrierStatus,
    Status,
    CreatedAt,
    UpdatedAt,
}
