//! Migration to create the orders table
//!
//! Orders reference their active delivery and transaction. `offer_id` points at
//! the promotional offer owned by the catalogue service and is not constrained.

use sea_orm_migration::{prelude::*, schema::*};

use super::m20260301_000001_create_deliveries::Deliveries;
use super::m20260301_000002_create_transactions::Transactions;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Orders::Table)
                    .if_not_exists()
                    .col(pk_auto(Orders::Id))
                    .col(string(Orders::Status).not_null().default("SUBMITTED"))
                    .col(decimal_len(Orders::BasePrice, 12, 2).not_null())
                    .col(decimal_len(Orders::Discount, 12, 2).not_null().default(0))
                    .col(decimal_len(Orders::TotalPrice, 12, 2).not_null())
                    .col(integer(Orders::ItemCount).not_null().default(1))
                    .col(string(Orders::RecipientName).not_null())
                    .col(string(Orders::RecipientPhone).not_null())
                    .col(string_null(Orders::RecipientEmail))
                    .col(integer_null(Orders::DeliveryId))
                    .col(integer_null(Orders::TransactionId))
                    .col(integer_null(Orders::OfferId))
                    .col(timestamp_with_time_zone(Orders::CreatedAt).default(Expr::current_timestamp()))
                    .col(timestamp_with_time_zone(Orders::UpdatedAt).default(Expr::current_timestamp()))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_orders_delivery")
                            .from(Orders::Table, Orders::DeliveryId)
                            .to(Deliveries::Table, Deliveries::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_orders_transaction")
                            .from(Orders::Table, Orders::TransactionId)
                            .to(Transactions::Table, Transactions::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_orders_status")
                    .table(Orders::Table)
                    .col(Orders::Status)
                    .to_owned(),
            )
            .await?;

        // At most one order per delivery row
        manager
            .create_index(
                Index::create()
                    .name("idx_orders_delivery_id")
                    .table(Orders::Table)
                    .col(Orders::DeliveryId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Orders::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Orders {
    Table,
    Id,
    Status,
    BasePrice,
    Discount,
    TotalPrice,
    ItemCount,
    RecipientName,
    RecipientPhone,
    RecipientEmail,
    DeliveryId,
    TransactionId,
    OfferId,
    CreatedAt,
    UpdatedAt,
}
