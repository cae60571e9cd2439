//! Migration to create the payment transactions table

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(pk_auto(Transactions::Id))
                    .col(integer(Transactions::OrderId).not_null())
                    .col(string(Transactions::Status).not_null().default("PENDING"))
                    .col(decimal_len(Transactions::Amount, 12, 2).not_null())
                    .col(string(Transactions::MerchantRef).not_null())
                    .col(string(Transactions::GatewayOrderId).not_null())
                    .col(string_null(Transactions::BankStatus))
                    .col(timestamp_with_time_zone(Transactions::CreatedAt).default(Expr::current_timestamp()))
                    .col(timestamp_with_time_zone(Transactions::UpdatedAt).default(Expr::current_timestamp()))
                    .to_owned(),
            )
            .await?;

        // Merchant reference must never collide across payment attempts
        manager
            .create_index(
                Index::create()
                    .name("idx_transactions_merchant_ref")
                    .table(Transactions::Table)
                    .col(Transactions::MerchantRef)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_transactions_order_id")
                    .table(Transactions::Table)
                    .col(Transactions::OrderId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Transactions {
    Table,
    Id,
    OrderId,
    Status,
    Amount,
    MerchantRef,
    GatewayOrderId,
    BankStatus,
    CreatedAt,
    UpdatedAt,
}
