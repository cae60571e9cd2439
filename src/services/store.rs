//! Order/Delivery/Transaction store
//!
//! The store is the single source of truth for the reconciliation engine and
//! its only shared mutable resource. Every write is idempotent and guarded by
//! the state machine it belongs to, so a stale or duplicated job can at worst
//! perform a no-op.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait, JoinType,
    QueryFilter, QuerySelect, RelationTrait, Set, TransactionTrait,
};

use crate::entities::{deliveries, orders, prelude::*, transactions};
use crate::error::StoreError;
use crate::models::delivery::{DeliveryMethod, DeliverySnapshot, DeliveryStatus, DispatchSnapshot};
use crate::models::order::{Contact, Eligibility, OrderStatus, PaymentSnapshot};
use crate::models::transaction::{
    NewTransaction, TransactionRecord, TransactionResult, TransactionStatus,
};

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Order ids matching the predicate of one reconciler
    async fn load_eligible(&self, predicate: Eligibility) -> Result<Vec<i32>, StoreError>;

    async fn load_delivery_snapshot(&self, order_id: i32) -> Result<DeliverySnapshot, StoreError>;

    async fn load_dispatch_snapshot(&self, order_id: i32) -> Result<DispatchSnapshot, StoreError>;

    async fn load_payment_snapshot(&self, order_id: i32) -> Result<PaymentSnapshot, StoreError>;

    /// Mirror the carrier's status code onto the delivery
    async fn update_carrier_status(&self, delivery_id: i32, status: &str) -> Result<(), StoreError>;

    /// Set the tracking number unless one is already present.
    /// Returns whether the row changed.
    async fn update_tracking_number(&self, delivery_id: i32, number: &str)
        -> Result<bool, StoreError>;

    /// Record the carrier entity id and move the delivery to IN_PROGRESS,
    /// only if no id has been assigned yet. Returns whether the row changed.
    async fn mark_dispatched(&self, delivery_id: i32, external_id: &str)
        -> Result<bool, StoreError>;

    /// Delivery IN_PROGRESS → COMPLETED and Order → COMPLETED in one
    /// transaction. Returns false when the delivery had already left
    /// IN_PROGRESS, i.e. another job completed it first.
    async fn complete_delivery(&self, order_id: i32, delivery_id: i32) -> Result<bool, StoreError>;

    /// Move the order forward. Returns false when the current status does not
    /// allow the transition.
    async fn update_order_status(&self, order_id: i32, status: OrderStatus)
        -> Result<bool, StoreError>;

    /// Order → CANCELLED and its PENDING transaction → UNSUCCESSFUL in one
    /// transaction. Returns false when the order status forbids cancelling.
    async fn cancel_order(&self, order_id: i32, transaction_id: i32) -> Result<bool, StoreError>;

    /// Persist a gateway-accepted registration as the order's active
    /// transaction. Older PENDING transactions of the order become
    /// UNSUCCESSFUL.
    async fn insert_pending_transaction(
        &self,
        transaction: NewTransaction,
    ) -> Result<TransactionRecord, StoreError>;

    /// Apply the gateway verdict to a PENDING transaction, and mark the order
    /// PAID when successful. Returns false when the transaction was already
    /// terminal.
    async fn record_transaction_result(
        &self,
        order_id: i32,
        transaction_id: i32,
        result: TransactionResult,
    ) -> Result<bool, StoreError>;
}

/// Postgres-backed store
#[derive(Clone)]
pub struct SeaOrmStore {
    db: DatabaseConnection,
    op_timeout: Duration,
}

impl SeaOrmStore {
    pub fn new(db: DatabaseConnection, op_timeout: Duration) -> Self {
        Self { db, op_timeout }
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, DbErr>>,
    {
        tokio::time::timeout(self.op_timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout(self.op_timeout))?
            .map_err(StoreError::from)
    }

    async fn find_order_with_delivery(
        &self,
        order_id: i32,
    ) -> Result<(orders::Model, deliveries::Model), StoreError> {
        let found = self
            .bounded(
                Orders::find_by_id(order_id)
                    .find_also_related(Deliveries)
                    .one(&self.db),
            )
            .await?;

        match found {
            Some((order, Some(delivery))) => Ok((order, delivery)),
            Some((_, None)) => Err(StoreError::NotFound {
                entity: "delivery",
                order_id,
            }),
            None => Err(StoreError::NotFound {
                entity: "order",
                order_id,
            }),
        }
    }
}

fn parse_column<T>(value: &str) -> Result<T, StoreError>
where
    T: std::str::FromStr<Err = String>,
{
    value.parse().map_err(StoreError::Corrupt)
}

fn to_record(model: transactions::Model) -> Result<TransactionRecord, StoreError> {
    Ok(TransactionRecord {
        id: model.id,
        order_id: model.order_id,
        status: parse_column(&model.status)?,
        amount: model.amount,
        merchant_ref: model.merchant_ref,
        gateway_order_id: model.gateway_order_id,
        bank_status: model.bank_status,
    })
}

#[async_trait]
impl OrderStore for SeaOrmStore {
    async fn load_eligible(&self, predicate: Eligibility) -> Result<Vec<i32>, StoreError> {
        let query = Orders::find()
            .select_only()
            .column(orders::Column::Id)
            .join(JoinType::InnerJoin, orders::Relation::Deliveries.def());

        let query = match predicate {
            Eligibility::AwaitingDeliveryUpdate => query
                .filter(deliveries::Column::Status.eq(DeliveryStatus::InProgress.as_str()))
                .filter(deliveries::Column::DeliveryId.is_not_null()),
            Eligibility::AwaitingDispatch => query
                .filter(orders::Column::Status.eq(OrderStatus::Paid.as_str()))
                .filter(deliveries::Column::Status.eq(DeliveryStatus::New.as_str()))
                .filter(deliveries::Column::DeliveryId.is_null()),
        };

        self.bounded(query.into_tuple::<i32>().all(&self.db)).await
    }

    async fn load_delivery_snapshot(&self, order_id: i32) -> Result<DeliverySnapshot, StoreError> {
        let (order, delivery) = self.find_order_with_delivery(order_id).await?;

        Ok(DeliverySnapshot {
            order_id: order.id,
            order_status: parse_column(&order.status)?,
            delivery_id: delivery.id,
            status: parse_column(&delivery.status)?,
            carrier_status: delivery.carrier_status,
            tracking_number: delivery.tracking_number,
            external_id: delivery.delivery_id,
            recipient_email: order.recipient_email,
        })
    }

    async fn load_dispatch_snapshot(&self, order_id: i32) -> Result<DispatchSnapshot, StoreError> {
        let (order, delivery) = self.find_order_with_delivery(order_id).await?;
        let method: DeliveryMethod = parse_column(&delivery.method)?;

        Ok(DispatchSnapshot {
            order_id: order.id,
            order_status: parse_column(&order.status)?,
            delivery_id: delivery.id,
            delivery_status: parse_column(&delivery.status)?,
            external_id: delivery.delivery_id,
            method,
            address: delivery.address,
            pickup_point: delivery.pickup_point,
            city_code: delivery.city_code,
            postal_code: delivery.postal_code,
            recipient: Contact {
                name: order.recipient_name,
                phone: order.recipient_phone,
                email: order.recipient_email,
            },
            item_count: order.item_count.max(0) as u32,
        })
    }

    async fn load_payment_snapshot(&self, order_id: i32) -> Result<PaymentSnapshot, StoreError> {
        let found = self
            .bounded(
                Orders::find_by_id(order_id)
                    .find_also_related(Transactions)
                    .one(&self.db),
            )
            .await?;

        let (order, transaction) = found.ok_or(StoreError::NotFound {
            entity: "order",
            order_id,
        })?;

        Ok(PaymentSnapshot {
            order_id: order.id,
            status: parse_column(&order.status)?,
            total_price: order.total_price,
            recipient_email: order.recipient_email,
            transaction: transaction.map(to_record).transpose()?,
        })
    }

    async fn update_carrier_status(&self, delivery_id: i32, status: &str) -> Result<(), StoreError> {
        self.bounded(
            Deliveries::update_many()
                .col_expr(deliveries::Column::CarrierStatus, Expr::value(status))
                .col_expr(deliveries::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(deliveries::Column::Id.eq(delivery_id))
                .exec(&self.db),
        )
        .await?;

        Ok(())
    }

    async fn update_tracking_number(
        &self,
        delivery_id: i32,
        number: &str,
    ) -> Result<bool, StoreError> {
        let result = self
            .bounded(
                Deliveries::update_many()
                    .col_expr(deliveries::Column::TrackingNumber, Expr::value(number))
                    .col_expr(deliveries::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(deliveries::Column::Id.eq(delivery_id))
                    .filter(
                        Condition::any()
                            .add(deliveries::Column::TrackingNumber.is_null())
                            .add(deliveries::Column::TrackingNumber.eq("")),
                    )
                    .exec(&self.db),
            )
            .await?;

        Ok(result.rows_affected > 0)
    }

    async fn mark_dispatched(&self, delivery_id: i32, external_id: &str) -> Result<bool, StoreError> {
        let result = self
            .bounded(
                Deliveries::update_many()
                    .col_expr(deliveries::Column::DeliveryId, Expr::value(external_id))
                    .col_expr(
                        deliveries::Column::Status,
                        Expr::value(DeliveryStatus::InProgress.as_str()),
                    )
                    .col_expr(deliveries::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(deliveries::Column::Id.eq(delivery_id))
                    .filter(deliveries::Column::DeliveryId.is_null())
                    .filter(deliveries::Column::Status.eq(DeliveryStatus::New.as_str()))
                    .exec(&self.db),
            )
            .await?;

        Ok(result.rows_affected > 0)
    }

    async fn complete_delivery(&self, order_id: i32, delivery_id: i32) -> Result<bool, StoreError> {
        let db = &self.db;
        self.bounded(async move {
            let txn = db.begin().await?;

            let completed = Deliveries::update_many()
                .col_expr(
                    deliveries::Column::Status,
                    Expr::value(DeliveryStatus::Completed.as_str()),
                )
                .col_expr(deliveries::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(deliveries::Column::Id.eq(delivery_id))
                .filter(deliveries::Column::Status.eq(DeliveryStatus::InProgress.as_str()))
                .exec(&txn)
                .await?;

            if completed.rows_affected == 0 {
                txn.rollback().await?;
                return Ok(false);
            }

            let allowed: Vec<&str> = OrderStatus::Completed
                .predecessors()
                .iter()
                .map(|s| s.as_str())
                .collect();
            Orders::update_many()
                .col_expr(
                    orders::Column::Status,
                    Expr::value(OrderStatus::Completed.as_str()),
                )
                .col_expr(orders::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(orders::Column::Id.eq(order_id))
                .filter(orders::Column::Status.is_in(allowed))
                .exec(&txn)
                .await?;

            txn.commit().await?;
            Ok::<bool, DbErr>(true)
        })
        .await
    }

    async fn update_order_status(
        &self,
        order_id: i32,
        status: OrderStatus,
    ) -> Result<bool, StoreError> {
        let allowed: Vec<&str> = status.predecessors().iter().map(|s| s.as_str()).collect();
        let result = self
            .bounded(
                Orders::update_many()
                    .col_expr(orders::Column::Status, Expr::value(status.as_str()))
                    .col_expr(orders::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(orders::Column::Id.eq(order_id))
                    .filter(orders::Column::Status.is_in(allowed))
                    .exec(&self.db),
            )
            .await?;

        Ok(result.rows_affected > 0)
    }

    async fn cancel_order(&self, order_id: i32, transaction_id: i32) -> Result<bool, StoreError> {
        let allowed: Vec<&str> = OrderStatus::Cancelled
            .predecessors()
            .iter()
            .map(|s| s.as_str())
            .collect();
        let db = &self.db;
        self.bounded(async move {
            let txn = db.begin().await?;

            let cancelled = Orders::update_many()
                .col_expr(orders::Column::Status, Expr::value(OrderStatus::Cancelled.as_str()))
                .col_expr(orders::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(orders::Column::Id.eq(order_id))
                .filter(orders::Column::Status.is_in(allowed))
                .exec(&txn)
                .await?;

            if cancelled.rows_affected == 0 {
                txn.rollback().await?;
                return Ok(false);
            }

            // A reversed payment can no longer succeed
            Transactions::update_many()
                .col_expr(
                    transactions::Column::Status,
                    Expr::value(TransactionStatus::Unsuccessful.as_str()),
                )
                .col_expr(transactions::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(transactions::Column::Id.eq(transaction_id))
                .filter(transactions::Column::Status.eq(TransactionStatus::Pending.as_str()))
                .exec(&txn)
                .await?;

            txn.commit().await?;
            Ok::<bool, DbErr>(true)
        })
        .await
    }

    async fn insert_pending_transaction(
        &self,
        transaction: NewTransaction,
    ) -> Result<TransactionRecord, StoreError> {
        let db = &self.db;
        let inserted = self
            .bounded(async move {
                let txn = db.begin().await?;

                Transactions::update_many()
                    .col_expr(
                        transactions::Column::Status,
                        Expr::value(TransactionStatus::Unsuccessful.as_str()),
                    )
                    .col_expr(transactions::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(transactions::Column::OrderId.eq(transaction.order_id))
                    .filter(transactions::Column::Status.eq(TransactionStatus::Pending.as_str()))
                    .exec(&txn)
                    .await?;

                let model = transactions::ActiveModel {
                    order_id: Set(transaction.order_id),
                    status: Set(TransactionStatus::Pending.as_str().to_string()),
                    amount: Set(transaction.amount),
                    merchant_ref: Set(transaction.merchant_ref),
                    gateway_order_id: Set(transaction.gateway_order_id),
                    bank_status: Set(None),
                    ..Default::default()
                }
                .insert(&txn)
                .await?;

                Orders::update_many()
                    .col_expr(orders::Column::TransactionId, Expr::value(model.id))
                    .col_expr(orders::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(orders::Column::Id.eq(transaction.order_id))
                    .exec(&txn)
                    .await?;

                txn.commit().await?;
                Ok::<_, DbErr>(model)
            })
            .await?;

        to_record(inserted)
    }

    async fn record_transaction_result(
        &self,
        order_id: i32,
        transaction_id: i32,
        result: TransactionResult,
    ) -> Result<bool, StoreError> {
        if !result.status.is_terminal() {
            return Ok(false);
        }

        let db = &self.db;
        self.bounded(async move {
            let txn = db.begin().await?;

            let updated = Transactions::update_many()
                .col_expr(transactions::Column::Status, Expr::value(result.status.as_str()))
                .col_expr(transactions::Column::BankStatus, Expr::value(result.bank_status))
                .col_expr(transactions::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(transactions::Column::Id.eq(transaction_id))
                .filter(transactions::Column::Status.eq(TransactionStatus::Pending.as_str()))
                .exec(&txn)
                .await?;

            if updated.rows_affected == 0 {
                txn.rollback().await?;
                return Ok(false);
            }

            if result.status == TransactionStatus::Successful {
                let allowed: Vec<&str> = OrderStatus::Paid
                    .predecessors()
                    .iter()
                    .map(|s| s.as_str())
                    .collect();
                Orders::update_many()
                    .col_expr(orders::Column::Status, Expr::value(OrderStatus::Paid.as_str()))
                    .col_expr(orders::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(orders::Column::Id.eq(order_id))
                    .filter(orders::Column::Status.is_in(allowed))
                    .exec(&txn)
                    .await?;
            }

            txn.commit().await?;
            Ok::<bool, DbErr>(true)
        })
        .await
    }
}
