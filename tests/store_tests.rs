//! SeaORM store against a real Postgres database.
//!
//! Needs `TEST_DATABASE_URL`; every test returns early without it. Rows are
//! created per test, so the database may be shared between runs.

mod common;

use std::time::Duration;

use common::setup_test_db;
use migration::Migrator;
use photobook_backend::entities::{deliveries, orders, prelude::*, transactions};
use photobook_backend::models::delivery::{DeliveryMethod, DeliveryStatus};
use photobook_backend::models::order::{Eligibility, OrderStatus};
use photobook_backend::models::transaction::{NewTransaction, TransactionResult, TransactionStatus};
use photobook_backend::services::store::{OrderStore, SeaOrmStore};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, EntityTrait, Set};
use sea_orm_migration::MigratorTrait;
use tokio::sync::OnceCell;

static MIGRATED: OnceCell<()> = OnceCell::const_new();

async fn test_store() -> Option<(SeaOrmStore, DatabaseConnection)> {
    if std::env::var("TEST_DATABASE_URL").is_err() {
        eprintln!("TEST_DATABASE_URL not set, skipping store test");
        return None;
    }

    let db = setup_test_db().await.expect("Failed to connect to test DB");
    MIGRATED
        .get_or_try_init(|| async { Migrator::up(&db, None).await })
        .await
        .expect("Failed to run migrations");

    Some((SeaOrmStore::new(db.clone(), Duration::from_secs(10)), db))
}

async fn seed_delivery(
    db: &DatabaseConnection,
    status: DeliveryStatus,
    external_id: Option<String>,
    tracking_number: Option<&str>,
) -> Result<i32, DbErr> {
    let model = deliveries::ActiveModel {
        method: Set(DeliveryMethod::DoorToDoor.as_str().to_string()),
        address: Set(Some("Lenina 1, apt 2".to_string())),
        pickup_point: Set(None),
        city_code: Set(Some(44)),
        postal_code: Set(Some("101000".to_string())),
        delivery_id: Set(external_id),
        tracking_number: Set(tracking_number.map(str::to_string)),
        carrier_status: Set(None),
        status: Set(status.as_str().to_string()),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(model.id)
}

async fn seed_order(
    db: &DatabaseConnection,
    status: OrderStatus,
    delivery_id: Option<i32>,
) -> Result<i32, DbErr> {
    let model = orders::ActiveModel {
        status: Set(status.as_str().to_string()),
        base_price: Set(dec!(1490.00)),
        discount: Set(dec!(0)),
        total_price: Set(dec!(1490.00)),
        item_count: Set(1),
        recipient_name: Set("Anna Petrova".to_string()),
        recipient_phone: Set("+71111111111".to_string()),
        recipient_email: Set(Some("anna@example.com".to_string())),
        delivery_id: Set(delivery_id),
        transaction_id: Set(None),
        offer_id: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(model.id)
}

fn external_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn new_transaction(order_id: i32) -> NewTransaction {
    NewTransaction {
        order_id,
        amount: dec!(1490.00),
        merchant_ref: format!("{}-{}", order_id, uuid::Uuid::new_v4()),
        gateway_order_id: uuid::Uuid::new_v4().to_string(),
    }
}

async fn order_status(db: &DatabaseConnection, id: i32) -> String {
    Orders::find_by_id(id).one(db).await.unwrap().unwrap().status
}

async fn delivery(db: &DatabaseConnection, id: i32) -> deliveries::Model {
    Deliveries::find_by_id(id).one(db).await.unwrap().unwrap()
}

async fn transaction(db: &DatabaseConnection, id: i32) -> transactions::Model {
    Transactions::find_by_id(id).one(db).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_tracking_number_is_written_once() {
    let Some((store, db)) = test_store().await else {
        return;
    };
    let missing = seed_delivery(&db, DeliveryStatus::InProgress, Some(external_id()), None)
        .await
        .unwrap();
    let blank = seed_delivery(&db, DeliveryStatus::InProgress, Some(external_id()), Some(""))
        .await
        .unwrap();

    assert!(store.update_tracking_number(missing, "TRACK99").await.unwrap());
    assert!(!store.update_tracking_number(missing, "OTHER01").await.unwrap());
    assert_eq!(delivery(&db, missing).await.tracking_number.as_deref(), Some("TRACK99"));

    // An empty string counts as absent
    assert!(store.update_tracking_number(blank, "TRACK42").await.unwrap());
    assert_eq!(delivery(&db, blank).await.tracking_number.as_deref(), Some("TRACK42"));
}

#[tokio::test]
async fn test_carrier_id_is_assigned_once() {
    let Some((store, db)) = test_store().await else {
        return;
    };
    let delivery_id = seed_delivery(&db, DeliveryStatus::New, None, None).await.unwrap();
    let first = external_id();

    assert!(store.mark_dispatched(delivery_id, &first).await.unwrap());
    assert!(!store.mark_dispatched(delivery_id, &external_id()).await.unwrap());

    let row = delivery(&db, delivery_id).await;
    assert_eq!(row.delivery_id, Some(first));
    assert_eq!(row.status, DeliveryStatus::InProgress.as_str());
}

#[tokio::test]
async fn test_order_status_only_moves_forward() {
    let Some((store, db)) = test_store().await else {
        return;
    };
    let order_id = seed_order(&db, OrderStatus::Submitted, None).await.unwrap();

    assert!(store.update_order_status(order_id, OrderStatus::Paid).await.unwrap());
    assert!(!store.update_order_status(order_id, OrderStatus::Submitted).await.unwrap());
    assert!(store.update_order_status(order_id, OrderStatus::Completed).await.unwrap());
    assert!(!store.update_order_status(order_id, OrderStatus::Cancelled).await.unwrap());
    assert!(!store.update_order_status(order_id, OrderStatus::Paid).await.unwrap());

    assert_eq!(order_status(&db, order_id).await, OrderStatus::Completed.as_str());
}

#[tokio::test]
async fn test_complete_delivery_cascades_once() {
    let Some((store, db)) = test_store().await else {
        return;
    };
    let delivery_id = seed_delivery(&db, DeliveryStatus::InProgress, Some(external_id()), None)
        .await
        .unwrap();
    let order_id = seed_order(&db, OrderStatus::Paid, Some(delivery_id)).await.unwrap();

    assert!(store.complete_delivery(order_id, delivery_id).await.unwrap());
    assert_eq!(delivery(&db, delivery_id).await.status, DeliveryStatus::Completed.as_str());
    assert_eq!(order_status(&db, order_id).await, OrderStatus::Completed.as_str());

    // A second worker arriving late changes nothing
    assert!(!store.complete_delivery(order_id, delivery_id).await.unwrap());
}

#[tokio::test]
async fn test_complete_delivery_keeps_cancelled_order() {
    let Some((store, db)) = test_store().await else {
        return;
    };
    let delivery_id = seed_delivery(&db, DeliveryStatus::InProgress, Some(external_id()), None)
        .await
        .unwrap();
    let order_id = seed_order(&db, OrderStatus::Cancelled, Some(delivery_id))
        .await
        .unwrap();

    assert!(store.complete_delivery(order_id, delivery_id).await.unwrap());
    assert_eq!(delivery(&db, delivery_id).await.status, DeliveryStatus::Completed.as_str());
    assert_eq!(order_status(&db, order_id).await, OrderStatus::Cancelled.as_str());
}

#[tokio::test]
async fn test_new_transaction_supersedes_pending_one() {
    let Some((store, db)) = test_store().await else {
        return;
    };
    let order_id = seed_order(&db, OrderStatus::Submitted, None).await.unwrap();

    let first = store.insert_pending_transaction(new_transaction(order_id)).await.unwrap();
    let second = store.insert_pending_transaction(new_transaction(order_id)).await.unwrap();

    assert_eq!(
        transaction(&db, first.id).await.status,
        TransactionStatus::Unsuccessful.as_str()
    );
    assert_eq!(second.status, TransactionStatus::Pending);
    let order = Orders::find_by_id(order_id).one(&db).await.unwrap().unwrap();
    assert_eq!(order.transaction_id, Some(second.id));

    let snapshot = store.load_payment_snapshot(order_id).await.unwrap();
    assert_eq!(snapshot.transaction.map(|t| t.id), Some(second.id));
}

#[tokio::test]
async fn test_transaction_result_applies_once() {
    let Some((store, db)) = test_store().await else {
        return;
    };
    let order_id = seed_order(&db, OrderStatus::Submitted, None).await.unwrap();
    let record = store.insert_pending_transaction(new_transaction(order_id)).await.unwrap();

    let approved = TransactionResult {
        status: TransactionStatus::Successful,
        bank_status: Some("1".to_string()),
    };
    let declined = TransactionResult {
        status: TransactionStatus::Unsuccessful,
        bank_status: None,
    };

    assert!(store.record_transaction_result(order_id, record.id, approved).await.unwrap());
    assert!(!store.record_transaction_result(order_id, record.id, declined).await.unwrap());

    let row = transaction(&db, record.id).await;
    assert_eq!(row.status, TransactionStatus::Successful.as_str());
    assert_eq!(row.bank_status.as_deref(), Some("1"));
    assert_eq!(order_status(&db, order_id).await, OrderStatus::Paid.as_str());
}

#[tokio::test]
async fn test_cancel_order_closes_pending_transaction() {
    let Some((store, db)) = test_store().await else {
        return;
    };
    let order_id = seed_order(&db, OrderStatus::Submitted, None).await.unwrap();
    let record = store.insert_pending_transaction(new_transaction(order_id)).await.unwrap();

    assert!(store.cancel_order(order_id, record.id).await.unwrap());

    assert_eq!(order_status(&db, order_id).await, OrderStatus::Cancelled.as_str());
    assert_eq!(
        transaction(&db, record.id).await.status,
        TransactionStatus::Unsuccessful.as_str()
    );
}

#[tokio::test]
async fn test_refused_cancel_leaves_transaction_pending() {
    let Some((store, db)) = test_store().await else {
        return;
    };
    let order_id = seed_order(&db, OrderStatus::Submitted, None).await.unwrap();
    let record = store.insert_pending_transaction(new_transaction(order_id)).await.unwrap();
    assert!(store.update_order_status(order_id, OrderStatus::Paid).await.unwrap());
    assert!(store.update_order_status(order_id, OrderStatus::Completed).await.unwrap());

    assert!(!store.cancel_order(order_id, record.id).await.unwrap());

    assert_eq!(order_status(&db, order_id).await, OrderStatus::Completed.as_str());
    assert_eq!(
        transaction(&db, record.id).await.status,
        TransactionStatus::Pending.as_str()
    );
}

#[tokio::test]
async fn test_eligibility_follows_dispatch() {
    let Some((store, db)) = test_store().await else {
        return;
    };
    let delivery_id = seed_delivery(&db, DeliveryStatus::New, None, None).await.unwrap();
    let order_id = seed_order(&db, OrderStatus::Paid, Some(delivery_id)).await.unwrap();

    let dispatch = store.load_eligible(Eligibility::AwaitingDispatch).await.unwrap();
    let tracking = store.load_eligible(Eligibility::AwaitingDeliveryUpdate).await.unwrap();
    assert!(dispatch.contains(&order_id));
    assert!(!tracking.contains(&order_id));

    assert!(store.mark_dispatched(delivery_id, &external_id()).await.unwrap());

    let dispatch = store.load_eligible(Eligibility::AwaitingDispatch).await.unwrap();
    let tracking = store.load_eligible(Eligibility::AwaitingDeliveryUpdate).await.unwrap();
    assert!(!dispatch.contains(&order_id));
    assert!(tracking.contains(&order_id));
}
