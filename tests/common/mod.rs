//! Shared fakes for integration tests: an in-memory store with the same
//! guarded-write semantics as the SeaORM store, scripted providers and a
//! recording notifier. Also the Postgres test database connection.

#![allow(dead_code)]

use std::collections::HashMap;
use std::env;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::{Database, DatabaseConnection, DbErr};

use photobook_backend::error::{ProviderError, StoreError};
use photobook_backend::models::delivery::{
    DeliveryMethod, DeliverySnapshot, DeliveryStatus, DispatchSnapshot,
};
use photobook_backend::models::notification::Notification;
use photobook_backend::models::order::{Contact, Eligibility, OrderStatus, PaymentSnapshot};
use photobook_backend::models::transaction::{
    NewTransaction, TransactionRecord, TransactionResult, TransactionStatus,
};
use photobook_backend::services::carrier::{
    Carrier, CarrierOrderInfo, CarrierOrderRequest, CreatedOrder,
};
use photobook_backend::services::notifier::Notifier;
use photobook_backend::services::payment_gateway::{
    GatewayOrderStatus, PaymentGateway, PreAuthRequest, PreAuthResponse, ReversalResponse,
};
use photobook_backend::services::store::OrderStore;

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

/// Connect to the test database
pub async fn setup_test_db() -> Result<DatabaseConnection, DbErr> {
    let database_url = env::var("TEST_DATABASE_URL").unwrap_or_else(|_| {
        "postgresql://photobook_user@localhost:5432/photobook_test".to_string()
    });

    Database::connect(&database_url).await
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRow {
    pub id: i32,
    pub status: OrderStatus,
    pub total_price: Decimal,
    pub item_count: u32,
    pub contact: Contact,
    pub delivery_id: Option<i32>,
    pub transaction_id: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryRow {
    pub id: i32,
    pub method: DeliveryMethod,
    pub address: Option<String>,
    pub pickup_point: Option<String>,
    pub city_code: Option<i32>,
    pub postal_code: Option<String>,
    pub external_id: Option<String>,
    pub tracking_number: Option<String>,
    pub carrier_status: Option<String>,
    pub status: DeliveryStatus,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreState {
    pub orders: HashMap<i32, OrderRow>,
    pub deliveries: HashMap<i32, DeliveryRow>,
    pub transactions: HashMap<i32, TransactionRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    next_transaction_id: AtomicUsize,
    write_calls: AtomicUsize,
    pub fail_queries: AtomicBool,
    /// Completes the delivery right after a delivery snapshot is read, as a
    /// concurrent job would
    pub complete_after_snapshot: AtomicBool,
}

pub fn contact() -> Contact {
    Contact {
        name: "Anna Petrova".to_string(),
        phone: "+71111111111".to_string(),
        email: Some("anna@example.com".to_string()),
    }
}

pub fn order_row(id: i32, status: OrderStatus, delivery_id: Option<i32>) -> OrderRow {
    OrderRow {
        id,
        status,
        total_price: Decimal::new(149000, 2),
        item_count: 1,
        contact: contact(),
        delivery_id,
        transaction_id: None,
    }
}

pub fn delivery_row(id: i32, method: DeliveryMethod) -> DeliveryRow {
    DeliveryRow {
        id,
        method,
        address: Some("Lenina 1, apt 2".to_string()),
        pickup_point: Some("MSK123".to_string()),
        city_code: Some(44),
        postal_code: Some("101000".to_string()),
        external_id: None,
        tracking_number: None,
        carrier_status: None,
        status: DeliveryStatus::New,
    }
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_transaction_id: AtomicUsize::new(1),
            ..Default::default()
        })
    }

    pub fn insert_order(&self, order: OrderRow) {
        self.state.lock().unwrap().orders.insert(order.id, order);
    }

    pub fn insert_delivery(&self, delivery: DeliveryRow) {
        self.state
            .lock()
            .unwrap()
            .deliveries
            .insert(delivery.id, delivery);
    }

    pub fn insert_transaction(&self, record: TransactionRecord) {
        let mut state = self.state.lock().unwrap();
        if let Some(order) = state.orders.get_mut(&record.order_id) {
            order.transaction_id = Some(record.id);
        }
        state.transactions.insert(record.id, record);
    }

    pub fn order(&self, id: i32) -> OrderRow {
        self.state.lock().unwrap().orders[&id].clone()
    }

    pub fn delivery(&self, id: i32) -> DeliveryRow {
        self.state.lock().unwrap().deliveries[&id].clone()
    }

    pub fn transaction(&self, id: i32) -> TransactionRecord {
        self.state.lock().unwrap().transactions[&id].clone()
    }

    pub fn transactions_for(&self, order_id: i32) -> Vec<TransactionRecord> {
        let mut records: Vec<_> = self
            .state
            .lock()
            .unwrap()
            .transactions
            .values()
            .filter(|t| t.order_id == order_id)
            .cloned()
            .collect();
        records.sort_by_key(|t| t.id);
        records
    }

    pub fn dump(&self) -> StoreState {
        self.state.lock().unwrap().clone()
    }

    /// Number of write operations issued, effective or not
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(StoreError::Timeout(std::time::Duration::from_secs(10)));
        }
        Ok(())
    }

    fn write(&self) -> Result<std::sync::MutexGuard<'_, StoreState>, StoreError> {
        self.check_available()?;
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().unwrap())
    }

    fn order_and_delivery(
        state: &StoreState,
        order_id: i32,
    ) -> Result<(OrderRow, DeliveryRow), StoreError> {
        let order = state.orders.get(&order_id).cloned().ok_or(StoreError::NotFound {
            entity: "order",
            order_id,
        })?;
        let delivery = order
            .delivery_id
            .and_then(|id| state.deliveries.get(&id).cloned())
            .ok_or(StoreError::NotFound {
                entity: "delivery",
                order_id,
            })?;
        Ok((order, delivery))
    }
}

fn move_order(order: &mut OrderRow, to: OrderStatus) -> bool {
    if order.status.can_transition_to(to) {
        order.status = to;
        true
    } else {
        false
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn load_eligible(&self, predicate: Eligibility) -> Result<Vec<i32>, StoreError> {
        self.check_available()?;
        let state = self.state.lock().unwrap();

        let mut ids: Vec<i32> = state
            .orders
            .values()
            .filter(|order| {
                let Some(delivery) = order.delivery_id.and_then(|id| state.deliveries.get(&id))
                else {
                    return false;
                };
                match predicate {
                    Eligibility::AwaitingDeliveryUpdate => {
                        delivery.status == DeliveryStatus::InProgress
                            && delivery.external_id.is_some()
                    }
                    Eligibility::AwaitingDispatch => {
                        order.status == OrderStatus::Paid
                            && delivery.status == DeliveryStatus::New
                            && delivery.external_id.is_none()
                    }
                }
            })
            .map(|order| order.id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn load_delivery_snapshot(&self, order_id: i32) -> Result<DeliverySnapshot, StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        let (order, delivery) = Self::order_and_delivery(&state, order_id)?;

        if self.complete_after_snapshot.load(Ordering::SeqCst) {
            if let Some(row) = state.deliveries.get_mut(&delivery.id) {
                row.status = DeliveryStatus::Completed;
            }
            if let Some(row) = state.orders.get_mut(&order_id) {
                move_order(row, OrderStatus::Completed);
            }
        }

        Ok(DeliverySnapshot {
            order_id,
            order_status: order.status,
            delivery_id: delivery.id,
            status: delivery.status,
            carrier_status: delivery.carrier_status,
            tracking_number: delivery.tracking_number,
            external_id: delivery.external_id,
            recipient_email: order.contact.email,
        })
    }

    async fn load_dispatch_snapshot(&self, order_id: i32) -> Result<DispatchSnapshot, StoreError> {
        self.check_available()?;
        let state = self.state.lock().unwrap();
        let (order, delivery) = Self::order_and_delivery(&state, order_id)?;

        Ok(DispatchSnapshot {
            order_id,
            order_status: order.status,
            delivery_id: delivery.id,
            delivery_status: delivery.status,
            external_id: delivery.external_id,
            method: delivery.method,
            address: delivery.address,
            pickup_point: delivery.pickup_point,
            city_code: delivery.city_code,
            postal_code: delivery.postal_code,
            recipient: order.contact,
            item_count: order.item_count,
        })
    }

    async fn load_payment_snapshot(&self, order_id: i32) -> Result<PaymentSnapshot, StoreError> {
        self.check_available()?;
        let state = self.state.lock().unwrap();
        let order = state.orders.get(&order_id).ok_or(StoreError::NotFound {
            entity: "order",
            order_id,
        })?;

        Ok(PaymentSnapshot {
            order_id,
            status: order.status,
            total_price: order.total_price,
            recipient_email: order.contact.email.clone(),
            transaction: order
                .transaction_id
                .and_then(|id| state.transactions.get(&id).cloned()),
        })
    }

    async fn update_carrier_status(&self, delivery_id: i32, status: &str) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if let Some(delivery) = state.deliveries.get_mut(&delivery_id) {
            delivery.carrier_status = Some(status.to_string());
        }
        Ok(())
    }

    async fn update_tracking_number(
        &self,
        delivery_id: i32,
        number: &str,
    ) -> Result<bool, StoreError> {
        let mut state = self.write()?;
        match state.deliveries.get_mut(&delivery_id) {
            Some(delivery) if delivery.tracking_number.as_deref().unwrap_or("").is_empty() => {
                delivery.tracking_number = Some(number.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_dispatched(&self, delivery_id: i32, external_id: &str) -> Result<bool, StoreError> {
        let mut state = self.write()?;
        match state.deliveries.get_mut(&delivery_id) {
            Some(delivery)
                if delivery.external_id.is_none() && delivery.status == DeliveryStatus::New =>
            {
                delivery.external_id = Some(external_id.to_string());
                delivery.status = DeliveryStatus::InProgress;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete_delivery(&self, order_id: i32, delivery_id: i32) -> Result<bool, StoreError> {
        let mut state = self.write()?;
        match state.deliveries.get_mut(&delivery_id) {
            Some(delivery) if delivery.status == DeliveryStatus::InProgress => {
                delivery.status = DeliveryStatus::Completed;
            }
            _ => return Ok(false),
        }
        if let Some(order) = state.orders.get_mut(&order_id) {
            move_order(order, OrderStatus::Completed);
        }
        Ok(true)
    }

    async fn cancel_order(&self, order_id: i32, transaction_id: i32) -> Result<bool, StoreError> {
        let mut state = self.write()?;
        let cancelled = state
            .orders
            .get_mut(&order_id)
            .map(|order| move_order(order, OrderStatus::Cancelled))
            .unwrap_or(false);
        if !cancelled {
            return Ok(false);
        }
        if let Some(record) = state.transactions.get_mut(&transaction_id) {
            if record.status == TransactionStatus::Pending {
                record.status = TransactionStatus::Unsuccessful;
            }
        }
        Ok(true)
    }

    async fn update_order_status(
        &self,
        order_id: i32,
        status: OrderStatus,
    ) -> Result<bool, StoreError> {
        let mut state = self.write()?;
        Ok(state
            .orders
            .get_mut(&order_id)
            .map(|order| move_order(order, status))
            .unwrap_or(false))
    }

    async fn insert_pending_transaction(
        &self,
        transaction: NewTransaction,
    ) -> Result<TransactionRecord, StoreError> {
        let id = self.next_transaction_id.fetch_add(1, Ordering::SeqCst) as i32;
        let mut state = self.write()?;

        for existing in state.transactions.values_mut() {
            if existing.order_id == transaction.order_id
                && existing.status == TransactionStatus::Pending
            {
                existing.status = TransactionStatus::Unsuccessful;
            }
        }

        let record = TransactionRecord {
            id,
            order_id: transaction.order_id,
            status: TransactionStatus::Pending,
            amount: transaction.amount,
            merchant_ref: transaction.merchant_ref,
            gateway_order_id: transaction.gateway_order_id,
            bank_status: None,
        };
        state.transactions.insert(id, record.clone());
        if let Some(order) = state.orders.get_mut(&transaction.order_id) {
            order.transaction_id = Some(id);
        }
        Ok(record)
    }

    async fn record_transaction_result(
        &self,
        order_id: i32,
        transaction_id: i32,
        result: TransactionResult,
    ) -> Result<bool, StoreError> {
        let mut state = self.write()?;

        let applied = match state.transactions.get_mut(&transaction_id) {
            Some(record) if record.status.can_transition_to(result.status) => {
                record.status = result.status;
                record.bank_status = result.bank_status;
                true
            }
            _ => false,
        };

        if applied && result.status == TransactionStatus::Successful {
            if let Some(order) = state.orders.get_mut(&order_id) {
                move_order(order, OrderStatus::Paid);
            }
        }
        Ok(applied)
    }
}

// ---------------------------------------------------------------------------
// Carrier
// ---------------------------------------------------------------------------

pub fn unavailable(provider: &'static str) -> ProviderError {
    ProviderError::Status {
        provider,
        status: 503,
        body: "service unavailable".to_string(),
    }
}

/// Scripted carrier. `None` responses fail with HTTP 503.
#[derive(Default)]
pub struct FakeCarrier {
    pub fail_token: AtomicBool,
    pub order_info: Mutex<Option<CarrierOrderInfo>>,
    pub created_uuid: Mutex<Option<String>>,
    pub created_requests: Mutex<Vec<CarrierOrderRequest>>,
    pub token_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
}

impl FakeCarrier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond_with(&self, statuses: &[&str], tracking: Option<&str>) {
        *self.order_info.lock().unwrap() = Some(CarrierOrderInfo {
            tracking_number: tracking.map(str::to_string),
            statuses: statuses.iter().map(|s| s.to_string()).collect(),
        });
    }

    pub fn create_returns(&self, uuid: Option<&str>) {
        *self.created_uuid.lock().unwrap() = uuid.map(str::to_string);
    }

    pub fn requests(&self) -> Vec<CarrierOrderRequest> {
        self.created_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Carrier for FakeCarrier {
    async fn access_token(&self) -> Result<String, ProviderError> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_token.load(Ordering::SeqCst) {
            return Err(unavailable("carrier"));
        }
        Ok("token-1".to_string())
    }

    async fn create_order(
        &self,
        request: &CarrierOrderRequest,
        token: &str,
    ) -> Result<CreatedOrder, ProviderError> {
        assert_eq!(token, "token-1");
        self.created_requests.lock().unwrap().push(request.clone());
        match self.created_uuid.lock().unwrap().clone() {
            Some(entity_uuid) => Ok(CreatedOrder { entity_uuid }),
            None => Err(unavailable("carrier")),
        }
    }

    async fn get_order(
        &self,
        _entity_uuid: &str,
        token: &str,
    ) -> Result<CarrierOrderInfo, ProviderError> {
        assert_eq!(token, "token-1");
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.order_info
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| unavailable("carrier"))
    }
}

// ---------------------------------------------------------------------------
// Payment gateway
// ---------------------------------------------------------------------------

pub struct FakeGateway {
    pub fail_register: AtomicBool,
    pub registered: Mutex<Vec<PreAuthRequest>>,
    pub action_code: Mutex<Option<i32>>,
    pub status_calls: AtomicUsize,
    pub reversal_code: Mutex<String>,
    pub reversals: Mutex<Vec<String>>,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fail_register: AtomicBool::new(false),
            registered: Mutex::new(Vec::new()),
            action_code: Mutex::new(None),
            status_calls: AtomicUsize::new(0),
            reversal_code: Mutex::new("6".to_string()),
            reversals: Mutex::new(Vec::new()),
        })
    }

    pub fn set_action_code(&self, code: i32) {
        *self.action_code.lock().unwrap() = Some(code);
    }

    pub fn set_reversal_code(&self, code: &str) {
        *self.reversal_code.lock().unwrap() = code.to_string();
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn register_pre_auth(
        &self,
        request: &PreAuthRequest,
    ) -> Result<PreAuthResponse, ProviderError> {
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(unavailable("payment gateway"));
        }
        let mut registered = self.registered.lock().unwrap();
        registered.push(request.clone());
        let seq = registered.len();
        Ok(PreAuthResponse {
            gateway_order_id: format!("gw-{}", seq),
            form_url: format!("https://pay.test/form/gw-{}", seq),
        })
    }

    async fn order_status(&self, _gateway_order_id: &str) -> Result<GatewayOrderStatus, ProviderError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        match *self.action_code.lock().unwrap() {
            Some(action_code) => Ok(GatewayOrderStatus {
                action_code,
                bank_status: Some(if action_code == 0 { "1" } else { "6" }.to_string()),
            }),
            None => Err(unavailable("payment gateway")),
        }
    }

    async fn reverse(&self, gateway_order_id: &str) -> Result<ReversalResponse, ProviderError> {
        self.reversals
            .lock()
            .unwrap()
            .push(gateway_order_id.to_string());
        Ok(ReversalResponse {
            error_code: self.reversal_code.lock().unwrap().clone(),
            error_message: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
    pub fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), ProviderError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(unavailable("mail service"));
        }
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}
