// src/lib.rs

use std::sync::Arc;

use services::{store::OrderStore, transaction_lifecycle::TransactionService};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn OrderStore>,
    pub transactions: TransactionService,
}

pub mod entities {
    pub mod prelude;
    pub mod deliveries;
    pub mod orders;
    pub mod transactions;
}

pub mod models {
    pub mod delivery;
    pub mod notification;
    pub mod order;
    pub mod payment;
    pub mod transaction;
}

pub mod services {
    pub mod carrier;
    pub mod notifier;
    pub mod payment_gateway;
    pub mod store;
    pub mod transaction_lifecycle;
}

pub mod jobs {
    pub mod scheduler;
    pub mod worker_pool;
    pub mod delivery_sync;
    pub mod print_dispatch;
}

pub mod config;
pub mod error;
pub mod handlers;
