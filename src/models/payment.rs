//! Request and response bodies for the payment endpoints

use serde::{Deserialize, Serialize};

use super::transaction::TransactionStatus;

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePaymentRequest {
    /// Product line shown on the hosted payment page
    pub good_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePaymentResponse {
    pub order_id: i32,
    pub form_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentStatusResponse {
    pub order_id: i32,
    pub status: TransactionStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelPaymentResponse {
    pub order_id: i32,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
