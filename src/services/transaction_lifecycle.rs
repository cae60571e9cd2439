//! Payment transaction lifecycle
//!
//! Called synchronously from request handlers. Shares the engine's
//! discipline: nothing caller-visible is written until the gateway has
//! answered, and every store write is guarded by the transaction and order
//! state machines.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::error::{PaymentError, StoreError};
use crate::models::notification::{Notification, Template};
use crate::models::order::{OrderStatus, PaymentSnapshot};
use crate::models::transaction::{
    NewTransaction, TransactionRecord, TransactionResult, TransactionStatus,
};
use crate::services::notifier::{notify_best_effort, Notifier};
use crate::services::payment_gateway::{PaymentGateway, PreAuthRequest};
use crate::services::store::OrderStore;

/// Length of the random part of a merchant reference
const REF_SUFFIX_LEN: usize = 12;

/// Settings the lifecycle takes from the gateway configuration
#[derive(Debug, Clone)]
pub struct PaymentPolicy {
    pub return_url: String,
    pub reversal_ok_codes: Vec<String>,
}

impl From<&GatewayConfig> for PaymentPolicy {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            return_url: config.return_url.clone(),
            reversal_ok_codes: config.reversal_ok_codes.clone(),
        }
    }
}

/// Result of a successful registration
#[derive(Debug, Clone)]
pub struct CreatedPayment {
    pub transaction: TransactionRecord,
    /// Hosted payment page to send the customer to
    pub form_url: String,
}

#[derive(Clone)]
pub struct TransactionService {
    store: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    policy: PaymentPolicy,
}

/// Merchant order reference: the order id plus a random suffix, so retried
/// payment attempts for one order never collide at the gateway
pub fn merchant_reference(order_id: i32) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", order_id, &suffix[..REF_SUFFIX_LEN])
}

impl TransactionService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        policy: PaymentPolicy,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            policy,
        }
    }

    async fn snapshot(&self, order_id: i32) -> Result<PaymentSnapshot, PaymentError> {
        self.store
            .load_payment_snapshot(order_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound { .. } => PaymentError::OrderNotFound(order_id),
                other => PaymentError::Store(other),
            })
    }

    /// Register a pre-authorization and return the hosted payment page
    pub async fn create_transaction(
        &self,
        order_id: i32,
        amount: Decimal,
        good_type: &str,
    ) -> Result<CreatedPayment, PaymentError> {
        if amount <= Decimal::ZERO {
            return Err(PaymentError::InvalidAmount(amount.to_string()));
        }

        let snapshot = self.snapshot(order_id).await?;
        if snapshot.status != OrderStatus::Submitted {
            return Err(PaymentError::InvalidState {
                order_id,
                status: snapshot.status.to_string(),
            });
        }

        let request = PreAuthRequest {
            order_ref: merchant_reference(order_id),
            amount,
            return_url: self.policy.return_url.clone(),
            description: format!("{} order {}", good_type, order_id),
        };

        let registered = self.gateway.register_pre_auth(&request).await.map_err(|e| {
            tracing::warn!(order_id, kind = %e.kind(), error = %e, "Payment registration failed");
            e
        })?;

        let transaction = self
            .store
            .insert_pending_transaction(NewTransaction {
                order_id,
                amount,
                merchant_ref: request.order_ref,
                gateway_order_id: registered.gateway_order_id,
            })
            .await?;

        tracing::info!(
            order_id,
            transaction_id = transaction.id,
            merchant_ref = %transaction.merchant_ref,
            amount = %amount,
            "Payment transaction registered"
        );

        Ok(CreatedPayment {
            transaction,
            form_url: registered.form_url,
        })
    }

    /// Resolve the order's transaction against the gateway
    pub async fn find_transaction_status(
        &self,
        order_id: i32,
    ) -> Result<TransactionStatus, PaymentError> {
        let snapshot = self.snapshot(order_id).await?;
        let transaction = snapshot
            .transaction
            .ok_or(PaymentError::NoTransaction { order_id })?;

        if transaction.status.is_terminal() {
            return Ok(transaction.status);
        }

        let gateway_status = self
            .gateway
            .order_status(&transaction.gateway_order_id)
            .await
            .map_err(|e| {
                tracing::warn!(order_id, kind = %e.kind(), error = %e, "Payment status lookup failed");
                e
            })?;

        let status = if gateway_status.action_code == 0 {
            TransactionStatus::Successful
        } else {
            TransactionStatus::Unsuccessful
        };

        let applied = self
            .store
            .record_transaction_result(
                order_id,
                transaction.id,
                TransactionResult {
                    status,
                    bank_status: gateway_status.bank_status,
                },
            )
            .await?;

        if !applied {
            // A concurrent lookup resolved it first; its verdict stands
            let current = self.snapshot(order_id).await?;
            return current
                .transaction
                .map(|t| t.status)
                .ok_or(PaymentError::NoTransaction { order_id });
        }

        tracing::info!(
            order_id,
            transaction_id = transaction.id,
            action_code = gateway_status.action_code,
            status = %status,
            "Payment transaction resolved"
        );

        Ok(status)
    }

    /// Reverse the payment and cancel the order
    pub async fn cancel_transaction(&self, order_id: i32) -> Result<(), PaymentError> {
        let snapshot = self.snapshot(order_id).await?;
        if snapshot.status.is_terminal() {
            return Err(PaymentError::InvalidState {
                order_id,
                status: snapshot.status.to_string(),
            });
        }

        let transaction = snapshot
            .transaction
            .ok_or(PaymentError::NoTransaction { order_id })?;

        let reversal = self
            .gateway
            .reverse(&transaction.gateway_order_id)
            .await
            .map_err(|e| {
                tracing::warn!(order_id, kind = %e.kind(), error = %e, "Payment reversal failed");
                e
            })?;

        if !self.policy.reversal_ok_codes.contains(&reversal.error_code) {
            tracing::warn!(
                order_id,
                code = %reversal.error_code,
                message = reversal.error_message.as_deref().unwrap_or(""),
                "Gateway refused reversal"
            );
            return Err(PaymentError::CancellationRejected {
                code: reversal.error_code,
            });
        }

        if !self.store.cancel_order(order_id, transaction.id).await? {
            let current = self.snapshot(order_id).await?;
            return Err(PaymentError::InvalidState {
                order_id,
                status: current.status.to_string(),
            });
        }

        tracing::info!(order_id, code = %reversal.error_code, "Order cancelled after reversal");

        if let Some(recipient) = snapshot.recipient_email {
            notify_best_effort(
                self.notifier.as_ref(),
                Notification {
                    recipient,
                    template: Template::OrderCancelled,
                    data: json!({
                        "order_id": order_id,
                        "amount": transaction.amount.to_string(),
                    }),
                },
            )
            .await;
        }

        Ok(())
    }
}
