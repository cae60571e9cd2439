//! Delivery Sync
//!
//! Polls the carrier for every delivery in progress, records the tracking
//! number the first time it appears, mirrors the carrier status and closes
//! the delivery and its order once the parcel is delivered.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::scheduler::Reconciler;
use crate::error::ReconcileError;
use crate::models::delivery::DeliveryStatus;
use crate::models::notification::{Notification, Template};
use crate::models::order::Eligibility;
use crate::services::carrier::Carrier;
use crate::services::notifier::{notify_best_effort, Notifier};
use crate::services::store::OrderStore;

pub const RECONCILER_NAME: &str = "delivery_sync";

/// What one reconciliation changed in the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub tracking_recorded: bool,
    pub status_changed: bool,
    pub completed: bool,
}

#[derive(Clone)]
pub struct DeliveryReconciler {
    store: Arc<dyn OrderStore>,
    carrier: Arc<dyn Carrier>,
    notifier: Arc<dyn Notifier>,
    delivered_code: String,
}

impl DeliveryReconciler {
    pub fn new(
        store: Arc<dyn OrderStore>,
        carrier: Arc<dyn Carrier>,
        notifier: Arc<dyn Notifier>,
        delivered_code: String,
    ) -> Self {
        Self {
            store,
            carrier,
            notifier,
            delivered_code,
        }
    }

    pub async fn reconcile_delivery(&self, order_id: i32) -> Result<DeliveryOutcome, ReconcileError> {
        let snapshot = self.store.load_delivery_snapshot(order_id).await?;

        // Stale job: an earlier pass already finished this delivery
        if snapshot.status != DeliveryStatus::InProgress {
            tracing::debug!(order_id, status = %snapshot.status, "Delivery no longer in progress");
            return Ok(DeliveryOutcome::default());
        }

        let external_id = snapshot
            .external_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ReconcileError::Skipped {
                order_id,
                reason: "delivery in progress without carrier id".to_string(),
            })?;

        let token = self.carrier.access_token().await?;
        let info = self.carrier.get_order(external_id, &token).await?;

        let mut outcome = DeliveryOutcome::default();

        let local_tracking = snapshot.tracking_number.as_deref().unwrap_or("");
        if local_tracking.is_empty() {
            if let Some(number) = info.tracking_number.as_deref().filter(|n| !n.is_empty()) {
                outcome.tracking_recorded = self
                    .store
                    .update_tracking_number(snapshot.delivery_id, number)
                    .await?;
                if outcome.tracking_recorded {
                    tracing::info!(order_id, tracking_number = %number, "Tracking number recorded");
                }
            }
        }

        let Some(latest) = info.latest_status() else {
            return Ok(outcome);
        };

        if snapshot.carrier_status.as_deref() != Some(latest) {
            self.store
                .update_carrier_status(snapshot.delivery_id, latest)
                .await?;
            outcome.status_changed = true;
            tracing::info!(
                order_id,
                from = snapshot.carrier_status.as_deref().unwrap_or("-"),
                to = %latest,
                "Carrier status changed"
            );
        }

        if latest == self.delivered_code {
            outcome.completed = self
                .store
                .complete_delivery(order_id, snapshot.delivery_id)
                .await?;
            if !outcome.completed {
                tracing::debug!(order_id, "Delivery completed by another job, not notifying");
                return Ok(outcome);
            }
            tracing::info!(order_id, delivery_id = snapshot.delivery_id, "Delivery completed");

            if let Some(recipient) = snapshot.recipient_email {
                let tracking = snapshot
                    .tracking_number
                    .filter(|n| !n.is_empty())
                    .or(info.tracking_number)
                    .unwrap_or_default();
                notify_best_effort(
                    self.notifier.as_ref(),
                    Notification {
                        recipient,
                        template: Template::OrderDelivered,
                        data: json!({
                            "order_id": order_id,
                            "tracking_number": tracking,
                        }),
                    },
                )
                .await;
            }
        }

        Ok(outcome)
    }
}

#[async_trait]
impl Reconciler for DeliveryReconciler {
    fn name(&self) -> &'static str {
        RECONCILER_NAME
    }

    fn eligibility(&self) -> Eligibility {
        Eligibility::AwaitingDeliveryUpdate
    }

    async fn reconcile(&self, order_id: i32) -> Result<(), ReconcileError> {
        self.reconcile_delivery(order_id).await.map(|_| ())
    }
}
