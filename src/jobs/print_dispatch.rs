//! Print Dispatch
//!
//! Hands paid orders to the carrier. The registration payload is built only
//! from stored order data, so re-sending it after a failure is safe.

use std::sync::Arc;

use async_trait::async_trait;

use super::scheduler::Reconciler;
use crate::config::{CarrierConfig, PackageSpec, SenderConfig, TariffCodes};
use crate::error::{ProviderError, ReconcileError};
use crate::models::delivery::{DeliveryMethod, DeliveryStatus, DispatchSnapshot};
use crate::models::order::{Eligibility, OrderStatus};
use crate::services::carrier::{
    Carrier, CarrierContact, CarrierLocation, CarrierOrderRequest, CarrierPackage, CarrierPhone,
};
use crate::services::store::OrderStore;

pub const RECONCILER_NAME: &str = "print_dispatch";

/// Carrier-side settings for building registrations
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub tariffs: TariffCodes,
    pub sender: SenderConfig,
    pub package: PackageSpec,
}

impl From<&CarrierConfig> for DispatchSettings {
    fn from(config: &CarrierConfig) -> Self {
        Self {
            tariffs: config.tariffs,
            sender: config.sender.clone(),
            package: config.package,
        }
    }
}

pub fn tariff_for(method: DeliveryMethod, tariffs: &TariffCodes) -> u32 {
    match method {
        DeliveryMethod::DoorToDoor => tariffs.door_to_door,
        DeliveryMethod::DoorToOffice => tariffs.door_to_office,
    }
}

/// One parcel per printed item. An order always ships at least one parcel.
pub fn build_packages(order_id: i32, item_count: u32, spec: &PackageSpec) -> Vec<CarrierPackage> {
    (1..=item_count.max(1))
        .map(|n| CarrierPackage {
            number: format!("{}-{}", order_id, n),
            weight: spec.item_weight_grams,
            length: spec.length_cm,
            width: spec.width_cm,
            height: spec.height_cm,
        })
        .collect()
}

/// Build the carrier registration for a paid order
pub fn build_order_request(
    snapshot: &DispatchSnapshot,
    settings: &DispatchSettings,
) -> Result<CarrierOrderRequest, String> {
    let (to_location, delivery_point) = match snapshot.method {
        DeliveryMethod::DoorToDoor => {
            let address = snapshot
                .address
                .clone()
                .filter(|a| !a.trim().is_empty())
                .ok_or("door-to-door delivery without address")?;
            (
                Some(CarrierLocation {
                    code: snapshot.city_code,
                    postal_code: snapshot.postal_code.clone(),
                    address,
                }),
                None,
            )
        }
        DeliveryMethod::DoorToOffice => {
            let point = snapshot
                .pickup_point
                .clone()
                .filter(|p| !p.trim().is_empty())
                .ok_or("door-to-office delivery without pickup point")?;
            (None, Some(point))
        }
    };

    Ok(CarrierOrderRequest {
        number: snapshot.order_id.to_string(),
        tariff_code: tariff_for(snapshot.method, &settings.tariffs),
        sender: CarrierContact {
            company: Some(settings.sender.company.clone()),
            name: settings.sender.name.clone(),
            email: None,
            phones: vec![CarrierPhone {
                number: settings.sender.phone.clone(),
            }],
        },
        recipient: CarrierContact {
            company: None,
            name: snapshot.recipient.name.clone(),
            email: snapshot.recipient.email.clone(),
            phones: vec![CarrierPhone {
                number: snapshot.recipient.phone.clone(),
            }],
        },
        from_location: CarrierLocation {
            code: Some(settings.sender.city_code),
            postal_code: None,
            address: settings.sender.address.clone(),
        },
        to_location,
        delivery_point,
        packages: build_packages(snapshot.order_id, snapshot.item_count, &settings.package),
    })
}

#[derive(Clone)]
pub struct DispatchReconciler {
    store: Arc<dyn OrderStore>,
    carrier: Arc<dyn Carrier>,
    settings: DispatchSettings,
}

impl DispatchReconciler {
    pub fn new(
        store: Arc<dyn OrderStore>,
        carrier: Arc<dyn Carrier>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            store,
            carrier,
            settings,
        }
    }

    /// Register the order with the carrier. Returns the carrier entity id when
    /// this call assigned it.
    pub async fn dispatch_order(&self, order_id: i32) -> Result<Option<String>, ReconcileError> {
        let snapshot = self.store.load_dispatch_snapshot(order_id).await?;

        if snapshot.order_status != OrderStatus::Paid
            || snapshot.delivery_status != DeliveryStatus::New
            || snapshot.external_id.is_some()
        {
            tracing::debug!(
                order_id,
                order_status = %snapshot.order_status,
                delivery_status = %snapshot.delivery_status,
                "Order already dispatched or not payable, nothing to do"
            );
            return Ok(None);
        }

        let request = build_order_request(&snapshot, &self.settings)
            .map_err(|reason| ReconcileError::Skipped { order_id, reason })?;

        let token = self.carrier.access_token().await?;
        let created = self.carrier.create_order(&request, &token).await?;

        if created.entity_uuid.is_empty() {
            return Err(ProviderError::rejected("carrier", "empty entity uuid").into());
        }

        if !self
            .store
            .mark_dispatched(snapshot.delivery_id, &created.entity_uuid)
            .await?
        {
            tracing::warn!(
                order_id,
                entity_uuid = %created.entity_uuid,
                "Delivery already carries a carrier id, keeping the existing one"
            );
            return Ok(None);
        }

        tracing::info!(
            order_id,
            delivery_id = snapshot.delivery_id,
            entity_uuid = %created.entity_uuid,
            tariff_code = request.tariff_code,
            packages = request.packages.len(),
            "Order handed to carrier"
        );

        Ok(Some(created.entity_uuid))
    }
}

#[async_trait]
impl Reconciler for DispatchReconciler {
    fn name(&self) -> &'static str {
        RECONCILER_NAME
    }

    fn eligibility(&self) -> Eligibility {
        Eligibility::AwaitingDispatch
    }

    async fn reconcile(&self, order_id: i32) -> Result<(), ReconcileError> {
        self.dispatch_order(order_id).await.map(|_| ())
    }
}
