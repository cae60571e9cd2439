//! Delivery status machine and the delivery snapshots read by reconcilers
//!
//! Local status progresses: NEW → IN_PROGRESS → COMPLETED

use serde::{Deserialize, Serialize};

use super::order::{Contact, OrderStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    /// Not yet registered with the carrier
    New,
    /// Registered, carrier has an entity for it
    InProgress,
    /// Carrier reported the parcel as delivered
    Completed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::New => "NEW",
            DeliveryStatus::InProgress => "IN_PROGRESS",
            DeliveryStatus::Completed => "COMPLETED",
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "NEW" => Ok(DeliveryStatus::New),
            "IN_PROGRESS" => Ok(DeliveryStatus::InProgress),
            "COMPLETED" => Ok(DeliveryStatus::Completed),
            _ => Err(format!("Unknown delivery status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryMethod {
    /// Courier brings the parcel to the recipient's address
    DoorToDoor,
    /// Recipient collects the parcel at a carrier pickup point
    DoorToOffice,
}

impl DeliveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMethod::DoorToDoor => "DOOR_TO_DOOR",
            DeliveryMethod::DoorToOffice => "DOOR_TO_OFFICE",
        }
    }
}

impl std::fmt::Display for DeliveryMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeliveryMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "DOOR_TO_DOOR" => Ok(DeliveryMethod::DoorToDoor),
            "DOOR_TO_OFFICE" => Ok(DeliveryMethod::DoorToOffice),
            _ => Err(format!("Unknown delivery method: {}", s)),
        }
    }
}

/// Everything the delivery reconciler reads for one order
#[derive(Debug, Clone, PartialEq)]
pub struct DeliverySnapshot {
    pub order_id: i32,
    pub order_status: OrderStatus,
    pub delivery_id: i32,
    pub status: DeliveryStatus,
    pub carrier_status: Option<String>,
    pub tracking_number: Option<String>,
    /// Carrier entity uuid
    pub external_id: Option<String>,
    pub recipient_email: Option<String>,
}

/// Everything the print-dispatch reconciler reads for one order
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSnapshot {
    pub order_id: i32,
    pub order_status: OrderStatus,
    pub delivery_id: i32,
    pub delivery_status: DeliveryStatus,
    pub external_id: Option<String>,
    pub method: DeliveryMethod,
    pub address: Option<String>,
    pub pickup_point: Option<String>,
    pub city_code: Option<i32>,
    pub postal_code: Option<String>,
    pub recipient: Contact,
    pub item_count: u32,
}
