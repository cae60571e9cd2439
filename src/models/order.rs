//! Order status machine and the order-level snapshots read by the engine
//!
//! Status progresses: SUBMITTED → PAID → COMPLETED
//!                    SUBMITTED | PAID → CANCELLED

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::transaction::TransactionRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created by the storefront, awaiting payment
    Submitted,
    /// Payment confirmed by the gateway
    Paid,
    /// Parcel delivered to the recipient
    Completed,
    /// Payment reversed, order abandoned
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Submitted => "SUBMITTED",
            OrderStatus::Paid => "PAID",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Statuses an order may be in right before moving to `self`.
    ///
    /// Includes `self` so that re-applying a transition is a no-op rather
    /// than an error.
    pub fn predecessors(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Submitted => &[OrderStatus::Submitted],
            OrderStatus::Paid => &[OrderStatus::Submitted, OrderStatus::Paid],
            OrderStatus::Completed => &[OrderStatus::Paid, OrderStatus::Completed],
            OrderStatus::Cancelled => &[
                OrderStatus::Submitted,
                OrderStatus::Paid,
                OrderStatus::Cancelled,
            ],
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        next.predecessors().contains(self)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SUBMITTED" => Ok(OrderStatus::Submitted),
            "PAID" => Ok(OrderStatus::Paid),
            "COMPLETED" => Ok(OrderStatus::Completed),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            _ => Err(format!("Unknown order status: {}", s)),
        }
    }
}

/// Recipient block copied onto the order at checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
}

/// What the payment lifecycle needs to know about an order
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentSnapshot {
    pub order_id: i32,
    pub status: OrderStatus,
    pub total_price: Decimal,
    pub recipient_email: Option<String>,
    /// The order's active transaction, if one was ever registered
    pub transaction: Option<TransactionRecord>,
}

/// Which reconciler a store scan is feeding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eligibility {
    /// Delivery registered with the carrier and not yet delivered
    AwaitingDeliveryUpdate,
    /// Order paid but not yet handed to the carrier
    AwaitingDispatch,
}

impl std::fmt::Display for Eligibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Eligibility::AwaitingDeliveryUpdate => write!(f, "awaiting_delivery_update"),
            Eligibility::AwaitingDispatch => write!(f, "awaiting_dispatch"),
        }
    }
}
