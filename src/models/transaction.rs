//! Payment transaction status machine
//!
//! Status progresses: PENDING → SUCCESSFUL
//!                            ↘ UNSUCCESSFUL

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Successful,
    Unsuccessful,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Successful => "SUCCESSFUL",
            TransactionStatus::Unsuccessful => "UNSUCCESSFUL",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// Only PENDING may move, and only to a terminal state
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        *self == TransactionStatus::Pending && next.is_terminal()
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(TransactionStatus::Pending),
            "SUCCESSFUL" => Ok(TransactionStatus::Successful),
            "UNSUCCESSFUL" => Ok(TransactionStatus::Unsuccessful),
            _ => Err(format!("Unknown transaction status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub id: i32,
    pub order_id: i32,
    pub status: TransactionStatus,
    pub amount: Decimal,
    pub merchant_ref: String,
    pub gateway_order_id: String,
    pub bank_status: Option<String>,
}

/// A registration the gateway has accepted, ready to be persisted
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub order_id: i32,
    pub amount: Decimal,
    pub merchant_ref: String,
    pub gateway_order_id: String,
}

/// Final verdict read back from the gateway
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionResult {
    pub status: TransactionStatus,
    pub bank_status: Option<String>,
}
