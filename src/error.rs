//! Error taxonomy for the reconciliation engine and the payment lifecycle
//!
//! Scheduler-driven handlers log these and leave the row for the next tick.
//! Synchronous callers get them back as-is.

use std::time::Duration;

use sea_orm::DbErr;
use thiserror::Error;

/// How a failed external call should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network error, timeout or 5xx
    Transient,
    /// Body could not be decoded or a required field is missing
    Malformed,
    /// Provider answered and said no
    Rejected,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Transient => write!(f, "transient"),
            FailureKind::Malformed => write!(f, "malformed"),
            FailureKind::Rejected => write!(f, "rejected"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} request failed: {source}")]
    Transport {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider} sent a malformed response: {reason}")]
    Malformed {
        provider: &'static str,
        reason: String,
    },

    #[error("{provider} rejected the request: {reason}")]
    Rejected {
        provider: &'static str,
        reason: String,
    },
}

impl ProviderError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ProviderError::Transport { source, .. } if source.is_decode() => FailureKind::Malformed,
            ProviderError::Transport { .. } => FailureKind::Transient,
            ProviderError::Status { status, .. } if *status >= 500 || *status == 429 => {
                FailureKind::Transient
            }
            ProviderError::Status { .. } => FailureKind::Rejected,
            ProviderError::Malformed { .. } => FailureKind::Malformed,
            ProviderError::Rejected { .. } => FailureKind::Rejected,
        }
    }

    pub fn rejected(provider: &'static str, reason: impl Into<String>) -> Self {
        ProviderError::Rejected {
            provider,
            reason: reason.into(),
        }
    }

    pub fn malformed(provider: &'static str, reason: impl Into<String>) -> Self {
        ProviderError::Malformed {
            provider,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] DbErr),

    #[error("store operation exceeded {0:?}")]
    Timeout(Duration),

    #[error("{entity} for order {order_id} not found")]
    NotFound {
        entity: &'static str,
        order_id: i32,
    },

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Failure of one reconciliation job. The worker logs it; the next tick retries.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("order {order_id} is not reconcilable: {reason}")]
    Skipped { order_id: i32, reason: String },
}

/// Failure surfaced to a synchronous payment caller
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("order {0} not found")]
    OrderNotFound(i32),

    #[error("order {order_id} has no payment transaction")]
    NoTransaction { order_id: i32 },

    #[error("order {order_id} cannot be paid or cancelled in status {status}")]
    InvalidState { order_id: i32, status: String },

    #[error("invalid payment amount: {0}")]
    InvalidAmount(String),

    #[error("gateway refused reversal with code {code}")]
    CancellationRejected { code: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}
