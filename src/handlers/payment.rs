use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::error::{FailureKind, PaymentError, StoreError};
use crate::models::payment::{
    CancelPaymentResponse, CreatePaymentRequest, CreatePaymentResponse, ErrorResponse,
    PaymentStatusResponse,
};
use crate::AppState;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(error: PaymentError) -> ApiError {
    let status = match &error {
        PaymentError::OrderNotFound(_) | PaymentError::NoTransaction { .. } => StatusCode::NOT_FOUND,
        PaymentError::InvalidState { .. } => StatusCode::CONFLICT,
        PaymentError::InvalidAmount(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PaymentError::CancellationRejected { .. } => StatusCode::BAD_GATEWAY,
        PaymentError::Provider(e) if e.kind() == FailureKind::Transient => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        PaymentError::Provider(_) => StatusCode::BAD_GATEWAY,
        PaymentError::Store(StoreError::Timeout(_)) => StatusCode::SERVICE_UNAVAILABLE,
        PaymentError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        tracing::error!(error = %error, "Payment request failed");
    }

    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

// POST /orders/{id}/payment
pub async fn create_payment(
    State(state): State<AppState>,
    Path(order_id): Path<i32>,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<Json<CreatePaymentResponse>, ApiError> {
    // Charge what the order says, never what the client says
    let snapshot = state
        .store
        .load_payment_snapshot(order_id)
        .await
        .map_err(|e| match e {
            StoreError::NotFound { .. } => error_response(PaymentError::OrderNotFound(order_id)),
            other => error_response(PaymentError::Store(other)),
        })?;

    let created = state
        .transactions
        .create_transaction(order_id, snapshot.total_price, &request.good_type)
        .await
        .map_err(error_response)?;

    Ok(Json(CreatePaymentResponse {
        order_id,
        form_url: created.form_url,
    }))
}

// GET /orders/{id}/payment/status
pub async fn get_payment_status(
    State(state): State<AppState>,
    Path(order_id): Path<i32>,
) -> Result<Json<PaymentStatusResponse>, ApiError> {
    let status = state
        .transactions
        .find_transaction_status(order_id)
        .await
        .map_err(error_response)?;

    Ok(Json(PaymentStatusResponse { order_id, status }))
}

// POST /orders/{id}/payment/cancel
pub async fn cancel_payment(
    State(state): State<AppState>,
    Path(order_id): Path<i32>,
) -> Result<Json<CancelPaymentResponse>, ApiError> {
    state
        .transactions
        .cancel_transaction(order_id)
        .await
        .map_err(error_response)?;

    Ok(Json(CancelPaymentResponse {
        order_id,
        status: "CANCELLED".to_string(),
    }))
}
