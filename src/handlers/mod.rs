use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub mod health;
pub mod payment;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/orders/{id}/payment", post(payment::create_payment))
        .route("/orders/{id}/payment/status", get(payment::get_payment_status))
        .route("/orders/{id}/payment/cancel", post(payment::cancel_payment))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
