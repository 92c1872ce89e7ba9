pub mod checkout;
pub mod common;
pub mod discounts;
pub mod downloads;
pub mod health;
pub mod orders;
pub mod payment_webhooks;

use axum::{
    routing::{get, post},
    Json, Router,
};
use utoipa::OpenApi;

use crate::openapi::ApiDoc;
use crate::AppState;

/// Full route table for the storefront core.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .route("/api/checkout", post(checkout::create_checkout))
        .route("/api/config/stripe", get(checkout::stripe_config))
        .route("/api/discounts/validate", get(discounts::validate_discount))
        .route("/api/orders/:id", get(orders::get_order))
        .route("/api/orders/:id/downloads", get(orders::list_order_downloads))
        .route("/api/download/:token", get(downloads::serve_download))
        .route("/api/stripe/webhook", post(payment_webhooks::stripe_webhook))
        .with_state(state)
}
