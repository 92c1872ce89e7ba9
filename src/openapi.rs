use utoipa::OpenApi;

use crate::errors::ErrorResponse;
use crate::handlers;
use crate::services::checkout::{
    CheckoutItem, CheckoutRequest, CheckoutResponse, CheckoutSummary, ShippingAddressInput,
};

/// OpenAPI document for the storefront core, served at `/api/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Atelier Storefront API",
        description = "Checkout, payment reconciliation, and digital delivery for a single-artist gallery"
    ),
    paths(
        handlers::health::health_check,
        handlers::checkout::create_checkout,
        handlers::checkout::stripe_config,
        handlers::discounts::validate_discount,
        handlers::orders::get_order,
        handlers::orders::list_order_downloads,
        handlers::downloads::serve_download,
        handlers::payment_webhooks::stripe_webhook,
    ),
    components(schemas(
        ErrorResponse,
        CheckoutItem,
        ShippingAddressInput,
        CheckoutRequest,
        CheckoutSummary,
        CheckoutResponse,
        handlers::health::HealthResponse,
        handlers::checkout::StripeConfigResponse,
        handlers::discounts::DiscountView,
        handlers::orders::OrderView,
        handlers::orders::OrderItemView,
        handlers::orders::OrderDetailsResponse,
        handlers::orders::DownloadEntry,
        handlers::orders::OrderDownloadsResponse,
    ))
)]
pub struct ApiDoc;
