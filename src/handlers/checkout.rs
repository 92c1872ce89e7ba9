use axum::{extract::State, response::Response, Json};
use serde::Serialize;
use utoipa::ToSchema;

use super::common::{success_response, validate_input};
use crate::errors::ServiceError;
use crate::services::checkout::{CheckoutRequest, CheckoutResponse};
use crate::AppState;

/// Starts a checkout: validates the cart, persists a pending order, and
/// returns the hosted payment session to redirect the buyer to.
#[utoipa::path(
    post,
    path = "/api/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Hosted payment session created", body = CheckoutResponse),
        (status = 400, description = "Invalid cart or missing shipping address"),
        (status = 404, description = "Unknown product in cart"),
        (status = 409, description = "Product sold, inactive, or quantity not purchasable"),
        (status = 502, description = "Payment provider unavailable")
    )
)]
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&request)?;
    for item in &request.items {
        validate_input(item)?;
    }
    if let Some(address) = &request.shipping_address {
        validate_input(address)?;
    }

    let response = state.services.checkout.checkout(request).await?;
    Ok(success_response(response))
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StripeConfigResponse {
    pub publishable_key: String,
}

/// Publishable-key handoff for the storefront client.
#[utoipa::path(
    get,
    path = "/api/config/stripe",
    responses((status = 200, description = "Client-side payment configuration", body = StripeConfigResponse))
)]
pub async fn stripe_config(State(state): State<AppState>) -> Response {
    success_response(StripeConfigResponse {
        publishable_key: state.config.stripe_publishable_key.clone(),
    })
}
