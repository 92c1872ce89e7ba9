use axum::{extract::State, http::HeaderMap, response::Response};
use bytes::Bytes;
use serde_json::json;
use tracing::{error, warn};

use super::common::success_response;
use crate::errors::ServiceError;
use crate::payments::webhook::{self, WebhookEvent};
use crate::AppState;

/// Receives signed provider notifications.
///
/// A bad signature is the only rejection. Once the signature verifies, the
/// delivery is acknowledged even when processing stumbles; the provider's
/// retry plus the idempotent state machine make redelivery safe.
#[utoipa::path(
    post,
    path = "/api/stripe/webhook",
    request_body(content = String, description = "Raw signed event payload"),
    responses(
        (status = 200, description = "Delivery acknowledged"),
        (status = 401, description = "Missing or invalid signature")
    )
)]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ServiceError> {
    if !webhook::verify_signature(
        &headers,
        &body,
        &state.config.stripe_webhook_secret,
        state.config.stripe_webhook_tolerance_secs,
    ) {
        return Err(ServiceError::Unauthorized(
            "invalid webhook signature".into(),
        ));
    }

    match serde_json::from_slice::<WebhookEvent>(&body) {
        Ok(event) => {
            if let Err(e) = state.services.reconciliation.process_event(event).await {
                error!("webhook processing failed: {}", e);
            }
        }
        Err(e) => warn!("undecodable webhook payload: {}", e),
    }

    Ok(success_response(json!({ "received": true })))
}
