use axum::{
    extract::{Query, State},
    response::Response,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::common::success_response;
use crate::entities::discount::DiscountType;
use crate::errors::ServiceError;
use crate::AppState;

#[derive(Deserialize, IntoParams)]
pub struct ValidateQuery {
    pub code: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiscountView {
    pub id: Uuid,
    pub code: String,
    pub discount_type: DiscountType,
    pub value: i64,
}

/// Storefront pre-check for a discount code, so the cart can surface why a
/// code will not apply before checkout. Checkout re-validates regardless.
#[utoipa::path(
    get,
    path = "/api/discounts/validate",
    params(ValidateQuery),
    responses(
        (status = 200, description = "Code is currently applicable", body = DiscountView),
        (status = 400, description = "Missing discount code"),
        (status = 404, description = "Unknown or inactive code"),
        (status = 409, description = "Usage limit reached"),
        (status = 410, description = "Code has expired")
    )
)]
pub async fn validate_discount(
    State(state): State<AppState>,
    Query(query): Query<ValidateQuery>,
) -> Result<Response, ServiceError> {
    let code = query
        .code
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .ok_or_else(|| ServiceError::Validation("Missing discount code".into()))?;

    let discount = state
        .services
        .catalog
        .find_discount_by_code(code)
        .await?
        .filter(|d| d.is_active)
        .ok_or_else(|| ServiceError::NotFound("Discount code not found".into()))?;

    let now = Utc::now();
    if discount.expires_at.is_some_and(|expires_at| expires_at < now) {
        return Err(ServiceError::Gone("Discount code has expired".into()));
    }

    if discount
        .max_uses
        .is_some_and(|max_uses| discount.used_count >= max_uses)
    {
        return Err(ServiceError::Conflict(
            "Discount code usage limit reached".into(),
        ));
    }

    Ok(success_response(DiscountView {
        id: discount.id,
        code: discount.code,
        discount_type: discount.discount_type,
        value: discount.value,
    }))
}
