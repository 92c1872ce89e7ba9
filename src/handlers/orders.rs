use axum::{
    extract::{Path, Query, State},
    response::Response,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::common::success_response;
use crate::entities::order::PaymentStatus;
use crate::entities::{order, order_item};
use crate::errors::ServiceError;
use crate::AppState;

/// Buyer-facing order view. Contact and shipping details are deliberately
/// omitted; the order id alone must not expose them.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub id: Uuid,
    pub status: order::OrderStatus,
    pub payment_status: PaymentStatus,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
    pub created_at: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemView {
    pub product_id: Uuid,
    pub product_title: String,
    pub product_type: crate::entities::product::ProductType,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetailsResponse {
    pub order: OrderView,
    pub items: Vec<OrderItemView>,
}

impl OrderView {
    fn from_model(model: &order::Model) -> Self {
        Self {
            id: model.id,
            status: model.status,
            payment_status: model.payment_status,
            subtotal_cents: model.subtotal_cents,
            discount_cents: model.discount_cents,
            shipping_cents: model.shipping_cents,
            total_cents: model.total_cents,
            created_at: model.created_at.to_rfc3339(),
        }
    }
}

impl OrderItemView {
    fn from_model(model: &order_item::Model) -> Self {
        Self {
            product_id: model.product_id,
            product_title: model.product_title.clone(),
            product_type: model.product_type,
            quantity: model.quantity,
            unit_price_cents: model.unit_price_cents,
            line_total_cents: model.line_total_cents,
        }
    }
}

/// Order status for the post-payment success page.
#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with line items", body = OrderDetailsResponse),
        (status = 404, description = "Unknown order")
    )
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let order = state
        .services
        .orders
        .get_order(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order not found: {}", id)))?;
    let items = state.services.orders.get_order_items(id).await?;

    Ok(success_response(OrderDetailsResponse {
        order: OrderView::from_model(&order),
        items: items.iter().map(OrderItemView::from_model).collect(),
    }))
}

#[derive(Deserialize, IntoParams)]
pub struct DownloadsQuery {
    /// Checkout-session id returned in the success redirect; acts as the
    /// buyer's capability to list this order's downloads.
    pub session_id: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DownloadEntry {
    pub token: String,
    pub file_name: String,
    pub expires_at: String,
    pub download_count: i32,
    pub max_downloads: i32,
    pub url: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderDownloadsResponse {
    pub downloads: Vec<DownloadEntry>,
}

/// Lists the download links for a paid order. The caller must present the
/// checkout-session id from the success redirect.
#[utoipa::path(
    get,
    path = "/api/orders/{id}/downloads",
    params(("id" = Uuid, Path, description = "Order id"), DownloadsQuery),
    responses(
        (status = 200, description = "Active download links", body = OrderDownloadsResponse),
        (status = 403, description = "Missing/mismatched session id or order not paid"),
        (status = 404, description = "Unknown order")
    )
)]
pub async fn list_order_downloads(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<DownloadsQuery>,
) -> Result<Response, ServiceError> {
    let order = state
        .services
        .orders
        .get_order(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order not found: {}", id)))?;

    let presented = query
        .session_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ServiceError::Forbidden("session_id is required".into()))?;
    if order.payment_session_id.as_deref() != Some(presented) {
        return Err(ServiceError::Forbidden(
            "session does not match this order".into(),
        ));
    }

    if order.payment_status != PaymentStatus::Paid {
        return Err(ServiceError::Forbidden(
            "downloads become available once payment is confirmed".into(),
        ));
    }

    let now = Utc::now();
    let downloads = state
        .services
        .downloads
        .list_for_order(id)
        .await?
        .into_iter()
        .filter(|token| !token.is_expired(now) && !token.is_exhausted())
        .map(|token| DownloadEntry {
            url: format!("{}/api/download/{}", state.config.app_url, token.token),
            file_name: token.file_name,
            expires_at: token.expires_at.to_rfc3339(),
            download_count: token.download_count,
            max_downloads: token.max_downloads,
            token: token.token,
        })
        .collect();

    Ok(success_response(OrderDownloadsResponse { downloads }))
}
