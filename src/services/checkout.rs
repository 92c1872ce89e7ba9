use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::config::ShippingConfig;
use crate::entities::product::{self, ProductStatus, ProductType};
use crate::errors::ServiceError;
use crate::payments::{CreateSessionRequest, PaymentGateway, SessionLineItem};
use crate::services::catalog::CatalogService;
use crate::services::orders::{NewOrder, NewOrderItem, OrderService};
use crate::services::pricing::{self, PricingBreakdown};

pub const MAX_CART_LINES: usize = 50;
pub const MAX_LINE_QUANTITY: i32 = 10;

/// One requested cart line.
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutItem {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 10))]
    pub quantity: i32,
}

/// Shipping address submitted with the cart. US-only for v1.
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddressInput {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub line1: String,
    pub line2: Option<String>,
    #[validate(length(min = 1))]
    pub city: String,
    #[validate(length(min = 1))]
    pub state: String,
    #[validate(length(min = 1))]
    pub postal_code: String,
    #[validate(length(equal = 2))]
    pub country: String,
}

/// Checkout request: 1-50 lines, quantity 1-10 each.
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[validate(length(min = 1, max = 50))]
    pub items: Vec<CheckoutItem>,
    pub discount_code: Option<String>,
    #[validate(email)]
    pub customer_email: Option<String>,
    pub shipping_address: Option<ShippingAddressInput>,
}

/// Pricing summary echoed back to the storefront.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSummary {
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
    pub shipping_method: String,
    pub applied_discount: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub session_id: String,
    pub session_url: String,
    pub order_id: Uuid,
    pub summary: CheckoutSummary,
}

/// Request-time checkout flow: validate the cart against live catalog state,
/// price it, persist a pending order with line-item snapshots, open the
/// hosted payment session, and link the session id back onto the order.
#[derive(Clone)]
pub struct CheckoutService {
    catalog: CatalogService,
    orders: OrderService,
    gateway: Arc<dyn PaymentGateway>,
    shipping: ShippingConfig,
    app_url: String,
}

impl CheckoutService {
    pub fn new(
        catalog: CatalogService,
        orders: OrderService,
        gateway: Arc<dyn PaymentGateway>,
        shipping: ShippingConfig,
        app_url: String,
    ) -> Self {
        Self {
            catalog,
            orders,
            gateway,
            shipping,
            app_url,
        }
    }

    #[instrument(skip(self, request), fields(lines = request.items.len()))]
    pub async fn checkout(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutResponse, ServiceError> {
        let lines = self.validate_cart(&request).await?;

        let has_physical = lines
            .iter()
            .any(|(p, _)| p.product_type == ProductType::Physical);
        let has_digital = lines
            .iter()
            .any(|(p, _)| p.product_type == ProductType::Digital);

        if has_physical && request.shipping_address.is_none() {
            return Err(ServiceError::Validation(
                "Shipping address is required for physical items".into(),
            ));
        }

        // A bad code is priced as "no discount" rather than failing checkout.
        let discount = match &request.discount_code {
            Some(code) if !code.trim().is_empty() => {
                let resolved = self.catalog.validate_discount(code, Utc::now()).await?;
                if resolved.is_none() {
                    info!(code, "discount code not applicable, proceeding without it");
                }
                resolved
            }
            _ => None,
        };

        let breakdown = pricing::price_cart(&lines, discount.as_ref(), &self.shipping);

        let (order, _items) = self
            .orders
            .create_with_items(
                self.build_new_order(&request, &breakdown),
                lines
                    .iter()
                    .map(|(product, quantity)| NewOrderItem {
                        product_id: product.id,
                        product_title: product.title.clone(),
                        product_type: product.product_type,
                        quantity: *quantity,
                        unit_price_cents: product.price_cents,
                        line_total_cents: product.price_cents * i64::from(*quantity),
                    })
                    .collect(),
            )
            .await?;

        // The provider substitutes its session id for the placeholder.
        let success_url = format!(
            "{}/order/success?session_id={{CHECKOUT_SESSION_ID}}&order_id={}",
            self.app_url, order.id
        );
        let cancel_url = format!("{}/cart?cancelled=true", self.app_url);

        let session_request = CreateSessionRequest {
            order_id: order.id,
            line_items: lines
                .iter()
                .map(|(product, quantity)| SessionLineItem {
                    product_id: product.id,
                    title: product.title.clone(),
                    description: Some(product.description.clone())
                        .filter(|d| !d.is_empty()),
                    unit_amount_cents: product.price_cents,
                    quantity: *quantity,
                })
                .collect(),
            customer_email: request.customer_email.clone(),
            success_url,
            cancel_url,
            shipping_rate_cents: has_physical.then_some(breakdown.shipping_cents),
            shipping_rate_label: has_physical.then(|| breakdown.shipping_method.clone()),
            discount_amount_cents: (breakdown.discount_cents > 0)
                .then_some(breakdown.discount_cents),
            discount_label: discount.as_ref().map(|d| d.code.clone()),
            has_digital_items: has_digital,
        };

        // If this call fails the pending order is deliberately left in place;
        // the provider's expiry notification sweeps it to cancelled later.
        let session = self.gateway.create_checkout_session(session_request).await?;

        self.orders
            .set_payment_session(order.id, &session.id)
            .await?;

        if let Some(discount) = &discount {
            if breakdown.discount_cents > 0
                && !self.catalog.increment_discount_usage(discount.id).await?
            {
                // Priced before a concurrent checkout exhausted the cap; the
                // already-persisted total is honored.
                warn!(code = %discount.code, "discount usage cap reached after pricing");
            }
        }

        info!(order_id = %order.id, session_id = %session.id, "checkout session created");

        Ok(CheckoutResponse {
            session_id: session.id,
            session_url: session.url,
            order_id: order.id,
            summary: CheckoutSummary {
                subtotal_cents: breakdown.subtotal_cents,
                discount_cents: breakdown.discount_cents,
                shipping_cents: breakdown.shipping_cents,
                total_cents: breakdown.total_cents,
                shipping_method: breakdown.shipping_method,
                applied_discount: discount
                    .filter(|_| breakdown.discount_cents > 0)
                    .map(|d| d.code),
            },
        })
    }

    /// Resolves every cart line against the live catalog, rejecting missing,
    /// sold, or inactive products and any physical line with quantity > 1.
    async fn validate_cart(
        &self,
        request: &CheckoutRequest,
    ) -> Result<Vec<(product::Model, i32)>, ServiceError> {
        if request.items.is_empty() {
            return Err(ServiceError::Validation("cart must not be empty".into()));
        }
        if request.items.len() > MAX_CART_LINES {
            return Err(ServiceError::Validation(format!(
                "cart may contain at most {} lines",
                MAX_CART_LINES
            )));
        }

        let mut lines = Vec::with_capacity(request.items.len());
        for item in &request.items {
            if item.quantity < 1 || item.quantity > MAX_LINE_QUANTITY {
                return Err(ServiceError::Validation(format!(
                    "quantity must be between 1 and {}",
                    MAX_LINE_QUANTITY
                )));
            }

            let product = self
                .catalog
                .get_product(item.product_id)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product not found: {}", item.product_id))
                })?;

            match product.status {
                ProductStatus::Sold => {
                    return Err(ServiceError::Conflict(format!(
                        "\"{}\" is no longer available",
                        product.title
                    )));
                }
                ProductStatus::Inactive => {
                    return Err(ServiceError::Conflict(format!(
                        "\"{}\" is not available for purchase",
                        product.title
                    )));
                }
                ProductStatus::Active => {}
            }

            // Every physical artwork is a unique original.
            if product.product_type == ProductType::Physical && item.quantity > 1 {
                return Err(ServiceError::Conflict(format!(
                    "\"{}\" is a unique original artwork and cannot have quantity greater than 1",
                    product.title
                )));
            }

            lines.push((product, item.quantity));
        }

        Ok(lines)
    }

    fn build_new_order(
        &self,
        request: &CheckoutRequest,
        breakdown: &PricingBreakdown,
    ) -> NewOrder {
        let address = request.shipping_address.as_ref();
        NewOrder {
            email: request.customer_email.clone().unwrap_or_default(),
            name: address.map(|a| a.name.clone()),
            shipping_address_line1: address.map(|a| a.line1.clone()),
            shipping_address_line2: address.and_then(|a| a.line2.clone()),
            shipping_city: address.map(|a| a.city.clone()),
            shipping_state: address.map(|a| a.state.clone()),
            shipping_postal_code: address.map(|a| a.postal_code.clone()),
            shipping_country: address
                .map(|a| a.country.clone())
                .unwrap_or_else(|| "US".to_string()),
            subtotal_cents: breakdown.subtotal_cents,
            discount_cents: breakdown.discount_cents,
            shipping_cents: breakdown.shipping_cents,
            total_cents: breakdown.total_cents,
            payment_provider: Some("stripe".to_string()),
        }
    }
}
