//! Authoritative cart pricing in integer minor-currency units (cents).
//!
//! All arithmetic is integer; no floating point enters this path. Percentage
//! discounts are rounded half-up, applied once to the subtotal rather than
//! per line item.

use serde::Serialize;

use crate::config::ShippingConfig;
use crate::entities::discount::{self, DiscountType};
use crate::entities::product::{self, ProductType};

pub const STANDARD_SHIPPING_METHOD: &str = "Standard Shipping (US)";
pub const FREE_SHIPPING_METHOD: &str = "Free Standard Shipping";
pub const DIGITAL_DELIVERY_METHOD: &str = "Digital Delivery";

/// Full monetary breakdown for a cart, satisfying
/// `subtotal - discount + shipping == total` and `discount <= subtotal`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PricingBreakdown {
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
    pub shipping_method: String,
    pub free_shipping: bool,
}

/// Prices a cart of already-validated `(product, quantity)` lines.
pub fn price_cart(
    lines: &[(product::Model, i32)],
    discount: Option<&discount::Model>,
    shipping: &ShippingConfig,
) -> PricingBreakdown {
    let subtotal_cents: i64 = lines
        .iter()
        .map(|(product, quantity)| product.price_cents * i64::from(*quantity))
        .sum();

    let discount_cents = discount
        .map(|d| discount_amount_cents(d, subtotal_cents))
        .unwrap_or(0);

    let after_discount = subtotal_cents - discount_cents;

    let has_physical = lines
        .iter()
        .any(|(product, _)| product.product_type == ProductType::Physical);

    let (shipping_cents, shipping_method, free_shipping) = if !has_physical {
        (0, DIGITAL_DELIVERY_METHOD.to_string(), true)
    } else if shipping.free_shipping_threshold_cents > 0
        && after_discount >= shipping.free_shipping_threshold_cents
    {
        (0, FREE_SHIPPING_METHOD.to_string(), true)
    } else {
        (
            shipping.flat_rate_cents,
            STANDARD_SHIPPING_METHOD.to_string(),
            false,
        )
    };

    PricingBreakdown {
        subtotal_cents,
        discount_cents,
        shipping_cents,
        total_cents: after_discount + shipping_cents,
        shipping_method,
        free_shipping,
    }
}

/// Discount amount for a subtotal: percentage discounts round half-up,
/// fixed discounts cap at the subtotal. Never negative, never exceeds the
/// subtotal.
pub fn discount_amount_cents(discount: &discount::Model, subtotal_cents: i64) -> i64 {
    let raw = match discount.discount_type {
        DiscountType::Percentage => (subtotal_cents * discount.value + 50) / 100,
        DiscountType::Fixed => discount.value,
    };
    raw.clamp(0, subtotal_cents)
}
