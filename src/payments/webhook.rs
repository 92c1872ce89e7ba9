//! Verification and decoding of provider-signed webhook events.
//!
//! The signature is an HMAC-SHA256 over `"{timestamp}.{raw_body}"` with the
//! shared webhook secret, delivered in a `Stripe-Signature: t=...,v1=...`
//! header. Verification failure is the only path that rejects a delivery;
//! anything after a valid signature is acknowledged.

use axum::http::HeaderMap;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

pub const EVENT_SESSION_COMPLETED: &str = "checkout.session.completed";
pub const EVENT_SESSION_EXPIRED: &str = "checkout.session.expired";
pub const EVENT_PAYMENT_FAILED: &str = "payment_intent.payment_failed";

/// Verifies the signature header against the raw request body, rejecting
/// timestamps older than `tolerance_secs` to bound replay.
pub fn verify_signature(
    headers: &HeaderMap,
    payload: &[u8],
    secret: &str,
    tolerance_secs: u64,
) -> bool {
    let Some(header) = headers.get(SIGNATURE_HEADER).and_then(|h| h.to_str().ok()) else {
        return false;
    };

    let mut timestamp = "";
    let mut signature = "";
    for part in header.split(',') {
        let mut kv = part.trim().splitn(2, '=');
        match (kv.next(), kv.next()) {
            (Some("t"), Some(value)) => timestamp = value,
            (Some("v1"), Some(value)) => signature = value,
            _ => {}
        }
    }
    if timestamp.is_empty() || signature.is_empty() {
        return false;
    }

    match timestamp.parse::<i64>() {
        Ok(ts) => {
            let now = Utc::now().timestamp();
            if (now - ts).unsigned_abs() > tolerance_secs {
                return false;
            }
        }
        Err(_) => return false,
    }

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());

    constant_time_eq(expected.as_bytes(), signature.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Builds the signature header value for a payload; used by tests and local
/// webhook tooling.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

/// Provider event envelope. Unknown `event_type` values are acknowledged and
/// ignored for forward compatibility.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    pub object: serde_json::Value,
}

/// Checkout-session payload for completed/expired notifications.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub metadata: SessionMetadata,
    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,
    #[serde(default)]
    pub shipping_details: Option<ShippingDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionMetadata {
    #[serde(rename = "orderId", default)]
    pub order_id: Option<String>,
    #[serde(rename = "hasDigitalItems", default)]
    pub has_digital_items: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerDetails {
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShippingDetails {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<ShippingAddress>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShippingAddress {
    #[serde(default)]
    pub line1: Option<String>,
    #[serde(default)]
    pub line2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

/// Payment-intent payload for payment-failed notifications.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
}
