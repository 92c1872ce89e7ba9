pub mod stripe;
pub mod webhook;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::ServiceError;

/// One line of a hosted checkout session, priced by the platform.
#[derive(Debug, Clone)]
pub struct SessionLineItem {
    pub product_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub unit_amount_cents: i64,
    pub quantity: i32,
}

/// Request to open a hosted payment session for a pending order.
///
/// The discount is attached as a one-time amount-off adjustment equal to the
/// platform-computed cents figure; percentage math is never delegated to the
/// processor.
#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    pub order_id: Uuid,
    pub line_items: Vec<SessionLineItem>,
    pub customer_email: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    /// Collect a shipping address and attach the fixed shipping rate; set
    /// only when the order contains physical items.
    pub shipping_rate_cents: Option<i64>,
    pub shipping_rate_label: Option<String>,
    pub discount_amount_cents: Option<i64>,
    pub discount_label: Option<String>,
    pub has_digital_items: bool,
}

/// Hosted session handle returned by the processor.
#[derive(Debug, Clone)]
pub struct PaymentSession {
    pub id: String,
    pub url: String,
}

/// Seam to the external payment processor. The single production
/// implementation is [`stripe::StripeGateway`]; tests substitute a double.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<PaymentSession, ServiceError>;
}
