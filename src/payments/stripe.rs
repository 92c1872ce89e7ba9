use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{error, instrument};

use super::{CreateSessionRequest, PaymentGateway, PaymentSession};
use crate::errors::ServiceError;

const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// Stripe Checkout client speaking the form-encoded REST API directly.
/// All calls carry a bounded timeout; a failure surfaces as
/// `ServiceError::ExternalService` and is never silently retried inside the
/// request path.
pub struct StripeGateway {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CouponResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: Option<StripeErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

impl StripeGateway {
    pub fn new(secret_key: String, timeout_secs: u64) -> Result<Self, ServiceError> {
        Self::with_api_base(secret_key, DEFAULT_API_BASE.to_string(), timeout_secs)
    }

    pub fn with_api_base(
        secret_key: String,
        api_base: String,
        timeout_secs: u64,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| {
                ServiceError::ExternalService(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            api_base,
            secret_key,
        })
    }

    async fn post_form<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<T, ServiceError> {
        let response = self
            .client
            .post(format!("{}{}", self.api_base, path))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(params)
            .send()
            .await
            .map_err(|e| {
                error!("Stripe request to {} failed: {}", path, e);
                ServiceError::ExternalService(format!("payment provider unreachable: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<StripeErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error)
                .and_then(|detail| detail.message)
                .unwrap_or_else(|| format!("HTTP {}", status));
            error!("Stripe request to {} rejected: {}", path, message);
            return Err(ServiceError::ExternalService(format!(
                "payment provider error: {}",
                message
            )));
        }

        response.json::<T>().await.map_err(|e| {
            ServiceError::ExternalService(format!("invalid payment provider response: {}", e))
        })
    }

    /// One-time amount-off coupon carrying the platform-computed discount.
    async fn create_coupon(
        &self,
        amount_off_cents: i64,
        label: &str,
    ) -> Result<String, ServiceError> {
        let params = vec![
            ("amount_off".to_string(), amount_off_cents.to_string()),
            ("currency".to_string(), "usd".to_string()),
            ("duration".to_string(), "once".to_string()),
            ("name".to_string(), format!("Discount: {}", label)),
        ];
        let coupon: CouponResponse = self.post_form("/v1/coupons", &params).await?;
        Ok(coupon.id)
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_checkout_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<PaymentSession, ServiceError> {
        let mut params: Vec<(String, String)> = vec![
            ("mode".to_string(), "payment".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("success_url".to_string(), request.success_url.clone()),
            ("cancel_url".to_string(), request.cancel_url.clone()),
            (
                "metadata[orderId]".to_string(),
                request.order_id.to_string(),
            ),
            (
                "metadata[hasDigitalItems]".to_string(),
                request.has_digital_items.to_string(),
            ),
        ];

        if let Some(email) = &request.customer_email {
            params.push(("customer_email".to_string(), email.clone()));
        }

        for (index, item) in request.line_items.iter().enumerate() {
            let prefix = format!("line_items[{}]", index);
            params.push((
                format!("{}[price_data][currency]", prefix),
                "usd".to_string(),
            ));
            params.push((
                format!("{}[price_data][product_data][name]", prefix),
                item.title.clone(),
            ));
            if let Some(description) = &item.description {
                if !description.is_empty() {
                    params.push((
                        format!("{}[price_data][product_data][description]", prefix),
                        description.clone(),
                    ));
                }
            }
            params.push((
                format!("{}[price_data][product_data][metadata][productId]", prefix),
                item.product_id.to_string(),
            ));
            params.push((
                format!("{}[price_data][unit_amount]", prefix),
                item.unit_amount_cents.to_string(),
            ));
            params.push((format!("{}[quantity]", prefix), item.quantity.to_string()));
        }

        if let Some(rate_cents) = request.shipping_rate_cents {
            params.push((
                "shipping_address_collection[allowed_countries][0]".to_string(),
                "US".to_string(),
            ));
            params.push((
                "shipping_options[0][shipping_rate_data][type]".to_string(),
                "fixed_amount".to_string(),
            ));
            params.push((
                "shipping_options[0][shipping_rate_data][fixed_amount][amount]".to_string(),
                rate_cents.to_string(),
            ));
            params.push((
                "shipping_options[0][shipping_rate_data][fixed_amount][currency]".to_string(),
                "usd".to_string(),
            ));
            params.push((
                "shipping_options[0][shipping_rate_data][display_name]".to_string(),
                request
                    .shipping_rate_label
                    .clone()
                    .unwrap_or_else(|| "Standard Shipping".to_string()),
            ));
        }

        if let Some(amount) = request.discount_amount_cents.filter(|amount| *amount > 0) {
            let label = request.discount_label.as_deref().unwrap_or("discount");
            let coupon_id = self.create_coupon(amount, label).await?;
            params.push(("discounts[0][coupon]".to_string(), coupon_id));
        }

        let session: SessionResponse = self.post_form("/v1/checkout/sessions", &params).await?;

        Ok(PaymentSession {
            url: session.url.unwrap_or_default(),
            id: session.id,
        })
    }
}
