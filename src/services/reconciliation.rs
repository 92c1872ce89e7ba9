//! Webhook-time payment reconciliation.
//!
//! Applies the provider's asynchronous, possibly-duplicated notifications to
//! order, inventory, and entitlement state exactly-once in effect. The
//! `pending -> paid` transition is a compare-and-set; the paid side effects
//! (sold-marking, token minting) are each individually idempotent, so a
//! redelivery after a lost CAS re-applies nothing that already happened and
//! repairs anything a crash left undone.

use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::order::PaymentStatus;
use crate::entities::product::ProductType;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::payments::webhook::{
    CheckoutSessionObject, PaymentIntentObject, WebhookEvent, EVENT_PAYMENT_FAILED,
    EVENT_SESSION_COMPLETED, EVENT_SESSION_EXPIRED,
};
use crate::services::catalog::CatalogService;
use crate::services::downloads::DownloadService;
use crate::services::orders::{OrderService, ProviderContact};

#[derive(Clone)]
pub struct ReconciliationService {
    orders: OrderService,
    catalog: CatalogService,
    downloads: DownloadService,
    event_sender: Arc<EventSender>,
}

impl ReconciliationService {
    pub fn new(
        orders: OrderService,
        catalog: CatalogService,
        downloads: DownloadService,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            orders,
            catalog,
            downloads,
            event_sender,
        }
    }

    /// Dispatches one verified provider event. Unknown kinds are logged and
    /// ignored; processing anomalies on known kinds surface as errors that
    /// the webhook handler logs but still acknowledges.
    #[instrument(skip(self, event), fields(event_type = %event.event_type))]
    pub async fn process_event(&self, event: WebhookEvent) -> Result<(), ServiceError> {
        match event.event_type.as_str() {
            EVENT_SESSION_COMPLETED => {
                let session = decode_session(&event)?;
                self.handle_session_completed(session).await
            }
            EVENT_SESSION_EXPIRED => {
                let session = decode_session(&event)?;
                self.handle_session_expired(session).await
            }
            EVENT_PAYMENT_FAILED => {
                let intent: PaymentIntentObject =
                    serde_json::from_value(event.data.object.clone()).map_err(|e| {
                        ServiceError::Validation(format!("malformed payment intent payload: {}", e))
                    })?;
                self.handle_payment_failed(intent).await
            }
            other => {
                info!(event_type = other, "unhandled webhook event type");
                Ok(())
            }
        }
    }

    /// Payment captured: transition the order to paid, merge what the
    /// provider collected, retire sold originals, and mint entitlements.
    async fn handle_session_completed(
        &self,
        session: CheckoutSessionObject,
    ) -> Result<(), ServiceError> {
        let Some(order_id) = session_order_id(&session) else {
            warn!(session_id = %session.id, "completed session carries no usable order id");
            return Ok(());
        };

        if self.orders.get_order(order_id).await?.is_none() {
            warn!(%order_id, "completed session references unknown order, dropping");
            return Ok(());
        }

        let capture_reference = session
            .payment_intent
            .clone()
            .unwrap_or_else(|| session.id.clone());

        let won = self
            .orders
            .mark_paid_if_pending(order_id, provider_contact(&session), &capture_reference)
            .await?;

        if !won {
            // A lost CAS is either a duplicate delivery or a redelivery after
            // a crash between the paid transition and its side effects. Both
            // fall through to the side-effect pass, which is idempotent:
            // sold-marking is conditional and minting skips items that
            // already hold a token.
            let still_paid = self
                .orders
                .get_order(order_id)
                .await?
                .map(|order| order.payment_status == PaymentStatus::Paid)
                .unwrap_or(false);
            if !still_paid {
                info!(%order_id, "completed session for a non-payable order, ignoring");
                return Ok(());
            }
            info!(%order_id, "redelivered completion, verifying paid side effects");
        }

        let items = self.orders.get_order_items(order_id).await?;

        // Sole path by which a one-of-one original becomes unavailable.
        for item in items.iter().filter(|i| i.product_type == ProductType::Physical) {
            if self.catalog.mark_product_sold(item.product_id).await? {
                self.event_sender
                    .send(Event::ProductSold(item.product_id))
                    .await;
            }
        }

        let has_digital_items = session
            .metadata
            .has_digital_items
            .as_deref()
            .map(|flag| flag == "true")
            .unwrap_or(false);

        if has_digital_items {
            self.mint_download_tokens(order_id, &items).await?;
        }

        info!(%order_id, "payment reconciled");
        Ok(())
    }

    async fn mint_download_tokens(
        &self,
        order_id: Uuid,
        items: &[crate::entities::order_item::Model],
    ) -> Result<(), ServiceError> {
        let mut minted = 0usize;
        for item in items.iter().filter(|i| i.product_type == ProductType::Digital) {
            // Already minted on an earlier delivery.
            if self.downloads.find_for_item(item.id).await?.is_some() {
                continue;
            }
            let Some(product) = self.catalog.get_product(item.product_id).await? else {
                warn!(product_id = %item.product_id, "digital product vanished, skipping token");
                continue;
            };
            // An unresolvable asset skips this item only; the order stays paid.
            if self
                .downloads
                .mint_for_item(order_id, item, &product)
                .await?
                .is_some()
            {
                minted += 1;
            }
        }
        if minted > 0 {
            info!(%order_id, minted, "download tokens created");
        }
        Ok(())
    }

    /// Session expired without payment: sweep the order to cancelled. A race
    /// with a capture notification resolves in favor of the capture.
    async fn handle_session_expired(
        &self,
        session: CheckoutSessionObject,
    ) -> Result<(), ServiceError> {
        let Some(order_id) = session_order_id(&session) else {
            info!(session_id = %session.id, "expired session carries no usable order id");
            return Ok(());
        };

        if self.orders.cancel_if_pending(order_id).await? {
            info!(%order_id, "order cancelled after session expiry");
        }
        Ok(())
    }

    /// Payment attempt failed: record it on the matching order without
    /// moving the order status, leaving it for manual review.
    async fn handle_payment_failed(
        &self,
        intent: PaymentIntentObject,
    ) -> Result<(), ServiceError> {
        let Some(order) = self.orders.find_by_payment_reference(&intent.id).await? else {
            info!(payment_intent = %intent.id, "no order matches failed payment intent");
            return Ok(());
        };

        if self.orders.mark_payment_failed_if_unpaid(order.id).await? {
            info!(order_id = %order.id, "payment marked failed");
        }
        Ok(())
    }
}

fn decode_session(event: &WebhookEvent) -> Result<CheckoutSessionObject, ServiceError> {
    serde_json::from_value(event.data.object.clone())
        .map_err(|e| ServiceError::Validation(format!("malformed session payload: {}", e)))
}

fn session_order_id(session: &CheckoutSessionObject) -> Option<Uuid> {
    session
        .metadata
        .order_id
        .as_deref()
        .and_then(|raw| Uuid::parse_str(raw).ok())
}

fn provider_contact(session: &CheckoutSessionObject) -> ProviderContact {
    let mut contact = ProviderContact {
        email: session
            .customer_details
            .as_ref()
            .and_then(|d| d.email.clone()),
        ..ProviderContact::default()
    };

    if let Some(shipping) = &session.shipping_details {
        contact.name = shipping.name.clone();
        if let Some(address) = &shipping.address {
            contact.address_line1 = address.line1.clone();
            contact.address_line2 = address.line2.clone();
            contact.city = address.city.clone();
            contact.state = address.state.clone();
            contact.postal_code = address.postal_code.clone();
            contact.country = address.country.clone();
        }
    }

    contact
}
