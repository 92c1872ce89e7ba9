use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted by the checkout and reconciliation services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    OrderPaid(Uuid),
    OrderCancelled(Uuid),
    PaymentFailed(Uuid),
    ProductSold(Uuid),
    DownloadTokenMinted {
        order_id: Uuid,
        product_id: Uuid,
    },
    DownloadServed {
        order_id: Uuid,
        product_id: Uuid,
        remaining_downloads: i32,
    },
}

/// Cloneable handle for publishing events onto the in-process channel.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Best-effort publish. A full or closed channel is logged and dropped;
    /// event delivery never blocks or fails a request.
    pub async fn send(&self, event: Event) {
        if let Err(e) = self.sender.send(event).await {
            warn!("Failed to send event: {}", e);
        }
    }
}

/// Background consumer for domain events. Currently logs each event; this is
/// the seam where outbound notifications (e.g. order-confirmation email)
/// would hang off.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderPaid(order_id) => info!(%order_id, "order paid"),
            Event::OrderCancelled(order_id) => info!(%order_id, "order cancelled"),
            Event::PaymentFailed(order_id) => info!(%order_id, "payment failed"),
            Event::ProductSold(product_id) => info!(%product_id, "product sold"),
            other => info!(event = ?other, "event"),
        }
    }
}
