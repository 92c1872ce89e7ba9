use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::order::{self, Entity as Order, OrderStatus, PaymentStatus};
use crate::entities::order_item::{self, Entity as OrderItem};
use crate::entities::product::ProductType;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Input for a new pending order: contact/shipping snapshot plus the
/// authoritative monetary breakdown computed by the pricing calculator.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub email: String,
    pub name: Option<String>,
    pub shipping_address_line1: Option<String>,
    pub shipping_address_line2: Option<String>,
    pub shipping_city: Option<String>,
    pub shipping_state: Option<String>,
    pub shipping_postal_code: Option<String>,
    pub shipping_country: String,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
    pub payment_provider: Option<String>,
}

/// Line-item snapshot input, captured from catalog state at checkout time.
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: Uuid,
    pub product_title: String,
    pub product_type: ProductType,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

/// Contact and shipping data collected by the payment provider during the
/// hosted session. Provider data wins over the originally-submitted snapshot
/// since it reflects what was validated at payment time; absent fields leave
/// the snapshot untouched.
#[derive(Debug, Clone, Default)]
pub struct ProviderContact {
    pub email: Option<String>,
    pub name: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Persists a new `pending`/`pending` order together with its line-item
    /// snapshots in a single transaction.
    #[instrument(skip(self, new_order, items))]
    pub async fn create_with_items(
        &self,
        new_order: NewOrder,
        items: Vec<NewOrderItem>,
    ) -> Result<(order::Model, Vec<order_item::Model>), ServiceError> {
        if items.is_empty() {
            return Err(ServiceError::Validation(
                "an order must contain at least one item".into(),
            ));
        }

        let txn = self.db.begin().await?;

        let order_id = Uuid::new_v4();
        let now = Utc::now();

        let order = order::ActiveModel {
            id: Set(order_id),
            email: Set(new_order.email),
            name: Set(new_order.name),
            shipping_address_line1: Set(new_order.shipping_address_line1),
            shipping_address_line2: Set(new_order.shipping_address_line2),
            shipping_city: Set(new_order.shipping_city),
            shipping_state: Set(new_order.shipping_state),
            shipping_postal_code: Set(new_order.shipping_postal_code),
            shipping_country: Set(new_order.shipping_country),
            subtotal_cents: Set(new_order.subtotal_cents),
            discount_cents: Set(new_order.discount_cents),
            shipping_cents: Set(new_order.shipping_cents),
            total_cents: Set(new_order.total_cents),
            status: Set(OrderStatus::Pending),
            payment_status: Set(PaymentStatus::Pending),
            payment_provider: Set(new_order.payment_provider),
            payment_session_id: Set(None),
            payment_reference: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let order = order.insert(&txn).await?;

        let mut created_items = Vec::with_capacity(items.len());
        for item in items {
            let created = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id),
                product_title: Set(item.product_title),
                product_type: Set(item.product_type),
                quantity: Set(item.quantity),
                unit_price_cents: Set(item.unit_price_cents),
                line_total_cents: Set(item.line_total_cents),
            }
            .insert(&txn)
            .await?;
            created_items.push(created);
        }

        txn.commit().await?;

        self.event_sender.send(Event::OrderCreated(order_id)).await;
        info!(%order_id, total_cents = order.total_cents, "order created");

        Ok((order, created_items))
    }

    pub async fn get_order(&self, id: Uuid) -> Result<Option<order::Model>, ServiceError> {
        Ok(Order::find_by_id(id).one(&*self.db).await?)
    }

    pub async fn get_order_items(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<order_item::Model>, ServiceError> {
        Ok(OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Looks up an order by an external payment identifier, matching either
    /// the checkout-session id or the recorded capture id.
    pub async fn find_by_payment_reference(
        &self,
        reference: &str,
    ) -> Result<Option<order::Model>, ServiceError> {
        Ok(Order::find()
            .filter(
                Condition::any()
                    .add(order::Column::PaymentReference.eq(reference))
                    .add(order::Column::PaymentSessionId.eq(reference)),
            )
            .one(&*self.db)
            .await?)
    }

    /// Links the hosted checkout session onto the order once it exists. The
    /// session id is also the buyer's capability for the downloads listing.
    pub async fn set_payment_session(
        &self,
        id: Uuid,
        session_id: &str,
    ) -> Result<(), ServiceError> {
        Order::update_many()
            .col_expr(
                order::Column::PaymentSessionId,
                Expr::value(Some(session_id.to_string())),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(id))
            .exec(&*self.db)
            .await?;
        Ok(())
    }

    /// Compare-and-set transition `pending -> paid`. Exactly one caller wins
    /// under concurrent or duplicate webhook delivery; losers observe `false`
    /// and must apply no side effects. The winner also merges any
    /// provider-collected contact data and fixes the payment reference to
    /// the capture id.
    #[instrument(skip(self, contact))]
    pub async fn mark_paid_if_pending(
        &self,
        id: Uuid,
        contact: ProviderContact,
        capture_reference: &str,
    ) -> Result<bool, ServiceError> {
        let mut update = Order::update_many()
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Paid))
            .col_expr(
                order::Column::PaymentStatus,
                Expr::value(PaymentStatus::Paid),
            )
            .col_expr(
                order::Column::PaymentReference,
                Expr::value(Some(capture_reference.to_string())),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()));

        if let Some(email) = contact.email {
            update = update.col_expr(order::Column::Email, Expr::value(email));
        }
        if let Some(name) = contact.name {
            update = update.col_expr(order::Column::Name, Expr::value(Some(name)));
        }
        if let Some(line1) = contact.address_line1 {
            update = update.col_expr(
                order::Column::ShippingAddressLine1,
                Expr::value(Some(line1)),
            );
        }
        if let Some(line2) = contact.address_line2 {
            update = update.col_expr(
                order::Column::ShippingAddressLine2,
                Expr::value(Some(line2)),
            );
        }
        if let Some(city) = contact.city {
            update = update.col_expr(order::Column::ShippingCity, Expr::value(Some(city)));
        }
        if let Some(state) = contact.state {
            update = update.col_expr(order::Column::ShippingState, Expr::value(Some(state)));
        }
        if let Some(postal_code) = contact.postal_code {
            update = update.col_expr(
                order::Column::ShippingPostalCode,
                Expr::value(Some(postal_code)),
            );
        }
        if let Some(country) = contact.country {
            update = update.col_expr(order::Column::ShippingCountry, Expr::value(country));
        }

        let result = update
            .filter(order::Column::Id.eq(id))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending))
            .exec(&*self.db)
            .await?;

        let transitioned = result.rows_affected > 0;
        if transitioned {
            self.event_sender.send(Event::OrderPaid(id)).await;
        }
        Ok(transitioned)
    }

    /// Transition `pending -> cancelled/failed` for an expired session.
    /// No-op when the order already left `pending` (e.g. a capture raced the
    /// expiry notification).
    #[instrument(skip(self))]
    pub async fn cancel_if_pending(&self, id: Uuid) -> Result<bool, ServiceError> {
        let result = Order::update_many()
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Cancelled))
            .col_expr(
                order::Column::PaymentStatus,
                Expr::value(PaymentStatus::Failed),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(id))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending))
            .exec(&*self.db)
            .await?;

        let transitioned = result.rows_affected > 0;
        if transitioned {
            self.event_sender.send(Event::OrderCancelled(id)).await;
        }
        Ok(transitioned)
    }

    /// Records a failed payment attempt. Only `payment_status` moves; the
    /// order status is left untouched for manual follow-up.
    #[instrument(skip(self))]
    pub async fn mark_payment_failed_if_unpaid(&self, id: Uuid) -> Result<bool, ServiceError> {
        let result = Order::update_many()
            .col_expr(
                order::Column::PaymentStatus,
                Expr::value(PaymentStatus::Failed),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(id))
            .filter(order::Column::PaymentStatus.ne(PaymentStatus::Paid))
            .exec(&*self.db)
            .await?;

        let transitioned = result.rows_affected > 0;
        if transitioned {
            self.event_sender.send(Event::PaymentFailed(id)).await;
        }
        Ok(transitioned)
    }
}
