#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use tokio::sync::mpsc;
use uuid::Uuid;

use atelier_api::config::{AppConfig, ShippingConfig};
use atelier_api::db;
use atelier_api::handlers;
use atelier_api::AppState;
use atelier_api::entities::discount::{self, DiscountType};
use atelier_api::entities::product::{self, ProductStatus, ProductType};
use atelier_api::errors::ServiceError;
use atelier_api::events::{self, EventSender};
use atelier_api::payments::webhook::WebhookEvent;
use atelier_api::payments::{CreateSessionRequest, PaymentGateway, PaymentSession};
use atelier_api::services::catalog::CatalogService;
use atelier_api::services::checkout::CheckoutService;
use atelier_api::services::downloads::DownloadService;
use atelier_api::services::orders::OrderService;
use atelier_api::services::reconciliation::ReconciliationService;
use atelier_api::services::AppServices;

pub const APP_URL: &str = "http://localhost:8080";
pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

/// In-memory SQLite with the full schema. A single pooled connection keeps
/// every query on the same in-memory database.
pub async fn test_db() -> Arc<DatabaseConnection> {
    let mut options = ConnectOptions::new("sqlite::memory:".to_string());
    options.max_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await.expect("in-memory sqlite");
    db::create_schema(&db).await.expect("schema creation");
    Arc::new(db)
}

pub fn test_event_sender() -> Arc<EventSender> {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(events::process_events(rx));
    Arc::new(EventSender::new(tx))
}

/// Gateway double that records every session request and hands back
/// deterministic session ids.
#[derive(Default)]
pub struct RecordingGateway {
    pub requests: Mutex<Vec<CreateSessionRequest>>,
}

impl RecordingGateway {
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> CreateSessionRequest {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("a session request was recorded")
    }
}

#[async_trait]
impl PaymentGateway for RecordingGateway {
    async fn create_checkout_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<PaymentSession, ServiceError> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request);
        let n = requests.len();
        Ok(PaymentSession {
            id: format!("cs_test_{}", n),
            url: format!("https://checkout.example.com/pay/cs_test_{}", n),
        })
    }
}

/// Gateway double that always fails, for the pending-order-left-behind path.
pub struct FailingGateway;

#[async_trait]
impl PaymentGateway for FailingGateway {
    async fn create_checkout_session(
        &self,
        _request: CreateSessionRequest,
    ) -> Result<PaymentSession, ServiceError> {
        Err(ServiceError::ExternalService(
            "payment provider unreachable: simulated outage".into(),
        ))
    }
}

pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub services: AppServices,
    pub gateway: Arc<RecordingGateway>,
    pub assets_dir: tempfile::TempDir,
}

/// Full service graph over in-memory SQLite with a recording gateway.
pub async fn spawn_app() -> TestApp {
    let gateway = Arc::new(RecordingGateway::default());
    let (db, services, assets_dir) = build_services(gateway.clone()).await;
    TestApp {
        db,
        services,
        gateway,
        assets_dir,
    }
}

pub async fn build_services(
    gateway: Arc<dyn PaymentGateway>,
) -> (Arc<DatabaseConnection>, AppServices, tempfile::TempDir) {
    let db = test_db().await;
    let event_sender = test_event_sender();
    let assets_dir = tempfile::tempdir().expect("temp assets dir");

    let catalog = CatalogService::new(db.clone());
    let orders = OrderService::new(db.clone(), event_sender.clone());
    let downloads = DownloadService::new(
        db.clone(),
        event_sender.clone(),
        assets_dir.path().to_path_buf(),
        7,
        5,
    );
    let checkout = CheckoutService::new(
        catalog.clone(),
        orders.clone(),
        gateway,
        ShippingConfig::default(),
        APP_URL.to_string(),
    );
    let reconciliation = ReconciliationService::new(
        orders.clone(),
        catalog.clone(),
        downloads.clone(),
        event_sender,
    );

    (
        db,
        AppServices {
            catalog,
            orders,
            downloads,
            checkout,
            reconciliation,
        },
        assets_dir,
    )
}

fn test_config(assets_dir: &Path) -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        host: "127.0.0.1".into(),
        port: 0,
        app_url: APP_URL.into(),
        environment: "test".into(),
        log_level: "info".into(),
        log_json: false,
        auto_migrate: false,
        stripe_secret_key: "sk_test_dummy".into(),
        stripe_publishable_key: "pk_test_dummy".into(),
        stripe_webhook_secret: WEBHOOK_SECRET.into(),
        stripe_webhook_tolerance_secs: 300,
        gateway_timeout_secs: 15,
        shipping: ShippingConfig::default(),
        digital_assets_dir: assets_dir.display().to_string(),
        download_token_ttl_days: 7,
        max_downloads_per_token: 5,
        cors_allowed_origins: None,
    }
}

/// The full HTTP router over an in-memory service graph, for request-level
/// tests driven through `tower::ServiceExt::oneshot`.
pub async fn spawn_router() -> (axum::Router, TestApp) {
    let app = spawn_app().await;
    let state = AppState {
        db: app.db.clone(),
        config: Arc::new(test_config(app.assets_dir.path())),
        services: app.services.clone(),
    };
    (handlers::routes(state), app)
}

pub async fn seed_product(
    db: &DatabaseConnection,
    title: &str,
    price_cents: i64,
    product_type: ProductType,
    status: ProductStatus,
) -> product::Model {
    let now = Utc::now();
    product::ActiveModel {
        id: Set(Uuid::new_v4()),
        title: Set(title.to_string()),
        description: Set(format!("{} description", title)),
        price_cents: Set(price_cents),
        category: Set("paintings".to_string()),
        product_type: Set(product_type),
        status: Set(status),
        medium: Set(Some("oil on canvas".to_string())),
        dimensions: Set(None),
        year: Set(Some(2024)),
        is_featured: Set(false),
        is_new: Set(false),
        digital_file_path: Set(None),
        digital_file_name: Set(None),
        digital_file_mime_type: Set(None),
        digital_file_size_bytes: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("product insert")
}

/// Seeds a digital product and writes its asset into the app's assets dir.
pub async fn seed_digital_product(
    db: &DatabaseConnection,
    assets_dir: &Path,
    title: &str,
    price_cents: i64,
    file_name: &str,
    contents: &[u8],
) -> product::Model {
    std::fs::write(assets_dir.join(file_name), contents).expect("asset write");

    let mut product = seed_product(db, title, price_cents, ProductType::Digital, ProductStatus::Active)
        .await;

    let update = product::ActiveModel {
        id: Set(product.id),
        digital_file_path: Set(Some(file_name.to_string())),
        digital_file_name: Set(Some(file_name.to_string())),
        digital_file_mime_type: Set(Some("application/pdf".to_string())),
        digital_file_size_bytes: Set(Some(contents.len() as i64)),
        ..Default::default()
    };
    product = update.update(db).await.expect("product update");
    product
}

pub async fn seed_discount(
    db: &DatabaseConnection,
    code: &str,
    discount_type: DiscountType,
    value: i64,
    max_uses: Option<i32>,
) -> discount::Model {
    seed_discount_detailed(db, code, discount_type, value, max_uses, 0, None).await
}

pub async fn seed_discount_detailed(
    db: &DatabaseConnection,
    code: &str,
    discount_type: DiscountType,
    value: i64,
    max_uses: Option<i32>,
    used_count: i32,
    expires_at: Option<chrono::DateTime<Utc>>,
) -> discount::Model {
    discount::ActiveModel {
        id: Set(Uuid::new_v4()),
        code: Set(code.to_string()),
        discount_type: Set(discount_type),
        value: Set(value),
        is_active: Set(true),
        max_uses: Set(max_uses),
        used_count: Set(used_count),
        expires_at: Set(expires_at),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("discount insert")
}

/// Completed-session notification shaped like the provider sends it.
pub fn completed_session_event(
    order_id: Uuid,
    session_id: &str,
    payment_intent: Option<&str>,
    has_digital_items: bool,
) -> WebhookEvent {
    serde_json::from_value(serde_json::json!({
        "id": "evt_test_1",
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": session_id,
            "payment_intent": payment_intent,
            "metadata": {
                "orderId": order_id.to_string(),
                "hasDigitalItems": has_digital_items.to_string(),
            },
            "customer_details": { "email": "buyer@example.com" },
            "shipping_details": {
                "name": "Jo Buyer",
                "address": {
                    "line1": "1 Gallery Row",
                    "city": "Portland",
                    "state": "OR",
                    "postal_code": "97201",
                    "country": "US"
                }
            }
        }}
    }))
    .expect("valid event payload")
}

pub fn expired_session_event(order_id: Uuid, session_id: &str) -> WebhookEvent {
    serde_json::from_value(serde_json::json!({
        "id": "evt_test_2",
        "type": "checkout.session.expired",
        "data": { "object": {
            "id": session_id,
            "metadata": { "orderId": order_id.to_string() }
        }}
    }))
    .expect("valid event payload")
}

pub fn payment_failed_event(payment_intent: &str) -> WebhookEvent {
    serde_json::from_value(serde_json::json!({
        "id": "evt_test_3",
        "type": "payment_intent.payment_failed",
        "data": { "object": { "id": payment_intent } }
    }))
    .expect("valid event payload")
}
