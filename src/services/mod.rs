pub mod catalog;
pub mod checkout;
pub mod downloads;
pub mod orders;
pub mod pricing;
pub mod reconciliation;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::payments::PaymentGateway;

/// Service graph shared by all request handlers.
#[derive(Clone)]
pub struct AppServices {
    pub catalog: catalog::CatalogService,
    pub orders: orders::OrderService,
    pub downloads: downloads::DownloadService,
    pub checkout: checkout::CheckoutService,
    pub reconciliation: reconciliation::ReconciliationService,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: &AppConfig,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        let catalog = catalog::CatalogService::new(db.clone());
        let orders = orders::OrderService::new(db.clone(), event_sender.clone());
        let downloads = downloads::DownloadService::new(
            db,
            event_sender.clone(),
            config.digital_assets_dir.clone(),
            config.download_token_ttl_days,
            config.max_downloads_per_token,
        );
        let checkout = checkout::CheckoutService::new(
            catalog.clone(),
            orders.clone(),
            gateway,
            config.shipping.clone(),
            config.app_url.clone(),
        );
        let reconciliation = reconciliation::ReconciliationService::new(
            orders.clone(),
            catalog.clone(),
            downloads.clone(),
            event_sender,
        );

        Self {
            catalog,
            orders,
            downloads,
            checkout,
            reconciliation,
        }
    }
}
