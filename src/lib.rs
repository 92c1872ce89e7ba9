//! Checkout and payment-reconciliation core for a single-artist gallery
//! storefront.
//!
//! The crate owns pricing (integer cents, computed server-side only),
//! pending-order creation with line-item snapshots, the hosted payment
//! session handoff, webhook-driven reconciliation of payment outcomes, and
//! time-boxed download entitlements for digital artworks.

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod openapi;
pub mod payments;
pub mod services;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<config::AppConfig>,
    pub services: services::AppServices,
}
