use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Time-boxed, usage-capped entitlement to a digital asset, keyed by an
/// opaque random token string. Rows are deleted on revocation; presence in
/// the table means the entitlement is still live (modulo the expiry check).
///
/// The order/product references are back-references for lookup, not
/// ownership: deleting a product is never blocked by outstanding tokens.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "download_tokens")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub token: String,
    pub order_id: Uuid,
    pub order_item_id: Uuid,
    pub product_id: Uuid,
    pub file_path: String,
    pub file_name: String,
    pub mime_type: String,
    pub expires_at: DateTime<Utc>,
    pub max_downloads: i32,
    pub download_count: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    pub fn is_exhausted(&self) -> bool {
        self.download_count >= self.max_downloads
    }
}
