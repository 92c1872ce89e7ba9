use chrono::{Duration, Utc};
use rand::RngCore;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::download_token::{self, Entity as DownloadToken};
use crate::entities::order_item;
use crate::entities::product;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Resolved location of a deliverable digital asset.
#[derive(Debug, Clone)]
pub struct AssetInfo {
    pub file_path: String,
    pub file_name: String,
    pub mime_type: String,
}

/// Store for download entitlements: minting at reconciliation time, lookup
/// and usage accounting at delivery time. Revocation deletes the row and is
/// terminal.
#[derive(Clone)]
pub struct DownloadService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    assets_dir: PathBuf,
    token_ttl: Duration,
    max_downloads: i32,
}

impl DownloadService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        assets_dir: impl Into<PathBuf>,
        token_ttl_days: i64,
        max_downloads: i32,
    ) -> Self {
        Self {
            db,
            event_sender,
            assets_dir: assets_dir.into(),
            token_ttl: Duration::days(token_ttl_days),
            max_downloads,
        }
    }

    /// Resolves the underlying asset for a digital product, or `None` when
    /// the product has no asset reference or the file is absent from disk.
    pub async fn resolve_asset(&self, product: &product::Model) -> Option<AssetInfo> {
        let relative = product.digital_file_path.as_deref()?;

        let full_path = if Path::new(relative).is_absolute() {
            PathBuf::from(relative)
        } else {
            self.assets_dir.join(relative)
        };

        if tokio::fs::metadata(&full_path).await.is_err() {
            return None;
        }

        let extension = full_path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        let file_name = product
            .digital_file_name
            .clone()
            .unwrap_or_else(|| format!("{}{}", sanitize_file_name(&product.title), extension));

        let mime_type = product
            .digital_file_mime_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string());

        Some(AssetInfo {
            file_path: full_path.to_string_lossy().into_owned(),
            file_name,
            mime_type,
        })
    }

    /// Mints an entitlement for one digital order item. Returns `None` when
    /// the product's asset cannot be resolved; the caller skips that item
    /// without failing the batch.
    #[instrument(skip(self, item, product), fields(order_id = %order_id, product_id = %product.id))]
    pub async fn mint_for_item(
        &self,
        order_id: Uuid,
        item: &order_item::Model,
        product: &product::Model,
    ) -> Result<Option<download_token::Model>, ServiceError> {
        let Some(asset) = self.resolve_asset(product).await else {
            warn!(
                product_id = %product.id,
                title = %product.title,
                "digital asset missing, skipping token mint"
            );
            return Ok(None);
        };

        let now = Utc::now();
        let token = download_token::ActiveModel {
            token: Set(generate_token()),
            order_id: Set(order_id),
            order_item_id: Set(item.id),
            product_id: Set(product.id),
            file_path: Set(asset.file_path),
            file_name: Set(asset.file_name),
            mime_type: Set(asset.mime_type),
            expires_at: Set(now + self.token_ttl),
            max_downloads: Set(self.max_downloads),
            download_count: Set(0),
            created_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        self.event_sender
            .send(Event::DownloadTokenMinted {
                order_id,
                product_id: product.id,
            })
            .await;
        info!(token_suffix = &token.token[token.token.len() - 8..], "download token minted");

        Ok(Some(token))
    }

    pub async fn get_token(
        &self,
        token: &str,
    ) -> Result<Option<download_token::Model>, ServiceError> {
        Ok(DownloadToken::find_by_id(token.to_string())
            .one(&*self.db)
            .await?)
    }

    pub async fn list_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<download_token::Model>, ServiceError> {
        Ok(DownloadToken::find()
            .filter(download_token::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?)
    }

    pub async fn find_for_item(
        &self,
        order_item_id: Uuid,
    ) -> Result<Option<download_token::Model>, ServiceError> {
        Ok(DownloadToken::find()
            .filter(download_token::Column::OrderItemId.eq(order_item_id))
            .one(&*self.db)
            .await?)
    }

    /// Claims one download against the token's cap. The increment is
    /// conditional on `download_count < max_downloads`, so concurrent
    /// fetches can never push the count past the cap; a `false` means the
    /// cap was already spent and nothing must be served. Auto-revokes the
    /// token once the final download is claimed.
    #[instrument(skip(self))]
    pub async fn record_download(&self, token: &str) -> Result<bool, ServiceError> {
        let result = DownloadToken::update_many()
            .col_expr(
                download_token::Column::DownloadCount,
                Expr::col(download_token::Column::DownloadCount).add(1),
            )
            .filter(download_token::Column::Token.eq(token))
            .filter(
                Expr::col(download_token::Column::DownloadCount)
                    .lt(Expr::col(download_token::Column::MaxDownloads)),
            )
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Ok(false);
        }

        if let Some(updated) = self.get_token(token).await? {
            self.event_sender
                .send(Event::DownloadServed {
                    order_id: updated.order_id,
                    product_id: updated.product_id,
                    remaining_downloads: (updated.max_downloads - updated.download_count).max(0),
                })
                .await;
            if updated.is_exhausted() {
                self.revoke(token).await?;
            }
        }
        Ok(true)
    }

    /// Removes a token from the active set. Terminal; there is no renewal.
    pub async fn revoke(&self, token: &str) -> Result<(), ServiceError> {
        DownloadToken::delete_many()
            .filter(download_token::Column::Token.eq(token))
            .exec(&*self.db)
            .await?;
        info!("download token revoked");
        Ok(())
    }
}

/// 256-bit cryptographically random opaque token, hex-encoded.
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let collapsed = cleaned
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if collapsed.is_empty() {
        "digital-artwork".to_string()
    } else {
        collapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_long_and_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(sanitize_file_name("Sunset — Study #4"), "sunset-study-4");
        assert_eq!(sanitize_file_name("***"), "digital-artwork");
    }
}
