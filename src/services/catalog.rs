use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::discount::{self, Entity as Discount};
use crate::entities::product::{self, Entity as Product, ProductStatus};
use crate::errors::ServiceError;

/// Read access to products and discounts, plus the two conditional catalog
/// mutations the payment flow needs: marking a one-of-one product sold and
/// bumping a discount's usage counter.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn get_product(&self, id: Uuid) -> Result<Option<product::Model>, ServiceError> {
        Ok(Product::find_by_id(id).one(&*self.db).await?)
    }

    /// Case-insensitive discount lookup by code.
    pub async fn find_discount_by_code(
        &self,
        code: &str,
    ) -> Result<Option<discount::Model>, ServiceError> {
        let normalized = code.trim().to_lowercase();
        Ok(Discount::find()
            .filter(
                Expr::expr(Func::lower(Expr::col(discount::Column::Code))).eq(normalized),
            )
            .one(&*self.db)
            .await?)
    }

    /// Resolves a discount code to an applicable discount, or `None` when the
    /// code is unknown, inactive, expired, or exhausted. Checkout treats a
    /// bad code as "no discount" rather than a hard failure.
    #[instrument(skip(self))]
    pub async fn validate_discount(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<discount::Model>, ServiceError> {
        let discount = self.find_discount_by_code(code).await?;
        Ok(discount.filter(|d| d.is_applicable(now)))
    }

    /// Conditionally transitions a product `active -> sold`. Returns whether
    /// this call performed the transition; a `false` on a product that is
    /// already sold is how duplicate webhook deliveries are absorbed without
    /// double-processing.
    #[instrument(skip(self))]
    pub async fn mark_product_sold(&self, id: Uuid) -> Result<bool, ServiceError> {
        let result = Product::update_many()
            .col_expr(
                product::Column::Status,
                Expr::value(ProductStatus::Sold),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(id))
            .filter(product::Column::Status.eq(ProductStatus::Active))
            .exec(&*self.db)
            .await?;

        let transitioned = result.rows_affected > 0;
        if transitioned {
            info!(product_id = %id, "product marked sold");
        }
        Ok(transitioned)
    }

    /// Conditionally increments a discount's usage counter, guarded by the
    /// usage cap when one is set. Returns whether the increment applied.
    #[instrument(skip(self))]
    pub async fn increment_discount_usage(&self, id: Uuid) -> Result<bool, ServiceError> {
        let result = Discount::update_many()
            .col_expr(
                discount::Column::UsedCount,
                Expr::col(discount::Column::UsedCount).add(1),
            )
            .filter(discount::Column::Id.eq(id))
            .filter(
                Condition::any()
                    .add(discount::Column::MaxUses.is_null())
                    .add(
                        Expr::col(discount::Column::UsedCount)
                            .lt(Expr::col(discount::Column::MaxUses)),
                    ),
            )
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }
}
