use std::time::Duration;

use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Schema,
};
use tracing::info;

use crate::config::AppConfig;
use crate::entities;

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Establishes a connection pool with bounded connect/acquire timeouts.
pub async fn establish_connection(database_url: &str) -> Result<DbPool, DbErr> {
    let mut options = ConnectOptions::new(database_url.to_string());
    options
        .max_connections(10)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(600))
        .sqlx_logging(false);

    let db = Database::connect(options).await?;
    info!("Database connection established");
    Ok(db)
}

pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, DbErr> {
    establish_connection(&cfg.database_url).await
}

/// Creates any missing tables from the entity definitions. Used on startup
/// when `auto_migrate` is set and by the integration-test harness against
/// in-memory SQLite.
pub async fn create_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut statements = vec![
        schema.create_table_from_entity(entities::Product),
        schema.create_table_from_entity(entities::Discount),
        schema.create_table_from_entity(entities::Order),
        schema.create_table_from_entity(entities::OrderItem),
        schema.create_table_from_entity(entities::DownloadToken),
    ];

    for statement in statements.iter_mut() {
        statement.if_not_exists();
        db.execute(backend.build(&*statement)).await?;
    }

    info!("Schema ensured");
    Ok(())
}
