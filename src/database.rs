use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{debug, info};

use crate::context::TenantSettings;

/// Initialize and return a PostgreSQL connection pool.
pub async fn init_db(database_url: &str) -> Result<PgPool, sqlx::Error> {
    info!("Connecting to database...");

    // Create a new PostgreSQL connection pool with a maximum of 5 connections
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    info!("Database connection established");
    Ok(pool)
}

/// Load all settings stored for a tenant.
pub async fn load_tenant_settings(
    pool: &PgPool,
    tenant_id: &str,
) -> Result<TenantSettings, sqlx::Error> {
    let rows: Vec<(String, Option<String>)> = sqlx::query_as(
        r#"SELECT "name", "value" FROM "tenant_setting" WHERE "tenantId"::text = $1"#,
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;

    debug!(tenant = %tenant_id, count = rows.len(), "Loaded tenant settings");

    Ok(rows
        .into_iter()
        .filter_map(|(name, value)| value.map(|value| (name, value)))
        .collect())
}
