use std::sync::Arc;

use sqlx::PgPool;
use crate::storage::ProviderRegistry;
use crate::config::Config;

/// Central application state shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL connection pool, used for tenant settings when configured.
    pub pool: Option<PgPool>,

    /// Storage providers, one instance per provider kind.
    pub registry: Arc<ProviderRegistry>,

    /// Application configuration loaded from environment variables or `.env`.
    pub config: Config,
}
