use std::{net::SocketAddr, sync::Arc};

use tracing::info;
use tracing_subscriber::EnvFilter;

use tenant_file_storage::{
    build_router,
    config::Config,
    database::init_db,
    state::AppState,
    storage::ProviderRegistry,
};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let config = Config::from_env()?;

    let pool = match &config.database_url {
        Some(url) => Some(init_db(url).await?),
        None => {
            info!("DATABASE_URL not set, tenant settings disabled");
            None
        }
    };

    let registry = Arc::new(ProviderRegistry::new(config.storage.clone()));
    info!("Default file storage provider: {}", registry.default_provider());

    let port = config.port;
    let app_state = AppState {
        pool,
        registry,
        config,
    };

    let app = build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
