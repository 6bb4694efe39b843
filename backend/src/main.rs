use std::{net::SocketAddr, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use audittrail_backend::{
    build_router,
    config::{mask_database_url, Config, StoreBackend},
    db::connection::{create_pool, run_migrations},
    middleware::identity::{GatewayHeaderIdentity, IdentityProvider, NoIdentity},
    repositories::{AuditLogStore, InMemoryAuditLogStore, PgAuditLogStore},
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "audittrail_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;
    tracing::info!(
        database_url = %config.database_url.as_deref().map(mask_database_url).unwrap_or_else(|| "<unset>".into()),
        store = ?config.store_backend,
        audit_enabled = config.audit_enabled,
        skip_paths = ?config.audit_skip_paths,
        trust_identity_headers = config.trust_identity_headers,
        "Loaded configuration from environment/.env"
    );

    let store: Arc<dyn AuditLogStore> = match config.store_backend {
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for the postgres store"))?;
            let pool = create_pool(url).await?;
            run_migrations(&pool).await?;
            Arc::new(PgAuditLogStore::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory audit store; records are lost on restart");
            Arc::new(InMemoryAuditLogStore::new())
        }
    };

    let identity: Arc<dyn IdentityProvider> = if config.trust_identity_headers {
        Arc::new(GatewayHeaderIdentity)
    } else {
        Arc::new(NoIdentity)
    };

    let addr: SocketAddr = config.bind_addr.parse()?;
    let state = AppState::new(store, identity, config);
    let app = build_router(state);

    tracing::info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
