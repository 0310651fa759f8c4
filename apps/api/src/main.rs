mod config;
mod errors;
mod formatting;
mod models;
mod notify;
mod routes;
mod selection;
mod session;
mod state;
mod store;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, StoreBackend};
use crate::notify::{ChangeFeed, NoopChangeFeed, RedisChangeFeed};
use crate::routes::build_router;
use crate::selection::dialogs::DialogRegistry;
use crate::state::AppState;
use crate::store::{
    AssociationStore, InMemoryAssociationStore, PgAssociationStore, RestAssociationStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ATS API v{}", env!("CARGO_PKG_VERSION"));

    let store = build_store(&config).await?;

    // Change feed: Redis when configured, otherwise dropped
    let feed: Arc<dyn ChangeFeed> = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str())?;
            info!("Redis change feed initialized");
            Arc::new(RedisChangeFeed::new(client))
        }
        None => {
            info!("REDIS_URL not set; change feed disabled");
            Arc::new(NoopChangeFeed)
        }
    };

    let dialogs = Arc::new(DialogRegistry::new());
    spawn_dialog_sweeper(
        dialogs.clone(),
        Duration::from_secs(config.dialog_idle_timeout_secs),
    );

    let state = AppState {
        store,
        feed,
        dialogs,
    };

    let app = build_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()), // TODO: restrict origins to the careers site and admin app
    );

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs the association store selected by `STORE_BACKEND`.
async fn build_store(config: &Config) -> Result<Arc<dyn AssociationStore>> {
    let store: Arc<dyn AssociationStore> = match config.store_backend {
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for the postgres backend"))?;
            Arc::new(PgAssociationStore::connect(url).await?)
        }
        StoreBackend::Rest => {
            let (url, key) = match (&config.store_rest_url, &config.store_api_key) {
                (Some(url), Some(key)) => (url, key),
                _ => anyhow::bail!("STORE_REST_URL and STORE_API_KEY are required for the rest backend"),
            };
            info!("Using REST association store at {url}");
            Arc::new(RestAssociationStore::new(url, key.clone())?)
        }
        StoreBackend::Memory => {
            info!("Using in-memory association store (data is lost on restart)");
            Arc::new(InMemoryAssociationStore::new())
        }
    };
    Ok(store)
}

/// Periodically drops dialogs nobody has touched for `max_idle`.
fn spawn_dialog_sweeper(dialogs: Arc<DialogRegistry>, max_idle: Duration) {
    let period = (max_idle / 4).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            dialogs.sweep_idle(max_idle);
        }
    });
}
