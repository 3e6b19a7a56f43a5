mod catalog;
mod config;
mod db;
mod error;
mod extractors;
mod handlers;
mod middleware;
mod models;
mod policy;
mod service;
mod startup;
mod store;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use catalog::PolicyCatalog;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use handlers::MetricsState;
pub use policy::PolicyEngine;
pub use service::AuthorizationService;
pub use store::RoleStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RoleStore>,
    pub catalog: Arc<PolicyCatalog>,
    pub engine: Arc<PolicyEngine>,
    pub service: Arc<AuthorizationService>,
    pub config: AppConfig,
    pub metrics: Arc<MetricsState>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let use_json = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string()) == "json";

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,authzcore=debug,tower_http=debug".into());

    if use_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    dotenvy::dotenv().ok();

    let config = AppConfig::from_env().map_err(|e| {
        tracing::error!("Configuration error: {}", e);
        e
    })?;

    let pool = db::create_pool(&config.database_url).await.map_err(|e| {
        tracing::error!("Failed to create database pool: {}", e);
        e
    })?;
    tracing::info!("Database pool created successfully");

    let store: Arc<dyn RoleStore> = Arc::new(store::PgRoleStore::new(pool));
    store.ensure_indexes().await.map_err(|e| {
        tracing::error!("Failed to ensure storage indexes: {}", e);
        e
    })?;
    tracing::info!("Storage indexes ensured");

    let catalog = Arc::new(PolicyCatalog::load().map_err(|e| {
        tracing::error!("Failed to load policy catalog: {}", e);
        e
    })?);
    tracing::info!("Policy catalog loaded");

    let engine = Arc::new(PolicyEngine::new(catalog.clone(), store.clone(), config.policy_cache_ttl));
    let service = Arc::new(AuthorizationService::new(store.clone(), catalog.clone(), engine.clone()));

    let metrics_state = Arc::new(handlers::setup_metrics_recorder());
    tracing::info!("Metrics recorder initialized");

    let state = Arc::new(AppState {
        store,
        catalog,
        engine,
        service,
        config: config.clone(),
        metrics: metrics_state,
    });

    let app = startup::build_router(state);

    let listener = TcpListener::bind(&config.server_addr).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
