//! Quire - a content-management backend

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quire::{
    api::{self, AppState},
    cache::{create_cache, CacheService},
    config::Config,
    db,
    events::EventBus,
    services::{EmailService, Services},
};

/// How often expired bearer tokens are purged
const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> Result<()> {
    let config_path =
        std::env::var("QUIRE_CONFIG").unwrap_or_else(|_| "config.yml".to_string());
    let config = Config::load_with_env(Path::new(&config_path))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.filter.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(path = %config_path, "Configuration loaded");

    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    let applied = db::migrations::run_migrations(&pool).await?;
    tracing::info!(applied, "Database migrations completed");

    let cache = CacheService::new(create_cache(&config.cache).await?, config.cache.clone());
    tracing::info!("Cache initialized: {:?}", config.cache.driver);

    let email = Arc::new(EmailService::new(config.mail.clone())?);
    if !email.is_enabled() {
        tracing::info!("Mail delivery disabled");
    }

    let services = Services::new(
        pool,
        cache,
        Arc::new(EventBus::new()),
        email,
        &config,
    );

    {
        let users = services.users.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SESSION_CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                if let Err(e) = users.cleanup_expired_sessions().await {
                    tracing::warn!("Session cleanup failed: {}", e);
                }
            }
        });
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let app = api::build_router(AppState::new(services, config));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
