mod article;
mod auth;
mod config;
mod db;
mod news;
mod provider;
mod routes;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::auth::start_session_purge;
use crate::config::Config;
use crate::db::Database;
use crate::news::NewsService;
use crate::routes::AppState;

const SESSION_PURGE_MINUTES: u64 = 60;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keyword_news=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::var("NEWS_CONFIG").unwrap_or_else(|_| "news.toml".to_string());
    let config = Config::load(&config_path)?.with_env_overrides();
    info!("Loaded configuration from {}", config_path);

    // Initialize database
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite:keyword_news.db?mode=rwc".to_string());
    let db = Database::new(&database_url).await?;
    db.initialize().await?;
    info!("Database initialized");

    let db = Arc::new(db);

    let news = Arc::new(NewsService::from_config(&config.news_api)?);

    // Start background session cleanup
    let bg_db = db.clone();
    tokio::spawn(async move {
        start_session_purge(bg_db, SESSION_PURGE_MINUTES).await;
    });

    // Create app state
    let state = Arc::new(AppState {
        db,
        news,
        session_ttl: config.session_ttl(),
    });

    // Build router
    let mut app = routes::router(state);
    if let Some(cors) = routes::cors_layer(&config.allowed_origins)? {
        app = app.layer(cors);
    }

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!("Server starting on http://{}", config.bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
