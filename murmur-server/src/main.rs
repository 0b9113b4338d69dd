use anyhow::{Context, Result};
use murmur_server::{
    api,
    config::Settings,
    db::{repositories::AccountRepository, Database, Schema},
    seed::SeedPipeline,
    state::AppState,
};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "murmur_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::new().context("Failed to load settings")?;

    let db = Database::new(&settings.database.path, Schema::social())
        .context("Failed to create database")?;
    db.initialize()
        .context("Failed to initialize database schema")?;
    tracing::info!("Database initialized at {}", settings.database.path);

    if settings.seed.on_startup {
        // A store that was already seeded is not a startup failure
        match SeedPipeline::new(AccountRepository::new(db.clone())).run_samples() {
            Ok(outcome) => tracing::info!("Startup seed created {} accounts", outcome.count()),
            Err(e) => tracing::warn!("Startup seed skipped: {}", e),
        }
    }

    let app = api::router(AppState::new(db));

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("Failed to parse server address")?;
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
