use std::sync::Arc;

use anyhow::Context;
use conduit_client::PlatformClient;
use conduit_engine::Orchestrator;
use conduit_engine::dispatcher::HandlerTable;
use conduit_engine::repository::{Collaborators, HttpPlatformRepository};
use conduit_engine::resilience::{Breakers, Resilience};
use conduit_engine::tools::{ToolSet, http_client};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod db;
pub mod repository;
pub mod store;

use config::ServerConfig;
use store::PgStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "conduit_server=debug,conduit_engine=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Conduit server...");

    let config = ServerConfig::from_env()?;
    config.validate()?;

    tracing::info!("Connecting to database...");

    // Create database connection pool
    let pool = db::create_pool(&config.database_url)
        .await
        .context("Failed to create database pool")?;

    tracing::info!("Database connection pool created");

    // Run migrations
    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let orchestrator = build_orchestrator(&config, PgStore::new(pool.clone()))?;
    let app = api::create_router(api::AppState {
        pool,
        orchestrator: Arc::new(orchestrator),
    });

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}

/// Wire the engine: one breaker registry and one HTTP pool for the process
fn build_orchestrator(config: &ServerConfig, store: PgStore) -> anyhow::Result<Orchestrator> {
    let engine = &config.engine;

    let mut platform_client = PlatformClient::with_client(
        engine.platform_api_url.clone(),
        http_client(engine.http_timeout)?,
    );
    if let Some(token) = &engine.platform_api_token {
        platform_client = platform_client.with_token(token.clone());
    }
    let platform = Arc::new(HttpPlatformRepository::new(platform_client));
    let store = Arc::new(store);

    let collaborators = Collaborators {
        credentials: platform.clone(),
        connectors: platform.clone(),
        environments: platform,
        definitions: store.clone(),
        builds: store.clone(),
        executions: store,
    };

    let breakers = Arc::new(Breakers::new(engine.breaker.clone()));
    let resilience = Resilience::new(breakers, engine.retry.clone());

    let tools = ToolSet::http(engine.http_timeout).context("Failed to build tool clients")?;
    let handlers = HandlerTable::standard(
        &tools,
        resilience.clone(),
        &engine.source_control_api_url,
    );

    tracing::info!(
        platform = %engine.platform_api_url,
        stage_timeout_secs = engine.stage_timeout.as_secs(),
        "Engine configured"
    );

    Ok(Orchestrator::new(
        collaborators,
        handlers,
        resilience,
        engine.stage_timeout,
    ))
}
