use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use blend_monitor::api::{self, ApiSettings, AppState};
use blend_monitor::config::Config;
use blend_monitor::db::{self, queries::PgStore};
use blend_monitor::npm::NpmRegistryClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting Blend monitor");

    let config = Config::from_env().context("failed to load configuration")?;
    tracing::info!("Configuration loaded, tracking {}", config.package_name);

    let pool = db::create_pool(&config.database_url, config.database_tls)
        .await
        .map_err(|e| anyhow::anyhow!("failed to create database pool: {}", e))?;
    tracing::info!("Database connection pool created");

    db::run_migrations(&pool).await.context("failed to run migrations")?;

    let registry = NpmRegistryClient::new(&config.registry_url, &config.downloads_url)
        .context("failed to build registry client")?;

    if config.api_tokens.is_empty() {
        tracing::warn!("AUTH_TOKENS is empty; authenticated routes will reject every request");
    }

    let state = AppState::new(
        Arc::new(PgStore::new(pool.clone())),
        Arc::new(registry),
        ApiSettings::from_config(&config),
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = api::routes::create_router(state)
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", config.host, config.port))?;
    tracing::info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close();
    tracing::info!("Database pool closed, shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
}
