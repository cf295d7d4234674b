//! API server entry point.

use std::error::Error;

use api::config::{Config, LogFormat};
use domain::{Catalog, InMemoryCatalog};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::PgPoolOptions;
use store::{InMemoryStore, PostgresStore, Store};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn load_catalog(config: &Config) -> Result<InMemoryCatalog, Box<dyn Error>> {
    match &config.catalog_seed {
        Some(path) => {
            let json = tokio::fs::read_to_string(path).await?;
            let catalog = InMemoryCatalog::from_json(&json)?;
            tracing::info!(path = %path.display(), "catalog seed loaded");
            Ok(catalog)
        }
        None => {
            tracing::warn!("no CATALOG_SEED set, starting with an empty catalog");
            Ok(InMemoryCatalog::new())
        }
    }
}

async fn serve<S, C>(
    config: &Config,
    store: S,
    catalog: C,
    metrics_handle: PrometheusHandle,
) -> Result<(), Box<dyn Error>>
where
    S: Store + Clone + 'static,
    C: Catalog + Clone + 'static,
{
    let state = api::create_state(store, catalog, config.market_config());
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Load the catalog
    let catalog = load_catalog(&config).await?;

    // 4. Pick a store and serve
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
            let store = PostgresStore::new(pool).with_lock_timeout(config.lock_timeout);
            store.run_migrations().await?;
            tracing::info!("using PostgreSQL store");
            serve(&config, store, catalog, metrics_handle).await
        }
        None => {
            let store = InMemoryStore::new().with_lock_timeout(config.lock_timeout);
            tracing::info!("using in-memory store");
            serve(&config, store, catalog, metrics_handle).await
        }
    }
}
