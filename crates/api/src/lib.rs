//! HTTP API server for the marketplace core.
//!
//! Exposes stock contribution, order placement, order status transitions,
//! payment signals and payouts over REST, with structured logging (tracing)
//! and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use domain::{Catalog, MarketConfig, Marketplace};
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub type AppState<S, C> = Arc<Marketplace<S, C>>;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, C>(state: AppState<S, C>, metrics_handle: PrometheusHandle) -> Router
where
    S: Store + Clone + 'static,
    C: Catalog + Clone + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/inventory", post(routes::inventory::contribute::<S, C>))
        .route("/inventory/{id}", get(routes::inventory::get::<S, C>))
        .route("/orders", post(routes::orders::place::<S, C>))
        .route("/orders/{id}", get(routes::orders::get::<S, C>))
        .route("/orders/{id}/status", post(routes::orders::transition::<S, C>))
        .route("/orders/{id}/payment", post(routes::orders::payment::<S, C>))
        .route("/orders/{id}/payouts", get(routes::orders::payouts::<S, C>))
        .route("/payouts", post(routes::payouts::schedule::<S, C>))
        .route("/payouts/{id}/complete", post(routes::payouts::complete::<S, C>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state around a store and a catalog.
pub fn create_state<S, C>(store: S, catalog: C, config: MarketConfig) -> AppState<S, C>
where
    S: Store + Clone + 'static,
    C: Catalog + Clone + 'static,
{
    Arc::new(Marketplace::new(store, catalog, config))
}
