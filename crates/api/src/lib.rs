//! Internal checkout HTTP API.
//!
//! Exposes the reservation lifecycle, checkout commit and release, and the
//! maintenance cleanup over REST, with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use checkout::PrometheusMetrics;
use domain::ReservationEngine;
use metrics_exporter_prometheus::PrometheusHandle;
use store::{InMemoryStore, OrderStore, ReservationStore};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::ServiceConfig;
pub use state::{AppState, AppStateBuilder};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let body_limit = DefaultBodyLimit::max(state.config().max_body_bytes);
    let reserve_limit = DefaultBodyLimit::max(state.config().reserve_max_body_bytes);

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/internal/checkout/reserve-stock",
            post(routes::checkout::reserve_stock).layer(reserve_limit),
        )
        .route(
            "/internal/checkout/commit",
            post(routes::checkout::commit).layer(body_limit.clone()),
        )
        .route(
            "/internal/checkout/release",
            post(routes::checkout::release).layer(body_limit.clone()),
        )
        .route(
            "/internal/checkout/reservations/{id}",
            get(routes::checkout::get_reservation),
        )
        .route(
            "/internal/maintenance/cleanup-reservations",
            post(routes::maintenance::cleanup_reservations).layer(body_limit),
        )
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

/// Wires the engine, coordinator and sweeper over one store that owns both
/// reservations and orders.
pub fn build_state<S>(store: S, config: ServiceConfig, shutdown: CancellationToken) -> AppState
where
    S: ReservationStore + OrderStore + Clone + 'static,
{
    let engine = ReservationEngine::new(store.clone()).with_config(config.engine());
    AppState::builder()
        .inventory(engine)
        .orders(store)
        .metrics(PrometheusMetrics)
        .config(config)
        .shutdown(shutdown)
        .build()
}

/// Creates the default application state over in-memory stores.
pub fn create_default_state(config: ServiceConfig, shutdown: CancellationToken) -> Arc<AppState> {
    Arc::new(build_state(InMemoryStore::new(), config, shutdown))
}
