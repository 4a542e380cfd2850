//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use checkout::{PrometheusMetrics, spawn_sweeper};
use store::PostgresStore;
use tokio::signal;
use tokio_util::sync::CancellationToken;
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

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Wire the stores; Postgres when configured, in-memory otherwise
    let shutdown = CancellationToken::new();
    let state = match &config.database_url {
        Some(url) => {
            let store = PostgresStore::connect(url)
                .await
                .expect("failed to connect to PostgreSQL");
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL stores");
            Arc::new(api::build_state(
                store,
                config.service.clone(),
                shutdown.clone(),
            ))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory stores");
            api::create_default_state(config.service.clone(), shutdown.clone())
        }
    };
    tracing::info!(
        velocity_lookback_days = config.service.velocity_lookback_days,
        order_page_size = config.service.order_page_size,
        max_order_pages = config.service.max_order_pages,
        sweep_default_limit = config.service.sweep_default_limit,
        sweep_max_limit = config.service.sweep_max_limit,
        "service configuration loaded"
    );

    // 4. Start the periodic expiry sweep
    let sweeper_task = match (config.sweep_interval, state.sweeper()) {
        (Some(period), Ok(sweeper)) => {
            tracing::info!(period_secs = period.as_secs(), "starting expiry sweeper");
            Some(spawn_sweeper(
                sweeper.clone(),
                period,
                Arc::new(PrometheusMetrics),
                shutdown.clone(),
            ))
        }
        _ => None,
    };

    // 5. Build the application
    let app = api::create_app(state, metrics_handle);

    // 6. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    let token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            token.cancel();
        })
        .await
        .expect("server error");

    shutdown.cancel();
    if let Some(task) = sweeper_task {
        let _ = task.await;
    }

    tracing::info!("server shut down gracefully");
}
