//! attendance-gateway server entry point.
//!
//! Starts the poller and the Axum HTTP server with REST and WebSocket
//! endpoints.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::routing::get;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use attendance_gateway::api;
use attendance_gateway::app_state::AppState;
use attendance_gateway::config::{GatewayConfig, LogFormat};
use attendance_gateway::device_client::HttpDeviceClient;
use attendance_gateway::domain::EventBus;
use attendance_gateway::persistence::{InMemoryStore, PostgresStore, Store};
use attendance_gateway::service::{DeviceDefaults, DeviceService, IngestionRoutine, Poller};
use attendance_gateway::ws::handler::ws_handler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = GatewayConfig::from_env().context("loading configuration")?;
    init_tracing(config.log_format);
    tracing::info!(addr = %config.listen_addr, "starting attendance-gateway");

    let event_bus = EventBus::new(config.event_bus_capacity);

    // Build persistence layer
    let store = if config.persistence_enabled {
        let store = PostgresStore::connect(&config)
            .await
            .context("connecting to PostgreSQL")?;
        tracing::info!("connected to PostgreSQL");
        Store::Postgres(store)
    } else {
        tracing::warn!("persistence disabled, using in-memory store");
        Store::Memory(InMemoryStore::new())
    };

    // Build service layer
    let device_service = Arc::new(DeviceService::new(
        store.clone(),
        event_bus.clone(),
        DeviceDefaults {
            port: config.default_device_port,
            api_endpoint: config.default_api_endpoint.clone(),
        },
    ));

    // Start the poller
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller_task = if config.poller_enabled {
        let client = HttpDeviceClient::new().context("building device client")?;
        let routine = IngestionRoutine::new(
            store.clone(),
            store.clone(),
            store,
            client,
            config.device_connect_timeout(),
            event_bus.clone(),
        );
        let poller = Poller::new(routine, config.poll_interval());
        Some(tokio::spawn(poller.run(shutdown_rx)))
    } else {
        tracing::info!("poller disabled");
        None
    };

    // Build application state
    let app_state = AppState {
        device_service,
        event_bus,
    };

    // Build router
    let app = Router::new()
        .merge(api::build_router())
        .layer(api::request_timeout_layer(config.request_timeout()))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    if let Some(task) = poller_task {
        let _ = task.await;
    }
    tracing::info!("attendance-gateway stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

/// Resolves on Ctrl-C and tells the poller to stop.
async fn shutdown_signal(poller_shutdown: watch::Sender<bool>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
    let _ = poller_shutdown.send(true);
}
