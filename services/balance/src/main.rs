//! `balancecore`: the balance replica binary.
//!
//! Runs the projection consumer and the query API side by side. Both stop
//! on Ctrl+C or SIGTERM.

use anyhow::Context;
use balance_service::{AppState, BalanceProjection, Config, GetAccountBalance, build_router};
use ledger_core::EventBus;
use ledger_projections::{PostgresBalanceStore, ProjectionConsumer};
use ledger_redpanda::RedpandaEventBus;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,balance_service=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting balance service");

    let config = Config::from_env();
    info!(
        redpanda_brokers = %config.redpanda.brokers,
        consumer_group = %config.redpanda.consumer_group,
        balances_topic = %config.redpanda.balances_topic,
        projection_mode = ?config.projection_mode,
        "Configuration loaded"
    );

    let metrics_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.metrics_port)
        .parse()
        .context("invalid metrics address")?;
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .context("failed to install Prometheus exporter")?;

    let store = Arc::new(
        PostgresBalanceStore::new_with_separate_db(&config.postgres.url, config.postgres.max_connections)
            .await
            .context("failed to connect to the replica database")?,
    );
    store.migrate().await.context("failed to run replica migrations")?;
    info!("Replica database ready");

    let event_bus: Arc<dyn EventBus> = Arc::new(
        RedpandaEventBus::builder()
            .brokers(config.redpanda.brokers.clone())
            .consumer_group(config.redpanda.consumer_group.clone())
            .auto_offset_reset(config.redpanda.auto_offset_reset.clone())
            .build()?,
    );

    let projection = BalanceProjection::new(Arc::clone(&store), config.projection_mode);
    let (consumer, shutdown_tx) =
        ProjectionConsumer::new(projection, event_bus, config.redpanda.balances_topic.clone());
    let consumer_task = tokio::spawn(async move { consumer.run().await });

    let state = AppState {
        get_balance: Arc::new(GetAccountBalance::new(store)),
    };
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    match consumer_task.await {
        Ok(Ok(stats)) => info!(
            received = stats.received,
            applied = stats.applied,
            skipped = stats.skipped,
            "Projection consumer finished"
        ),
        Ok(Err(e)) => error!(error = %e, "Projection consumer failed"),
        Err(e) => error!(error = %e, "Projection consumer task panicked"),
    }

    info!("Server stopped");
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
