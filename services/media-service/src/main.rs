//! Media service binary.

use anyhow::Context;
use chirp_core::SystemClock;
use chirp_core::event_bus::EventBus;
use chirp_media_service::{AppState, Config, FsBlobStore, build_router, spawn_consumers};
use chirp_postgres::PgMediaStore;
use chirp_redpanda::{BusConnection, RedpandaEventBus};
use chirp_runtime::lifecycle::shutdown_signal;
use chirp_runtime::{RetryPolicy, Shutdown};
use chirp_web::handlers::health_router;
use std::sync::Arc;
use tracing::info;

const SERVICE: &str = "media-service";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    chirp_web::init_tracing(SERVICE)?;
    let metrics = chirp_web::install_metrics()?;

    let config = Config::from_env()?;
    info!(
        brokers = %config.brokers,
        media_root = %config.media_root.display(),
        port = config.server.port,
        "Configuration loaded"
    );

    let pool = chirp_postgres::connect(&config.database_url, config.database_max_connections)
        .await
        .context("connecting to PostgreSQL")?;
    chirp_postgres::migrate(&pool).await.context("running migrations")?;

    let blobs = FsBlobStore::open(&config.media_root, &config.public_base_url)
        .await
        .context("opening the media directory")?;

    let connection = BusConnection::connect(&config.brokers)
        .await
        .context("connecting to the event bus")?;
    let event_bus: Arc<dyn EventBus> = Arc::new(RedpandaEventBus::new(connection));

    let state = AppState::new(
        Arc::new(PgMediaStore::new(pool)),
        Arc::new(blobs),
        Arc::new(SystemClock),
    );

    let shutdown = Shutdown::new();
    let retry_policy = RetryPolicy::builder()
        .max_retries(config.consumer_max_retries)
        .build();
    let consumers = spawn_consumers(&state, &event_bus, &shutdown, &retry_policy)?;
    info!(consumers = consumers.len(), "Event consumers started");

    let app = build_router(state).merge(health_router(SERVICE, Some(metrics)));
    chirp_web::serve(app, &config.server, shutdown_signal()).await?;

    shutdown.trigger();
    Shutdown::drain(consumers, config.server.shutdown_timeout).await;
    info!("Server stopped");
    Ok(())
}
