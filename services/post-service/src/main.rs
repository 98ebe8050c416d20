//! Post service binary.

use anyhow::Context;
use chirp_cache::CacheManager;
use chirp_core::SystemClock;
use chirp_postgres::PgPostStore;
use chirp_redis::RedisKeyValueStore;
use chirp_redpanda::{BusConnection, RedpandaEventBus};
use chirp_runtime::lifecycle::shutdown_signal;
use chirp_web::handlers::health_router;
use chirp_post_service::{AppState, Config, PostService, build_router};
use std::sync::Arc;
use tracing::info;

const SERVICE: &str = "post-service";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    chirp_web::init_tracing(SERVICE)?;
    let metrics = chirp_web::install_metrics()?;

    let config = Config::from_env()?;
    info!(brokers = %config.brokers, port = config.server.port, "Configuration loaded");

    let pool = chirp_postgres::connect(&config.database_url, config.database_max_connections)
        .await
        .context("connecting to PostgreSQL")?;
    chirp_postgres::migrate(&pool).await.context("running migrations")?;

    let kv = RedisKeyValueStore::connect(&config.redis_url)
        .await
        .context("connecting to Redis")?;

    let connection = BusConnection::connect(&config.brokers)
        .await
        .context("connecting to the event bus")?;
    let event_bus = Arc::new(RedpandaEventBus::new(connection));

    let posts = PostService::new(
        Arc::new(PgPostStore::new(pool)),
        CacheManager::new(Arc::new(kv), config.cache),
        event_bus,
        Arc::new(SystemClock),
    );

    let app = build_router(AppState { posts }).merge(health_router(SERVICE, Some(metrics)));
    chirp_web::serve(app, &config.server, shutdown_signal()).await?;

    info!("Server stopped");
    Ok(())
}
