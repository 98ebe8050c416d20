//! Identity service binary.

use anyhow::Context;
use chirp_auth::TokenService;
use chirp_core::SystemClock;
use chirp_identity_service::{AppState, Config, IdentityService, build_router};
use chirp_postgres::PgUserStore;
use chirp_runtime::lifecycle::shutdown_signal;
use chirp_web::handlers::health_router;
use std::sync::Arc;
use tracing::info;

const SERVICE: &str = "identity-service";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    chirp_web::init_tracing(SERVICE)?;
    let metrics = chirp_web::install_metrics()?;

    let config = Config::from_env()?;
    info!(port = config.server.port, "Configuration loaded");

    let pool = chirp_postgres::connect(&config.database_url, config.database_max_connections)
        .await
        .context("connecting to PostgreSQL")?;
    chirp_postgres::migrate(&pool).await.context("running migrations")?;

    let tokens = TokenService::new(config.jwt_secret.as_bytes()).with_ttl(config.access_token_ttl);
    let identity = IdentityService::new(
        Arc::new(PgUserStore::new(pool)),
        tokens,
        Arc::new(SystemClock),
        config.refresh_token_ttl,
    );

    let app = build_router(AppState { identity }).merge(health_router(SERVICE, Some(metrics)));
    chirp_web::serve(app, &config.server, shutdown_signal()).await?;

    info!("Server stopped");
    Ok(())
}
