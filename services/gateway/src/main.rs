//! Gateway binary.

use anyhow::Context;
use axum::Extension;
use chirp_auth::{FixedWindowRateLimiter, TokenService};
use chirp_gateway::{AppState, Config, Gatekeeper, Proxy, RouteTable, build_router};
use chirp_redis::RedisKeyValueStore;
use chirp_runtime::lifecycle::shutdown_signal;
use chirp_web::ProxyTrust;
use chirp_web::handlers::health_router;
use std::sync::Arc;
use tracing::info;

const SERVICE: &str = "gateway";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    chirp_web::init_tracing(SERVICE)?;
    let metrics = chirp_web::install_metrics()?;

    let config = Config::from_env()?;
    info!(?config, "Configuration loaded");

    let kv = RedisKeyValueStore::connect(&config.redis_url)
        .await
        .context("connecting to Redis")?;

    let state = AppState {
        routes: Arc::new(RouteTable::chirp(&config.backends)),
        gate: Gatekeeper::new(
            TokenService::new(config.jwt_secret.as_bytes()),
            Arc::new(FixedWindowRateLimiter::new(Arc::new(kv))),
            &config.rate_limits,
        ),
        proxy: Proxy::new(config.proxy).context("building the proxy client")?,
    };

    let trust = if config.trust_proxy {
        ProxyTrust::Forwarded
    } else {
        ProxyTrust::Direct
    };

    let app = health_router(SERVICE, Some(metrics))
        .merge(build_router(state))
        .layer(Extension(trust));
    chirp_web::serve(app, &config.server, shutdown_signal()).await?;

    info!("Server stopped");
    Ok(())
}
