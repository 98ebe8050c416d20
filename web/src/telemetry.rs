//! Tracing and metrics bootstrap shared by every service binary.
//!
//! `RUST_LOG` selects the filter (default `info,tower_http=debug`) and
//! `LOG_FORMAT=json` switches to one JSON object per line.

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Telemetry setup failures.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// A global subscriber was already installed
    #[error("Failed to install tracing subscriber: {0}")]
    Tracing(String),

    /// The Prometheus recorder could not be built or installed
    #[error("Failed to install metrics recorder: {0}")]
    Metrics(String),
}

/// Install the global tracing subscriber for `service`.
///
/// # Errors
///
/// Returns [`TelemetryError::Tracing`] if a subscriber is already installed.
pub fn init_tracing(service: &str) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("info,{},tower_http=debug", service.replace('-', "_")).into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };
    result.map_err(|e| TelemetryError::Tracing(e.to_string()))?;

    install_panic_hook();
    tracing::info!(service, "Tracing initialized");
    Ok(())
}

/// Route panics through tracing so they land in structured logs.
fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();
        tracing::error!(%location, panic = %info, "Panic");
        previous(info);
    }));
}

/// Install the Prometheus recorder and return the handle `/metrics` renders.
///
/// # Errors
///
/// Returns [`TelemetryError::Metrics`] if a recorder is already installed.
pub fn install_metrics() -> Result<PrometheusHandle, TelemetryError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
        )
        .map_err(|e| TelemetryError::Metrics(e.to_string()))?
        .install_recorder()
        .map_err(|e| TelemetryError::Metrics(e.to_string()))
}
