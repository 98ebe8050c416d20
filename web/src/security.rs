//! Browser-facing response hardening.
//!
//! Every service answers CORS preflights from any origin and stamps the
//! usual hardening headers on each response. Headers already set by a
//! handler (or by a proxied backend) are left alone.

use axum::Router;
use axum::http::{HeaderName, HeaderValue};
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;

/// Headers added to every response that does not already carry them.
pub const SECURITY_HEADERS: [(&str, &str); 9] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "SAMEORIGIN"),
    ("x-dns-prefetch-control", "off"),
    ("x-download-options", "noopen"),
    ("x-permitted-cross-domain-policies", "none"),
    ("x-xss-protection", "0"),
    ("referrer-policy", "no-referrer"),
    ("strict-transport-security", "max-age=15552000; includeSubDomains"),
    ("cross-origin-opener-policy", "same-origin"),
];

/// CORS policy shared by all services: any origin, method and header.
#[must_use]
pub fn cors_layer() -> CorsLayer {
    CorsLayer::permissive()
}

/// Wrap `app` with [`cors_layer`] and the [`SECURITY_HEADERS`].
///
/// The header layers sit outside CORS, so preflight answers carry them too.
#[must_use]
pub fn with_security_layers(app: Router) -> Router {
    SECURITY_HEADERS
        .iter()
        .fold(app.layer(cors_layer()), |app, &(name, value)| {
            app.layer(SetResponseHeaderLayer::if_not_present(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            ))
        })
}
