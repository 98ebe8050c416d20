//! Prefix routing from the public `/v1` surface to the backends.

use crate::config::BackendUrls;

/// Public prefix clients call.
pub const PUBLIC_PREFIX: &str = "/v1";

/// Prefix the backends serve.
pub const BACKEND_PREFIX: &str = "/api";

/// The service behind a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Accounts and tokens
    Identity,
    /// Posts
    Post,
    /// Uploads
    Media,
    /// Full-text search
    Search,
}

impl Backend {
    /// Name used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Post => "post",
            Self::Media => "media",
            Self::Search => "search",
        }
    }
}

/// One public prefix and how to treat requests under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Public path prefix, e.g. `/v1/posts`
    pub prefix: &'static str,
    /// Target service
    pub backend: Backend,
    /// Base URL of the target service
    pub base_url: String,
    /// Whether a valid access token is required
    pub requires_auth: bool,
    /// Whether multipart bodies pass through with their own content type
    pub streams_multipart: bool,
}

/// Resolves request paths onto routes by longest matching prefix.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Build a table from arbitrary routes.
    #[must_use]
    pub fn new(mut routes: Vec<Route>) -> Self {
        routes.sort_by_key(|r| std::cmp::Reverse(r.prefix.len()));
        Self { routes }
    }

    /// The four Chirp backends.
    #[must_use]
    pub fn chirp(urls: &BackendUrls) -> Self {
        let route = |prefix, backend, base_url: &String, requires_auth, streams_multipart| Route {
            prefix,
            backend,
            base_url: base_url.trim_end_matches('/').to_string(),
            requires_auth,
            streams_multipart,
        };
        Self::new(vec![
            route("/v1/auth", Backend::Identity, &urls.identity, false, false),
            route("/v1/posts", Backend::Post, &urls.post, true, false),
            route("/v1/media", Backend::Media, &urls.media, true, true),
            route("/v1/search", Backend::Search, &urls.search, true, false),
        ])
    }

    /// The route owning `path`, matching whole path segments only.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|route| {
            path.strip_prefix(route.prefix)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }
}

/// Replace the public prefix with the backend one, keeping the rest of the
/// path and any query string.
#[must_use]
pub fn rewrite_path(path_and_query: &str) -> String {
    match path_and_query.strip_prefix(PUBLIC_PREFIX) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') || rest.starts_with('?') => {
            format!("{BACKEND_PREFIX}{rest}")
        }
        _ => path_and_query.to_string(),
    }
}
