//! HS256 access tokens and opaque refresh tokens.
//!
//! Access tokens carry `{ userId, username, iat, exp }` and are signed with a
//! secret shared by the identity service (which issues them) and the gateway
//! (which verifies them). Refresh tokens are random hex strings with no
//! embedded meaning; the identity service stores them.

use crate::constants::{ACCESS_TOKEN_TTL, REFRESH_TOKEN_BYTES};
use crate::error::{AuthError, Result};
use chirp_core::ids::UserId;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::Duration;

/// Claims stored in an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    /// Account the token was issued to.
    pub user_id: UserId,
    /// Username at issue time.
    pub username: String,
    /// Issued-at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

/// Signs and verifies access tokens with one shared secret.
///
/// # Example
///
/// ```
/// use chirp_auth::TokenService;
/// use chirp_core::ids::UserId;
///
/// let tokens = TokenService::new(b"a-long-shared-secret");
/// let token = tokens.issue(UserId::new(), "alice", chrono::Utc::now()).unwrap();
/// let claims = tokens.verify(&token).unwrap();
/// assert_eq!(claims.username, "alice");
/// ```
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Create a service with the default one hour lifetime.
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl: ACCESS_TOKEN_TTL,
        }
    }

    /// Override the token lifetime.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Token lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a token for `user_id` issued at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TokenGeneration`] if signing fails.
    pub fn issue(&self, user_id: UserId, username: &str, now: DateTime<Utc>) -> Result<String> {
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            user_id,
            username: username.to_string(),
            iat: now.timestamp(),
            exp: now.timestamp().saturating_add(ttl),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::TokenGeneration(e.to_string()))
    }

    /// Check the signature and expiry of `token` and return its claims.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TokenExpired`] for an expired token and
    /// [`AuthError::InvalidToken`] for anything else that fails validation.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                ErrorKind::InvalidSignature => AuthError::InvalidToken("bad signature".into()),
                _ => AuthError::InvalidToken(e.to_string()),
            })
    }
}

/// Pull the token out of an `Authorization` header value.
///
/// # Errors
///
/// Returns [`AuthError::MissingCredential`] if the header is absent or has no
/// token, and [`AuthError::InvalidToken`] if the scheme is not `Bearer`.
pub fn extract_bearer(header: Option<&str>) -> Result<&str> {
    let value = header.map(str::trim).unwrap_or_default();
    let (scheme, token) = value.split_once(' ').unwrap_or((value, ""));
    let token = token.trim();

    if token.is_empty() {
        return Err(AuthError::MissingCredential);
    }
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidToken(format!("unsupported scheme {scheme}")));
    }
    Ok(token)
}

/// Generate an opaque refresh token.
#[must_use]
pub fn generate_refresh_token() -> String {
    let mut bytes = [0_u8; REFRESH_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}
