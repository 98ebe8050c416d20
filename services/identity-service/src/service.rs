//! Account and token operations.
//!
//! Access tokens are short-lived HS256 JWTs the gateway verifies on its own.
//! Refresh tokens are opaque, stored server-side and single use: every
//! refresh deletes the presented token and issues a new pair.

use chirp_auth::{TokenService, generate_refresh_token, hash_password, verify_password};
use chirp_core::Clock;
use chirp_core::error::PlatformError;
use chirp_core::ids::UserId;
use chirp_core::model::{RefreshToken, User};
use chirp_core::store::{StoreError, UserStore};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Username length bounds, in characters.
pub const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=30;

/// Shortest accepted password.
pub const MIN_PASSWORD_LEN: usize = 6;

/// An access/refresh token pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// JWT for the `Authorization: Bearer` header
    pub access_token: String,
    /// Opaque token for `refresh-token` and `logout`
    pub refresh_token: String,
    /// The user the pair belongs to
    pub user_id: UserId,
}

/// Registration input.
#[derive(Debug, Clone)]
pub struct Registration<'a> {
    /// Unique handle
    pub username: &'a str,
    /// Unique email address
    pub email: &'a str,
    /// Clear-text password, hashed before storage
    pub password: &'a str,
}

/// Account and token operations.
#[derive(Clone)]
pub struct IdentityService {
    users: Arc<dyn UserStore>,
    tokens: TokenService,
    clock: Arc<dyn Clock>,
    refresh_ttl: Duration,
}

impl std::fmt::Debug for IdentityService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityService")
            .field("tokens", &self.tokens)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl IdentityService {
    /// Create the service.
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: TokenService,
        clock: Arc<dyn Clock>,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            users,
            tokens,
            clock,
            refresh_ttl,
        }
    }

    /// Create an account and sign it in.
    ///
    /// # Errors
    ///
    /// - [`PlatformError::ValidationFailed`] for bad input or a taken
    ///   username or email
    /// - [`PlatformError::UpstreamUnavailable`] if the store fails
    pub async fn register(&self, input: Registration<'_>) -> Result<TokenPair, PlatformError> {
        let username = input.username.trim();
        let email = input.email.trim().to_ascii_lowercase();
        validate_registration(username, &email, input.password)?;

        if self.users.find_by_username(username).await?.is_some() {
            warn!(username, "Registration for existing user");
            return Err(PlatformError::validation("username", "User already exists"));
        }

        let password_hash = hash_blocking(input.password.to_string()).await?;
        let user = User {
            id: UserId::new(),
            username: username.to_string(),
            email,
            password_hash,
            created_at: self.clock.now(),
        };
        self.users.insert(&user).await.map_err(|e| match e {
            StoreError::Conflict(_) => PlatformError::validation("email", "User already exists"),
            other => other.into(),
        })?;

        metrics::counter!("identity.registrations").increment(1);
        info!(user_id = %user.id, username = %user.username, "User registered");
        self.issue_pair(&user).await
    }

    /// Exchange a username and password for a token pair.
    ///
    /// # Errors
    ///
    /// - [`PlatformError::InvalidCredential`] for an unknown user or wrong password
    /// - [`PlatformError::UpstreamUnavailable`] if the store fails
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, PlatformError> {
        let Some(user) = self.users.find_by_username(username.trim()).await? else {
            warn!(username, "Login for unknown user");
            return Err(PlatformError::InvalidCredential("Invalid credentials".to_string()));
        };

        if !verify_blocking(password.to_string(), user.password_hash.clone()).await? {
            warn!(user_id = %user.id, "Login with wrong password");
            metrics::counter!("identity.login_failures").increment(1);
            return Err(PlatformError::InvalidCredential("Invalid credentials".to_string()));
        }

        info!(user_id = %user.id, "User logged in");
        self.issue_pair(&user).await
    }

    /// Rotate a refresh token into a new pair.
    ///
    /// # Errors
    ///
    /// - [`PlatformError::InvalidCredential`] if the token is unknown, already
    ///   used or expired
    /// - [`PlatformError::UpstreamUnavailable`] if the store fails
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, PlatformError> {
        let invalid = || PlatformError::InvalidCredential("Invalid or expired refresh token".to_string());

        let stored = self
            .users
            .take_refresh_token(refresh_token)
            .await?
            .ok_or_else(invalid)?;
        if stored.is_expired(self.clock.now()) {
            warn!(user_id = %stored.user_id, "Expired refresh token presented");
            return Err(invalid());
        }
        let user = self
            .users
            .find_by_id(stored.user_id)
            .await?
            .ok_or_else(invalid)?;

        info!(user_id = %user.id, "Refresh token rotated");
        self.issue_pair(&user).await
    }

    /// Revoke a refresh token. Unknown tokens are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::UpstreamUnavailable`] if the store fails.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), PlatformError> {
        if let Some(stored) = self.users.take_refresh_token(refresh_token).await? {
            info!(user_id = %stored.user_id, "User logged out");
        }
        Ok(())
    }

    async fn issue_pair(&self, user: &User) -> Result<TokenPair, PlatformError> {
        let now = self.clock.now();
        let access_token = self.tokens.issue(user.id, &user.username, now)?;
        let ttl = chrono::Duration::from_std(self.refresh_ttl)
            .map_err(|e| PlatformError::Internal(format!("refresh TTL out of range: {e}")))?;
        let refresh = RefreshToken {
            token: generate_refresh_token(),
            user_id: user.id,
            expires_at: now + ttl,
        };
        self.users.save_refresh_token(&refresh).await?;

        Ok(TokenPair {
            access_token,
            refresh_token: refresh.token,
            user_id: user.id,
        })
    }
}

/// Check registration input, naming the first offending field.
///
/// # Errors
///
/// Returns [`PlatformError::ValidationFailed`].
pub fn validate_registration(username: &str, email: &str, password: &str) -> Result<(), PlatformError> {
    if !USERNAME_LEN.contains(&username.chars().count()) {
        return Err(PlatformError::validation(
            "username",
            "\"username\" must be between 3 and 30 characters",
        ));
    }
    if !is_valid_email(email) {
        return Err(PlatformError::validation("email", "\"email\" must be a valid email"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(PlatformError::validation(
            "password",
            "\"password\" must be at least 6 characters long",
        ));
    }
    Ok(())
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

async fn hash_blocking(password: String) -> Result<String, PlatformError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| PlatformError::Internal(format!("hashing task failed: {e}")))?
        .map_err(PlatformError::from)
}

async fn verify_blocking(password: String, hash: String) -> Result<bool, PlatformError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| PlatformError::Internal(format!("verification task failed: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chirp_auth::constants::REFRESH_TOKEN_TTL;
    use chirp_testing::{InMemoryUserStore, ManualClock};

    // Token verification checks `exp` against the wall clock.
    fn wall_clock() -> ManualClock {
        ManualClock::new(chrono::Utc::now())
    }

    fn service(users: &InMemoryUserStore, clock: ManualClock) -> IdentityService {
        IdentityService::new(
            Arc::new(users.clone()),
            TokenService::new(b"test-secret-at-least-32-bytes-long!!"),
            Arc::new(clock),
            REFRESH_TOKEN_TTL,
        )
    }

    fn alice() -> Registration<'static> {
        Registration {
            username: "alice",
            email: "Alice@Example.com",
            password: "hunter22",
        }
    }

    #[test]
    fn registration_validation_names_the_field() {
        let field = |r: Result<(), PlatformError>| match r {
            Err(PlatformError::ValidationFailed { field, .. }) => field,
            other => format!("{other:?}"),
        };
        assert_eq!(field(validate_registration("al", "a@b.co", "secret")), "username");
        assert_eq!(field(validate_registration("alice", "not-an-email", "secret")), "email");
        assert_eq!(field(validate_registration("alice", "a@b", "secret")), "email");
        assert_eq!(field(validate_registration("alice", "a@b.co", "short")), "password");
        assert!(validate_registration("alice", "a@b.co", "secret").is_ok());
    }

    #[tokio::test]
    async fn register_then_login() {
        let users = InMemoryUserStore::new();
        let svc = service(&users, wall_clock());

        let registered = svc.register(alice()).await.unwrap();
        let claims = svc.tokens.verify(&registered.access_token).unwrap();
        assert_eq!(claims.user_id, registered.user_id);
        assert_eq!(claims.username, "alice");

        let logged_in = svc.login("alice", "hunter22").await.unwrap();
        assert_eq!(logged_in.user_id, registered.user_id);
        assert_eq!(users.refresh_token_count(), 2);

        assert!(matches!(
            svc.login("alice", "wrong-password").await,
            Err(PlatformError::InvalidCredential(_))
        ));
        assert!(matches!(
            svc.login("bob", "hunter22").await,
            Err(PlatformError::InvalidCredential(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let users = InMemoryUserStore::new();
        let svc = service(&users, wall_clock());
        svc.register(alice()).await.unwrap();

        let err = svc.register(alice()).await.unwrap_err();
        assert!(matches!(err, PlatformError::ValidationFailed { ref field, .. } if field == "username"));

        let same_email = Registration {
            username: "alice2",
            email: "alice@example.com",
            password: "hunter22",
        };
        let err = svc.register(same_email).await.unwrap_err();
        assert!(matches!(err, PlatformError::ValidationFailed { ref field, .. } if field == "email"));
    }

    #[tokio::test]
    async fn refresh_rotates_and_is_single_use() {
        let users = InMemoryUserStore::new();
        let svc = service(&users, wall_clock());
        let first = svc.register(alice()).await.unwrap();

        let second = svc.refresh(&first.refresh_token).await.unwrap();
        assert_ne!(second.refresh_token, first.refresh_token);
        assert_eq!(users.refresh_token_count(), 1);

        assert!(matches!(
            svc.refresh(&first.refresh_token).await,
            Err(PlatformError::InvalidCredential(_))
        ));
    }

    #[tokio::test]
    async fn expired_refresh_tokens_are_refused() {
        let users = InMemoryUserStore::new();
        let clock = wall_clock();
        let svc = service(&users, clock.clone());
        let pair = svc.register(alice()).await.unwrap();

        clock.advance(REFRESH_TOKEN_TTL + Duration::from_secs(1));

        assert!(matches!(
            svc.refresh(&pair.refresh_token).await,
            Err(PlatformError::InvalidCredential(_))
        ));
    }

    #[tokio::test]
    async fn logout_revokes_the_refresh_token() {
        let users = InMemoryUserStore::new();
        let svc = service(&users, wall_clock());
        let pair = svc.register(alice()).await.unwrap();

        svc.logout(&pair.refresh_token).await.unwrap();
        svc.logout("never-issued").await.unwrap();

        assert_eq!(users.refresh_token_count(), 0);
        assert!(svc.refresh(&pair.refresh_token).await.is_err());
    }
}
