//! Registration, login and bearer credential verification.
//!
//! Verification runs in a fixed order and stops at the first failure:
//! signature, expiry, then principal lookup.

mod password;
mod token;

pub use password::{hash_password, verify_password};
pub use token::{Claims, TokenCodec};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::AuthConfig;
use crate::error::{AuthRejection, ClubChatError, Result};
use crate::model::{
    normalize_email, validate_register_input, LoginInput, Principal, PrincipalSummary,
    RegisterInput,
};
use crate::storage::StorageBackend;

/// Token plus the summary of the principal it was issued to.
#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub token: String,
    pub user: PrincipalSummary,
}

/// Extract the token from an `Authorization` header value.
pub fn bearer_token(header: Option<&str>) -> std::result::Result<&str, AuthRejection> {
    let value = header.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Err(AuthRejection::Missing);
    }
    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => {
            let token = token.trim();
            if token.is_empty() {
                Err(AuthRejection::Missing)
            } else {
                Ok(token)
            }
        }
        _ => Err(AuthRejection::Malformed),
    }
}

#[derive(Debug, Clone)]
pub struct AuthService {
    tokens: TokenCodec,
}

impl AuthService {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            tokens: TokenCodec::new(secret, ttl),
        }
    }

    /// Build from config. Fails when no signing secret is configured.
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let secret = config.require_secret()?;
        let ttl = i64::try_from(config.token_ttl_hours.max(1))
            .ok()
            .and_then(Duration::try_hours)
            .ok_or_else(|| {
                ClubChatError::Config(format!(
                    "auth.token_ttl_hours = {} is out of range",
                    config.token_ttl_hours
                ))
            })?;
        Ok(Self::new(secret, ttl))
    }

    pub fn tokens(&self) -> &TokenCodec {
        &self.tokens
    }

    pub async fn register(
        &self,
        storage: &impl StorageBackend,
        input: &RegisterInput,
    ) -> Result<PrincipalSummary> {
        validate_register_input(input)?;

        let principal = Principal {
            email: normalize_email(&input.email),
            name: input.name.trim().to_string(),
            favorites: Vec::new(),
            created_at: Utc::now(),
        };

        let password = input.password.clone();
        let hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| ClubChatError::Config(format!("password hashing task failed: {e}")))??;

        storage.create_principal(&principal, &hash).await?;
        tracing::info!(email = %principal.email, "registered user");
        Ok(PrincipalSummary::from(&principal))
    }

    /// Check credentials and issue a token. Unknown email and wrong
    /// password are indistinguishable to the caller.
    pub async fn login(
        &self,
        storage: &impl StorageBackend,
        input: &LoginInput,
    ) -> Result<LoginOutcome> {
        let email = normalize_email(&input.email);
        if email.is_empty() || input.password.is_empty() {
            return Err(ClubChatError::InvalidInput(
                "email and password are required".into(),
            ));
        }

        let stored = match storage.get_password_hash(&email).await {
            Ok(hash) => hash,
            Err(ClubChatError::NotFound(_)) => return Err(ClubChatError::InvalidCredentials),
            Err(e) => return Err(e),
        };

        let password = input.password.clone();
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
            .await
            .map_err(|e| ClubChatError::Config(format!("password check task failed: {e}")))?;
        if !matches {
            return Err(ClubChatError::InvalidCredentials);
        }

        let principal = storage.get_principal(&email).await?;
        let token = self.tokens.issue(&principal.email, Utc::now())?;
        Ok(LoginOutcome {
            token,
            user: PrincipalSummary::from(&principal),
        })
    }

    pub async fn verify(
        &self,
        storage: &impl StorageBackend,
        token: Option<&str>,
    ) -> Result<Principal> {
        self.verify_at(storage, token, Utc::now()).await
    }

    /// Verify against an explicit clock.
    pub async fn verify_at(
        &self,
        storage: &impl StorageBackend,
        token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Principal> {
        let token = match token.map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => return Err(AuthRejection::Missing.into()),
        };

        let claims = self.tokens.decode(token, now)?;

        match storage.get_principal(&claims.sub).await {
            Ok(principal) => Ok(principal),
            Err(ClubChatError::NotFound(_)) => Err(AuthRejection::PrincipalNotFound.into()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;

    fn service() -> AuthService {
        AuthService::new("test-secret", Duration::hours(24))
    }

    fn register_input(email: &str) -> RegisterInput {
        RegisterInput {
            email: email.into(),
            password: "password123".into(),
            name: "Test User".into(),
        }
    }

    fn rejection(err: ClubChatError) -> AuthRejection {
        match err {
            ClubChatError::Auth(kind) => kind,
            other => panic!("expected auth rejection, got {other:?}"),
        }
    }

    fn auth_config(ttl_hours: u64) -> AuthConfig {
        AuthConfig {
            jwt_secret: Some("test-secret".into()),
            token_ttl_hours: ttl_hours,
        }
    }

    #[test]
    fn test_from_config_rejects_out_of_range_ttl() {
        let err = AuthService::from_config(&auth_config(u64::MAX)).unwrap_err();
        assert!(matches!(err, ClubChatError::Config(_)));

        let service = AuthService::from_config(&auth_config(48)).unwrap();
        assert_eq!(service.tokens().ttl(), Duration::hours(48));
    }

    #[tokio::test]
    async fn test_login_with_huge_ttl_is_error_not_panic() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let service = AuthService::from_config(&auth_config(3_000_000_000)).unwrap();
        service
            .register(&storage, &register_input("huge@ttl.edu"))
            .await
            .unwrap();
        let err = service
            .login(
                &storage,
                &LoginInput {
                    email: "huge@ttl.edu".into(),
                    password: "password123".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ClubChatError::Config(_)));
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(Some("Bearer abc.def")), Ok("abc.def"));
        assert_eq!(bearer_token(Some("bearer abc")), Ok("abc"));
        assert_eq!(bearer_token(None), Err(AuthRejection::Missing));
        assert_eq!(bearer_token(Some("  ")), Err(AuthRejection::Missing));
        assert_eq!(bearer_token(Some("Bearer ")), Err(AuthRejection::Missing));
        assert_eq!(bearer_token(Some("Basic abc")), Err(AuthRejection::Malformed));
        assert_eq!(bearer_token(Some("abc")), Err(AuthRejection::Malformed));
    }

    #[test]
    fn test_from_config_requires_secret() {
        assert!(AuthService::from_config(&AuthConfig::default()).is_err());
        let config = AuthConfig {
            jwt_secret: Some("s".into()),
            token_ttl_hours: 2,
        };
        let service = AuthService::from_config(&config).unwrap();
        assert_eq!(service.tokens().ttl(), Duration::hours(2));
    }

    #[tokio::test]
    async fn test_register_login_verify() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let auth = service();

        let summary = auth
            .register(&storage, &register_input("Test@GaTech.edu"))
            .await
            .unwrap();
        assert_eq!(summary.email, "test@gatech.edu");

        let outcome = auth
            .login(
                &storage,
                &LoginInput {
                    email: "TEST@gatech.edu".into(),
                    password: "password123".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.user.email, "test@gatech.edu");

        let principal = auth.verify(&storage, Some(&outcome.token)).await.unwrap();
        assert_eq!(principal.email, "test@gatech.edu");
        assert_eq!(principal.name, "Test User");
    }

    #[tokio::test]
    async fn test_register_duplicate() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let auth = service();
        auth.register(&storage, &register_input("a@b.co"))
            .await
            .unwrap();
        let err = auth
            .register(&storage, &register_input("A@B.co"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClubChatError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let auth = service();
        auth.register(&storage, &register_input("a@b.co"))
            .await
            .unwrap();

        let wrong_password = auth
            .login(
                &storage,
                &LoginInput {
                    email: "a@b.co".into(),
                    password: "nope-nope".into(),
                },
            )
            .await
            .unwrap_err();
        let unknown_email = auth
            .login(
                &storage,
                &LoginInput {
                    email: "who@b.co".into(),
                    password: "password123".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(wrong_password, ClubChatError::InvalidCredentials));
        assert!(matches!(unknown_email, ClubChatError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_verify_rejection_kinds() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let auth = service();
        auth.register(&storage, &register_input("a@b.co"))
            .await
            .unwrap();
        let now = Utc::now();

        let missing = auth.verify_at(&storage, None, now).await.unwrap_err();
        assert_eq!(rejection(missing), AuthRejection::Missing);

        let malformed = auth
            .verify_at(&storage, Some("garbage"), now)
            .await
            .unwrap_err();
        assert_eq!(rejection(malformed), AuthRejection::Malformed);

        let foreign = AuthService::new("other", Duration::hours(24))
            .tokens()
            .issue("a@b.co", now)
            .unwrap();
        let bad_sig = auth
            .verify_at(&storage, Some(&foreign), now)
            .await
            .unwrap_err();
        assert_eq!(rejection(bad_sig), AuthRejection::InvalidSignature);

        let stale = auth
            .tokens()
            .issue("a@b.co", now - Duration::hours(25))
            .unwrap();
        let expired = auth
            .verify_at(&storage, Some(&stale), now)
            .await
            .unwrap_err();
        assert_eq!(rejection(expired), AuthRejection::Expired);

        let ghost = auth.tokens().issue("ghost@b.co", now).unwrap();
        let gone = auth
            .verify_at(&storage, Some(&ghost), now)
            .await
            .unwrap_err();
        assert_eq!(rejection(gone), AuthRejection::PrincipalNotFound);
    }

    #[tokio::test]
    async fn test_expiry_checked_before_lookup() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let auth = service();
        let now = Utc::now();
        let stale_ghost = auth
            .tokens()
            .issue("ghost@b.co", now - Duration::hours(25))
            .unwrap();
        let err = auth
            .verify_at(&storage, Some(&stale_ghost), now)
            .await
            .unwrap_err();
        assert_eq!(rejection(err), AuthRejection::Expired);
    }
}
