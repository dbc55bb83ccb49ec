use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::auth::AuthService;
use crate::error::Result;
use crate::model::Principal;
use crate::storage::StorageBackend;

/// Hex characters kept from the anonymous fingerprint digest.
pub const FINGERPRINT_LEN: usize = 16;

/// Key that scopes conversational memory to one caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn principal(email: &str) -> Self {
        Self(format!("email:{email}"))
    }

    pub fn anonymous(conn: &ConnectionMeta) -> Self {
        Self(format!(
            "anon:{}",
            anonymous_fingerprint(&conn.origin, &conn.signature)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_anonymous(&self) -> bool {
        self.0.starts_with("anon:")
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the transport knows about the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionMeta {
    /// Client address as seen by the service.
    pub origin: String,
    /// Client signature, usually the User-Agent.
    pub signature: String,
}

impl ConnectionMeta {
    pub fn new(origin: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            signature: signature.into(),
        }
    }
}

/// SHA-256 over `origin|signature`, hex-encoded and truncated.
pub fn anonymous_fingerprint(origin: &str, signature: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(origin.as_bytes());
    hasher.update(b"|");
    hasher.update(signature.as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(FINGERPRINT_LEN);
    digest
}

/// Turn the outcome of credential verification into an identity.
/// A rejected credential is not an error here: the caller becomes anonymous.
pub fn identity_from_verification(outcome: Result<Principal>, conn: &ConnectionMeta) -> Identity {
    match outcome {
        Ok(principal) => Identity::principal(&principal.email),
        Err(e) => {
            tracing::debug!(reason = %e, "credential not accepted, using anonymous identity");
            Identity::anonymous(conn)
        }
    }
}

/// Resolve the caller's identity. Never fails.
pub async fn resolve_identity(
    auth: &AuthService,
    storage: &impl StorageBackend,
    bearer: Option<&str>,
    conn: &ConnectionMeta,
) -> Identity {
    match bearer {
        Some(token) => identity_from_verification(auth.verify(storage, Some(token)).await, conn),
        None => Identity::anonymous(conn),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AuthRejection, ClubChatError};
    use crate::model::RegisterInput;
    use crate::storage::SqliteStorage;
    use chrono::{Duration, Utc};

    fn conn() -> ConnectionMeta {
        ConnectionMeta::new("10.0.0.7", "Mozilla/5.0")
    }

    #[test]
    fn test_fingerprint_is_deterministic_and_fixed_length() {
        let a = anonymous_fingerprint("10.0.0.7", "Mozilla/5.0");
        let b = anonymous_fingerprint("10.0.0.7", "Mozilla/5.0");
        assert_eq!(a, b);
        assert_eq!(a.len(), FINGERPRINT_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_distinguishes_inputs() {
        let base = anonymous_fingerprint("10.0.0.7", "Mozilla/5.0");
        assert_ne!(base, anonymous_fingerprint("10.0.0.8", "Mozilla/5.0"));
        assert_ne!(base, anonymous_fingerprint("10.0.0.7", "curl/8.0"));
        // The separator keeps shifted boundaries apart.
        assert_ne!(
            anonymous_fingerprint("ab", "c"),
            anonymous_fingerprint("a", "bc")
        );
    }

    #[test]
    fn test_verification_success_gives_email_identity() {
        let principal = Principal {
            email: "a@b.co".into(),
            name: "A".into(),
            favorites: vec![],
            created_at: Utc::now(),
        };
        let id = identity_from_verification(Ok(principal), &conn());
        assert_eq!(id.as_str(), "email:a@b.co");
        assert!(!id.is_anonymous());
    }

    #[test]
    fn test_verification_failure_falls_through_to_anonymous() {
        for kind in [
            AuthRejection::Missing,
            AuthRejection::Malformed,
            AuthRejection::Expired,
            AuthRejection::InvalidSignature,
            AuthRejection::PrincipalNotFound,
        ] {
            let id = identity_from_verification(Err(ClubChatError::Auth(kind)), &conn());
            assert_eq!(id, Identity::anonymous(&conn()));
        }
        let id = identity_from_verification(
            Err(ClubChatError::Storage("down".into())),
            &conn(),
        );
        assert!(id.is_anonymous());
    }

    #[tokio::test]
    async fn test_resolve_identity_is_stable_for_same_credential() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let auth = AuthService::new("secret", Duration::hours(1));
        auth.register(
            &storage,
            &RegisterInput {
                email: "a@b.co".into(),
                password: "password123".into(),
                name: "A".into(),
            },
        )
        .await
        .unwrap();
        let token = auth.tokens().issue("a@b.co", Utc::now()).unwrap();

        let first = resolve_identity(&auth, &storage, Some(&token), &conn()).await;
        let other_conn = ConnectionMeta::new("192.168.1.1", "curl/8.0");
        let second = resolve_identity(&auth, &storage, Some(&token), &other_conn).await;
        assert_eq!(first, second);
        assert_eq!(first.as_str(), "email:a@b.co");
    }

    #[tokio::test]
    async fn test_resolve_identity_with_bad_token_is_anonymous() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let auth = AuthService::new("secret", Duration::hours(1));
        let id = resolve_identity(&auth, &storage, Some("not-a-token"), &conn()).await;
        assert_eq!(id, Identity::anonymous(&conn()));
        let none = resolve_identity(&auth, &storage, None, &conn()).await;
        assert_eq!(id, none);
    }
}
