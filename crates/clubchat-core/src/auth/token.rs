use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{AuthRejection, ClubChatError, Result};

/// Claims carried by a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Principal email.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signs and checks HS256 bearer tokens with a server-held secret.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").field("ttl", &self.ttl).finish()
    }
}

impl TokenCodec {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against an explicit clock after the signature.
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["sub", "exp"]);

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for `email`, valid from `now` for the configured lifetime.
    pub fn issue(&self, email: &str, now: DateTime<Utc>) -> Result<String> {
        let exp = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| ClubChatError::Config("token expiry is out of range".into()))?;
        let claims = Claims {
            sub: email.to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ClubChatError::Config(format!("failed to sign token: {e}")))
    }

    /// Decode and check a token: signature first, then expiry at `now`.
    pub fn decode(&self, token: &str, now: DateTime<Utc>) -> std::result::Result<Claims, AuthRejection> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation).map_err(
            |e| match e.kind() {
                ErrorKind::InvalidSignature => AuthRejection::InvalidSignature,
                _ => AuthRejection::Malformed,
            },
        )?;

        if now.timestamp() >= data.claims.exp {
            return Err(AuthRejection::Expired);
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(secret: &str) -> TokenCodec {
        TokenCodec::new(secret, Duration::hours(24))
    }

    #[test]
    fn test_issue_then_decode() {
        let now = Utc::now();
        let token = codec("secret").issue("a@b.co", now).unwrap();
        let claims = codec("secret").decode(&token, now).unwrap();
        assert_eq!(claims.sub, "a@b.co");
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
    }

    #[test]
    fn test_expired_token() {
        let issued = Utc::now() - Duration::hours(48);
        let token = codec("secret").issue("a@b.co", issued).unwrap();
        assert_eq!(
            codec("secret").decode(&token, Utc::now()),
            Err(AuthRejection::Expired)
        );
    }

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let now = Utc::now();
        let token = codec("secret").issue("a@b.co", now).unwrap();
        let at_exp = now + Duration::hours(24);
        assert_eq!(
            codec("secret").decode(&token, at_exp),
            Err(AuthRejection::Expired)
        );
    }

    #[test]
    fn test_wrong_secret_is_invalid_signature() {
        let now = Utc::now();
        let token = codec("secret").issue("a@b.co", now).unwrap();
        assert_eq!(
            codec("other").decode(&token, now),
            Err(AuthRejection::InvalidSignature)
        );
    }

    #[test]
    fn test_signature_checked_before_expiry() {
        let issued = Utc::now() - Duration::hours(48);
        let token = codec("secret").issue("a@b.co", issued).unwrap();
        assert_eq!(
            codec("other").decode(&token, Utc::now()),
            Err(AuthRejection::InvalidSignature)
        );
    }

    #[test]
    fn test_issue_with_overflowing_ttl_is_error() {
        let codec = TokenCodec::new("secret", Duration::hours(3_000_000_000));
        assert!(matches!(
            codec.issue("a@b.co", Utc::now()),
            Err(ClubChatError::Config(_))
        ));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let now = Utc::now();
        assert_eq!(codec("s").decode("abc", now), Err(AuthRejection::Malformed));
        assert_eq!(
            codec("s").decode("not.a.token", now),
            Err(AuthRejection::Malformed)
        );
    }
}
