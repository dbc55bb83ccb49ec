use thiserror::Error;

/// Why a bearer credential was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    Missing,
    Malformed,
    Expired,
    InvalidSignature,
    PrincipalNotFound,
}

impl AuthRejection {
    /// Message returned to the caller of a guarded route.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Missing => "Authorization token is missing",
            Self::Malformed => "Authorization token is malformed",
            Self::Expired => "Authorization token has expired",
            Self::InvalidSignature => "Authorization token signature is invalid",
            Self::PrincipalNotFound => "User for this token no longer exists",
        }
    }
}

impl std::fmt::Display for AuthRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Failure of the language model boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// Upstream unreachable or not configured.
    #[error("model unavailable: {0}")]
    Unavailable(String),

    /// Upstream answered, but not with usable text.
    #[error("generation failed: {0}")]
    GenerationFailed(String),
}

#[derive(Debug, Error)]
pub enum ClubChatError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Authentication failed: {0}")]
    Auth(AuthRejection),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl From<AuthRejection> for ClubChatError {
    fn from(rejection: AuthRejection) -> Self {
        Self::Auth(rejection)
    }
}

pub type Result<T> = std::result::Result<T, ClubChatError>;
