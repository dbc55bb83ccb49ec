use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session id used when the caller does not name one.
pub const DEFAULT_SESSION_ID: &str = "default";

/// Longest title derived from a user message.
pub const MAX_SESSION_TITLE_CHARS: usize = 60;

/// One conversation thread owned by an identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub identity: String,
    pub session_id: String,
    /// Empty until the first user message names it.
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl Session {
    pub fn new(identity: impl Into<String>, session_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            identity: identity.into(),
            session_id: session_id.into(),
            title: String::new(),
            created_at: at,
            last_active_at: at,
        }
    }
}

/// Derive a session title from the first message of a conversation.
pub fn title_from_message(message: &str) -> String {
    let trimmed = message.trim();
    if trimmed.chars().count() <= MAX_SESSION_TITLE_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(MAX_SESSION_TITLE_CHARS).collect();
    format!("{}...", cut.trim_end())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Label used when rendering a transcript line.
    pub fn title_case(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(format!("unknown turn role: {s}")),
        }
    }
}

/// One immutable message in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub identity: String,
    pub session_id: String,
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(
        identity: impl Into<String>,
        session_id: impl Into<String>,
        role: Role,
        text: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            identity: identity.into(),
            session_id: session_id.into(),
            role,
            text: text.into(),
            created_at,
        }
    }
}
