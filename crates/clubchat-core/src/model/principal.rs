use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ClubChatError, Result};

pub const MIN_PASSWORD_LENGTH: usize = 6;

/// An authenticated user. The credential hash never lives on this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub favorites: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Short form returned by registration and login.
#[derive(Debug, Clone, Serialize)]
pub struct PrincipalSummary {
    pub email: String,
    pub name: String,
}

impl From<&Principal> for PrincipalSummary {
    fn from(p: &Principal) -> Self {
        Self {
            email: p.email.clone(),
            name: p.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterInput {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginInput {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is a valid regex")
    })
}

/// Lowercase and trim an email so lookups are consistent.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_register_input(input: &RegisterInput) -> Result<()> {
    let email = normalize_email(&input.email);
    if email.is_empty() || input.password.is_empty() || input.name.trim().is_empty() {
        return Err(ClubChatError::InvalidInput(
            "email, password and name are required".into(),
        ));
    }
    if !email_pattern().is_match(&email) {
        return Err(ClubChatError::InvalidInput(format!(
            "'{email}' is not a valid email address"
        )));
    }
    if input.password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ClubChatError::InvalidInput(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}
