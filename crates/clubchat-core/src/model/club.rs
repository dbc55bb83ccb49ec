use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ClubChatError, Result};

pub const MAX_CLUB_NAME_LENGTH: usize = 200;
pub const MAX_DESCRIPTION_LENGTH: usize = 10_000;

/// Validate a club name before it is stored.
pub fn validate_club_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ClubChatError::InvalidInput("club name cannot be empty".into()));
    }
    if trimmed.len() > MAX_CLUB_NAME_LENGTH {
        return Err(ClubChatError::InvalidInput(format!(
            "club name exceeds maximum length of {MAX_CLUB_NAME_LENGTH} characters"
        )));
    }
    Ok(())
}

/// One entry of the student club directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Club {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub majors: String,
    #[serde(default)]
    pub membership: Option<String>,
    /// Columns the directory carries beyond the well-known fields.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Club {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            name: name.into().trim().to_string(),
            description: String::new(),
            majors: String::new(),
            membership: None,
            extra: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_majors(mut self, majors: impl Into<String>) -> Self {
        self.majors = majors.into();
        self
    }

    pub fn with_membership(mut self, membership: impl Into<String>) -> Self {
        self.membership = Some(membership.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Look a field up by name, treating the record as a flat mapping.
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "name" => Some(self.name.as_str()),
            "description" => Some(self.description.as_str()),
            "majors" => Some(self.majors.as_str()),
            "membership" => self.membership.as_deref(),
            other => self.extra.get(other).map(String::as_str),
        }
    }

    /// Apply a partial update, bumping `updated_at`.
    pub fn apply(&mut self, input: &UpdateClubInput) {
        if let Some(ref name) = input.name {
            self.name = name.trim().to_string();
        }
        if let Some(ref description) = input.description {
            self.description = description.clone();
        }
        if let Some(ref majors) = input.majors {
            self.majors = majors.clone();
        }
        if let Some(ref membership) = input.membership {
            self.membership = Some(membership.clone());
        }
        if let Some(ref extra) = input.extra {
            self.extra.extend(extra.clone());
        }
        self.updated_at = Utc::now();
    }
}

/// Fields accepted when creating a club through the API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateClubInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub majors: Option<String>,
    #[serde(default)]
    pub membership: Option<String>,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl CreateClubInput {
    pub fn into_club(self) -> Result<Club> {
        validate_club_name(&self.name)?;
        let mut club = Club::new(self.name)
            .with_description(self.description.unwrap_or_default())
            .with_majors(self.majors.unwrap_or_default());
        club.membership = self.membership;
        club.extra = self.extra;
        Ok(club)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateClubInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub majors: Option<String>,
    pub membership: Option<String>,
    pub extra: Option<BTreeMap<String, String>>,
}

impl UpdateClubInput {
    pub fn validate(&self) -> Result<()> {
        if let Some(ref name) = self.name {
            validate_club_name(name)?;
        }
        if let Some(ref description) = self.description {
            if description.len() > MAX_DESCRIPTION_LENGTH {
                return Err(ClubChatError::InvalidInput(format!(
                    "description exceeds maximum length of {MAX_DESCRIPTION_LENGTH} characters"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_club_trims_name() {
        let club = Club::new("  AI Society ");
        assert_eq!(club.name, "AI Society");
        assert_eq!(club.created_at, club.updated_at);
    }

    #[test]
    fn test_field_lookup_covers_extra_columns() {
        let club = Club::new("Robotics Club")
            .with_description("We build robots")
            .with_majors("ME, ECE")
            .with_extra("meeting_day", "Tuesday");
        assert_eq!(club.field("name"), Some("Robotics Club"));
        assert_eq!(club.field("majors"), Some("ME, ECE"));
        assert_eq!(club.field("meeting_day"), Some("Tuesday"));
        assert_eq!(club.field("membership"), None);
        assert_eq!(club.field("nope"), None);
    }

    #[test]
    fn test_create_input_rejects_blank_name() {
        let input = CreateClubInput {
            name: "   ".into(),
            ..Default::default()
        };
        assert!(matches!(
            input.into_club(),
            Err(ClubChatError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_apply_partial_update() {
        let mut club = Club::new("Chess Club").with_description("old");
        let before = club.updated_at;
        club.apply(&UpdateClubInput {
            description: Some("new".into()),
            ..Default::default()
        });
        assert_eq!(club.name, "Chess Club");
        assert_eq!(club.description, "new");
        assert!(club.updated_at >= before);
    }

    #[test]
    fn test_update_validation() {
        let input = UpdateClubInput {
            name: Some(String::new()),
            ..Default::default()
        };
        assert!(input.validate().is_err());
        assert!(UpdateClubInput::default().validate().is_ok());
    }
}
