use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::identity::Identity;
use crate::model::{title_from_message, Session, DEFAULT_SESSION_ID};
use crate::storage::StorageBackend;

/// Pick the session for this exchange.
///
/// A caller-supplied id is used as-is and materialized lazily by
/// [`touch`]. Without one, the sentinel session is created if absent.
pub async fn resolve_or_create(
    storage: &impl StorageBackend,
    identity: &Identity,
    requested: Option<&str>,
    now: DateTime<Utc>,
) -> Result<String> {
    if let Some(id) = requested.filter(|id| !id.trim().is_empty()) {
        return Ok(id.to_string());
    }

    let session = Session::new(identity.as_str(), DEFAULT_SESSION_ID, now);
    if storage.create_session_if_absent(&session).await? {
        tracing::debug!(identity = %identity, "created default session");
    }
    Ok(DEFAULT_SESSION_ID.to_string())
}

/// Record activity on a session, creating it when missing. The first
/// user message names an untitled session.
pub async fn touch(
    storage: &impl StorageBackend,
    identity: &Identity,
    session_id: &str,
    at: DateTime<Utc>,
    first_message: Option<&str>,
) -> Result<()> {
    let title = first_message.map(title_from_message);
    storage
        .touch_session(identity.as_str(), session_id, at, title.as_deref())
        .await
}
