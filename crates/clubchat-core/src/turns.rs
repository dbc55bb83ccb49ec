use chrono::{DateTime, Duration, Utc};

use crate::error::Result;
use crate::identity::Identity;
use crate::model::{Role, Turn};
use crate::storage::StorageBackend;

/// Number of prior turns replayed into a prompt.
pub const HISTORY_WINDOW: usize = 8;

/// Gap in milliseconds between a user turn and the assistant turn answering it.
pub const ASSISTANT_TURN_OFFSET_MS: i64 = 1;

/// Append one turn. Identical content is never deduplicated.
pub async fn append(
    storage: &impl StorageBackend,
    identity: &Identity,
    session_id: &str,
    role: Role,
    text: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    let turn = Turn::new(identity.as_str(), session_id, role, text, at);
    storage.append_turn(&turn).await
}

/// The most recent `limit` turns, oldest first. Empty for a new session.
pub async fn recent_window(
    storage: &impl StorageBackend,
    identity: &Identity,
    session_id: &str,
    limit: usize,
) -> Result<Vec<Turn>> {
    let mut turns = storage
        .latest_turns(identity.as_str(), session_id, limit)
        .await?;
    turns.reverse();
    Ok(turns)
}

/// Timestamp for the next user turn: `now`, pushed past the newest turn
/// already in the log when the clock has not moved on.
pub fn next_user_turn_at(history: &[Turn], now: DateTime<Utc>) -> DateTime<Utc> {
    match history.last() {
        Some(last) if last.created_at >= now => last.created_at + Duration::microseconds(1),
        _ => now,
    }
}

/// Timestamp for the assistant turn paired with a user turn at `user_at`.
pub fn assistant_turn_at(user_at: DateTime<Utc>) -> DateTime<Utc> {
    user_at + Duration::milliseconds(ASSISTANT_TURN_OFFSET_MS)
}
