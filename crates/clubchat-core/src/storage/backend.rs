use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::*;

/// Abstract storage backend. SQLite is the shipped implementation; the
/// chat pipeline only ever talks to this trait.
pub trait StorageBackend: Send + Sync {
    // -- Club directory --

    /// Clubs ordered by name, optionally capped at `limit`.
    fn list_clubs(
        &self,
        limit: Option<usize>,
    ) -> impl std::future::Future<Output = Result<Vec<Club>>> + Send;

    fn count_clubs(&self) -> impl std::future::Future<Output = Result<usize>> + Send;

    /// Case-insensitive lookup by name.
    fn get_club_by_name(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<Club>> + Send;

    fn create_club(&self, club: &Club) -> impl std::future::Future<Output = Result<()>> + Send;

    fn update_club(
        &self,
        name: &str,
        input: &UpdateClubInput,
    ) -> impl std::future::Future<Output = Result<Club>> + Send;

    fn delete_club(&self, name: &str) -> impl std::future::Future<Output = Result<()>> + Send;

    // -- Principals --

    fn create_principal(
        &self,
        principal: &Principal,
        password_hash: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn get_principal(
        &self,
        email: &str,
    ) -> impl std::future::Future<Output = Result<Principal>> + Send;

    fn get_password_hash(
        &self,
        email: &str,
    ) -> impl std::future::Future<Output = Result<String>> + Send;

    /// Add a club to a principal's favorites. Returns the updated list.
    fn add_favorite(
        &self,
        email: &str,
        club_id: uuid::Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<String>>> + Send;

    fn remove_favorite(
        &self,
        email: &str,
        club_id: uuid::Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<String>>> + Send;

    // -- Sessions --

    /// Insert the session unless a row for (identity, session_id) exists.
    /// Returns `true` when a row was created.
    fn create_session_if_absent(
        &self,
        session: &Session,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Upsert `last_active_at` (never moving it backwards). `title` only
    /// fills a session that has none yet.
    fn touch_session(
        &self,
        identity: &str,
        session_id: &str,
        at: DateTime<Utc>,
        title: Option<&str>,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn get_session(
        &self,
        identity: &str,
        session_id: &str,
    ) -> impl std::future::Future<Output = Result<Session>> + Send;

    // -- Turns --

    fn append_turn(&self, turn: &Turn) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Most recent turns first, at most `limit`.
    fn latest_turns(
        &self,
        identity: &str,
        session_id: &str,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<Turn>>> + Send;
}
