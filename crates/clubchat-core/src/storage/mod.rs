mod backend;
mod sqlite;

pub use backend::StorageBackend;
pub use sqlite::SqliteStorage;

use std::path::PathBuf;

use crate::config::ClubChatConfig;
use crate::error::{ClubChatError, Result};

/// Open the configured store.
pub fn create_backend(config: &ClubChatConfig) -> Result<SqliteStorage> {
    let path = match &config.storage.path {
        Some(p) if !p.is_empty() => PathBuf::from(p),
        _ => default_sqlite_path()?,
    };
    tracing::debug!(path = %path.display(), "opening club store");
    SqliteStorage::open(&path)
}

/// Default SQLite path: `~/.config/clubchat/clubchat.db`
fn default_sqlite_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|p| p.join("clubchat").join("clubchat.db"))
        .ok_or_else(|| ClubChatError::Config("cannot determine config directory".to_string()))
}
