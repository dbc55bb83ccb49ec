use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::backend::StorageBackend;
use crate::error::{ClubChatError, Result};
use crate::model::*;

/// SQLite-backed store for the club directory, principals, sessions and turns.
///
/// Uses a single `Connection` behind `Arc<Mutex<>>` so it can be shared
/// across async tasks.  All blocking SQLite calls go through
/// [`with_conn`](Self::with_conn) which runs them on the Tokio blocking
/// thread-pool.
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl SqliteStorage {
    /// Open (or create) a file-backed SQLite database at `path`.
    ///
    /// Sets WAL journal mode and enables foreign keys, then creates all
    /// tables and indexes if they don't already exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ClubChatError::Storage(format!("failed to create database directory: {e}"))
                })?;
            }
        }
        let conn = Connection::open(&path)
            .map_err(|e| ClubChatError::Storage(format!("failed to open SQLite database: {e}")))?;

        Self::configure_and_init(conn, path)
    }

    /// Open an in-memory SQLite database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            ClubChatError::Storage(format!("failed to open in-memory SQLite database: {e}"))
        })?;

        Self::configure_and_init(conn, PathBuf::from(":memory:"))
    }

    /// Return the path this database was opened with (`:memory:` for in-memory).
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ── helpers ────────────────────────────────────────────────────────

    fn configure_and_init(conn: Connection, path: PathBuf) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(|e| ClubChatError::Storage(format!("failed to set WAL mode: {e}")))?;

        // Favorites cascade away with their club or principal.
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| ClubChatError::Storage(format!("failed to enable foreign keys: {e}")))?;

        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        };

        storage.create_tables()?;
        Ok(storage)
    }

    /// Create all tables and indexes (idempotent).
    fn create_tables(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ClubChatError::Storage(format!("failed to acquire database lock: {e}")))?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS clubs (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                name_key TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL DEFAULT '',
                majors TEXT NOT NULL DEFAULT '',
                membership TEXT,
                extra TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS principals (
                email TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS favorites (
                email TEXT NOT NULL REFERENCES principals(email) ON DELETE CASCADE,
                club_id TEXT NOT NULL REFERENCES clubs(id) ON DELETE CASCADE,
                added_at TEXT NOT NULL,
                PRIMARY KEY (email, club_id)
            );

            CREATE TABLE IF NOT EXISTS sessions (
                identity TEXT NOT NULL,
                session_id TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                last_active_at TEXT NOT NULL,
                PRIMARY KEY (identity, session_id)
            );

            CREATE TABLE IF NOT EXISTS turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                identity TEXT NOT NULL,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                text TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_turns_recent
                ON turns(identity, session_id, created_at DESC, id DESC);
            CREATE INDEX IF NOT EXISTS idx_sessions_last_active
                ON sessions(identity, last_active_at DESC);
            ",
        )
        .map_err(|e| ClubChatError::Storage(format!("failed to create tables: {e}")))?;

        Ok(())
    }

    /// Run a blocking closure against the SQLite connection on the Tokio
    /// blocking thread-pool.
    pub(crate) async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|e| {
                ClubChatError::Storage(format!("failed to acquire database lock: {e}"))
            })?;
            f(&conn)
        })
        .await
        .map_err(|e| ClubChatError::Storage(format!("task join error: {e}")))?
    }
}

// ── row mapping ────────────────────────────────────────────────────────

/// Fixed-width UTC timestamps so text comparison matches time order.
fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn db_err(context: &'static str) -> impl Fn(rusqlite::Error) -> ClubChatError {
    move |e| ClubChatError::Storage(format!("{context}: {e}"))
}

const CLUB_COLUMNS: &str =
    "id, name, description, majors, membership, extra, created_at, updated_at";

fn row_to_club(row: &Row<'_>) -> rusqlite::Result<Club> {
    let id: String = row.get(0)?;
    let id = Uuid::parse_str(&id)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;
    let extra: String = row.get(5)?;
    let extra = serde_json::from_str(&extra)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;
    Ok(Club {
        id,
        name: row.get(1)?,
        description: row.get(2)?,
        majors: row.get(3)?,
        membership: row.get(4)?,
        extra,
        created_at: parse_ts(6, &created_at)?,
        updated_at: parse_ts(7, &updated_at)?,
    })
}

fn row_to_turn(row: &Row<'_>) -> rusqlite::Result<Turn> {
    let role: String = row.get(2)?;
    let role: Role = role.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into())
    })?;
    let created_at: String = row.get(4)?;
    Ok(Turn {
        identity: row.get(0)?,
        session_id: row.get(1)?,
        role,
        text: row.get(3)?,
        created_at: parse_ts(4, &created_at)?,
    })
}

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<Session> {
    let created_at: String = row.get(3)?;
    let last_active_at: String = row.get(4)?;
    Ok(Session {
        identity: row.get(0)?,
        session_id: row.get(1)?,
        title: row.get(2)?,
        created_at: parse_ts(3, &created_at)?,
        last_active_at: parse_ts(4, &last_active_at)?,
    })
}

/// Unicode case fold used for unique, case-insensitive club names.
fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn select_club(conn: &Connection, name: &str) -> Result<Option<Club>> {
    conn.query_row(
        &format!("SELECT {CLUB_COLUMNS} FROM clubs WHERE name_key = ?1"),
        params![name_key(name)],
        row_to_club,
    )
    .optional()
    .map_err(db_err("failed to read club"))
}

fn select_favorites(conn: &Connection, email: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(
            "SELECT c.name FROM favorites f JOIN clubs c ON c.id = f.club_id
             WHERE f.email = ?1 ORDER BY f.added_at, c.name",
        )
        .map_err(db_err("failed to prepare favorites query"))?;
    let names = stmt
        .query_map(params![email], |row| row.get(0))
        .map_err(db_err("failed to query favorites"))?
        .collect::<rusqlite::Result<Vec<String>>>()
        .map_err(db_err("failed to read favorites"))?;
    Ok(names)
}

fn extra_json(club: &Club) -> Result<String> {
    Ok(serde_json::to_string(&club.extra)?)
}

impl StorageBackend for SqliteStorage {
    async fn list_clubs(&self, limit: Option<usize>) -> Result<Vec<Club>> {
        // LIMIT -1 means "no limit" in SQLite.
        let limit = limit.map(|n| n as i64).unwrap_or(-1);
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {CLUB_COLUMNS} FROM clubs ORDER BY name_key LIMIT ?1"
                ))
                .map_err(db_err("failed to prepare club listing"))?;
            let clubs = stmt
                .query_map(params![limit], row_to_club)
                .map_err(db_err("failed to list clubs"))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_err("failed to read clubs"))?;
            Ok(clubs)
        })
        .await
    }

    async fn count_clubs(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let n: i64 = conn
                .query_row("SELECT COUNT(*) FROM clubs", [], |row| row.get(0))
                .map_err(db_err("failed to count clubs"))?;
            Ok(n as usize)
        })
        .await
    }

    async fn get_club_by_name(&self, name: &str) -> Result<Club> {
        let name = name.trim().to_string();
        self.with_conn(move |conn| {
            select_club(conn, &name)?
                .ok_or_else(|| ClubChatError::NotFound(format!("club '{name}'")))
        })
        .await
    }

    async fn create_club(&self, club: &Club) -> Result<()> {
        validate_club_name(&club.name)?;
        let club = club.clone();
        self.with_conn(move |conn| {
            let extra = extra_json(&club)?;
            conn.execute(
                "INSERT INTO clubs (id, name, name_key, description, majors, membership, extra, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    club.id.to_string(),
                    club.name,
                    name_key(&club.name),
                    club.description,
                    club.majors,
                    club.membership,
                    extra,
                    ts(&club.created_at),
                    ts(&club.updated_at),
                ],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    ClubChatError::AlreadyExists(format!("club '{}'", club.name))
                } else {
                    ClubChatError::Storage(format!("failed to insert club: {e}"))
                }
            })?;
            Ok(())
        })
        .await
    }

    async fn update_club(&self, name: &str, input: &UpdateClubInput) -> Result<Club> {
        input.validate()?;
        let name = name.trim().to_string();
        let input = input.clone();
        self.with_conn(move |conn| {
            let mut club = select_club(conn, &name)?
                .ok_or_else(|| ClubChatError::NotFound(format!("club '{name}'")))?;
            club.apply(&input);
            let extra = extra_json(&club)?;
            conn.execute(
                "UPDATE clubs SET name = ?1, name_key = ?2, description = ?3, majors = ?4,
                        membership = ?5, extra = ?6, updated_at = ?7
                 WHERE id = ?8",
                params![
                    club.name,
                    name_key(&club.name),
                    club.description,
                    club.majors,
                    club.membership,
                    extra,
                    ts(&club.updated_at),
                    club.id.to_string(),
                ],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    ClubChatError::AlreadyExists(format!("club '{}'", club.name))
                } else {
                    ClubChatError::Storage(format!("failed to update club: {e}"))
                }
            })?;
            Ok(club)
        })
        .await
    }

    async fn delete_club(&self, name: &str) -> Result<()> {
        let name = name.trim().to_string();
        self.with_conn(move |conn| {
            let n = conn
                .execute("DELETE FROM clubs WHERE name_key = ?1", params![name_key(&name)])
                .map_err(db_err("failed to delete club"))?;
            if n == 0 {
                return Err(ClubChatError::NotFound(format!("club '{name}'")));
            }
            Ok(())
        })
        .await
    }

    async fn create_principal(&self, principal: &Principal, password_hash: &str) -> Result<()> {
        let principal = principal.clone();
        let password_hash = password_hash.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO principals (email, name, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    principal.email,
                    principal.name,
                    password_hash,
                    ts(&principal.created_at)
                ],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    ClubChatError::AlreadyExists("user already exists".into())
                } else {
                    ClubChatError::Storage(format!("failed to insert principal: {e}"))
                }
            })?;
            Ok(())
        })
        .await
    }

    async fn get_principal(&self, email: &str) -> Result<Principal> {
        let email = email.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT email, name, created_at FROM principals WHERE email = ?1",
                    params![email],
                    |row| {
                        let created_at: String = row.get(2)?;
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            parse_ts(2, &created_at)?,
                        ))
                    },
                )
                .optional()
                .map_err(db_err("failed to read principal"))?;
            let (email, name, created_at) =
                row.ok_or_else(|| ClubChatError::NotFound(format!("user '{email}'")))?;
            let favorites = select_favorites(conn, &email)?;
            Ok(Principal {
                email,
                name,
                favorites,
                created_at,
            })
        })
        .await
    }

    async fn get_password_hash(&self, email: &str) -> Result<String> {
        let email = email.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT password_hash FROM principals WHERE email = ?1",
                params![email],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err("failed to read credentials"))?
            .ok_or_else(|| ClubChatError::NotFound(format!("user '{email}'")))
        })
        .await
    }

    async fn add_favorite(&self, email: &str, club_id: Uuid) -> Result<Vec<String>> {
        let email = email.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO favorites (email, club_id, added_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(email, club_id) DO NOTHING",
                params![email, club_id.to_string(), ts(&Utc::now())],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    ClubChatError::NotFound("user or club".into())
                } else {
                    ClubChatError::Storage(format!("failed to add favorite: {e}"))
                }
            })?;
            select_favorites(conn, &email)
        })
        .await
    }

    async fn remove_favorite(&self, email: &str, club_id: Uuid) -> Result<Vec<String>> {
        let email = email.to_string();
        self.with_conn(move |conn| {
            let n = conn
                .execute(
                    "DELETE FROM favorites WHERE email = ?1 AND club_id = ?2",
                    params![email, club_id.to_string()],
                )
                .map_err(db_err("failed to remove favorite"))?;
            if n == 0 {
                return Err(ClubChatError::NotFound("club is not a favorite".into()));
            }
            select_favorites(conn, &email)
        })
        .await
    }

    async fn create_session_if_absent(&self, session: &Session) -> Result<bool> {
        let session = session.clone();
        self.with_conn(move |conn| {
            let n = conn
                .execute(
                    "INSERT INTO sessions (identity, session_id, title, created_at, last_active_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(identity, session_id) DO NOTHING",
                    params![
                        session.identity,
                        session.session_id,
                        session.title,
                        ts(&session.created_at),
                        ts(&session.last_active_at),
                    ],
                )
                .map_err(db_err("failed to create session"))?;
            Ok(n == 1)
        })
        .await
    }

    async fn touch_session(
        &self,
        identity: &str,
        session_id: &str,
        at: DateTime<Utc>,
        title: Option<&str>,
    ) -> Result<()> {
        let identity = identity.to_string();
        let session_id = session_id.to_string();
        let title = title.unwrap_or_default().to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO sessions (identity, session_id, title, created_at, last_active_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(identity, session_id) DO UPDATE SET
                     last_active_at = MAX(sessions.last_active_at, excluded.last_active_at),
                     title = CASE WHEN sessions.title = '' THEN excluded.title
                                  ELSE sessions.title END",
                params![identity, session_id, title, ts(&at)],
            )
            .map_err(db_err("failed to touch session"))?;
            Ok(())
        })
        .await
    }

    async fn get_session(&self, identity: &str, session_id: &str) -> Result<Session> {
        let identity = identity.to_string();
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT identity, session_id, title, created_at, last_active_at
                 FROM sessions WHERE identity = ?1 AND session_id = ?2",
                params![identity, session_id],
                row_to_session,
            )
            .optional()
            .map_err(db_err("failed to read session"))?
            .ok_or_else(|| ClubChatError::NotFound(format!("session '{session_id}'")))
        })
        .await
    }

    async fn append_turn(&self, turn: &Turn) -> Result<()> {
        let turn = turn.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO turns (identity, session_id, role, text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    turn.identity,
                    turn.session_id,
                    turn.role.to_string(),
                    turn.text,
                    ts(&turn.created_at),
                ],
            )
            .map_err(db_err("failed to append turn"))?;
            Ok(())
        })
        .await
    }

    async fn latest_turns(
        &self,
        identity: &str,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<Turn>> {
        let identity = identity.to_string();
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT identity, session_id, role, text, created_at FROM turns
                     WHERE identity = ?1 AND session_id = ?2
                     ORDER BY created_at DESC, id DESC
                     LIMIT ?3",
                )
                .map_err(db_err("failed to prepare turn query"))?;
            let turns = stmt
                .query_map(params![identity, session_id, limit as i64], row_to_turn)
                .map_err(db_err("failed to query turns"))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_err("failed to read turns"))?;
            Ok(turns)
        })
        .await
    }
}
