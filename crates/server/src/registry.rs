//! SQLite-backed session registry.
//!
//! One `sessions` table holding title and recency metadata. Message content
//! lives with the chat agents, never here. All access goes through
//! `spawn_blocking` since rusqlite is synchronous.

use std::path::{Path, PathBuf};

use cognicore_protocol::{now_millis, Session};
use rusqlite::{params, Connection};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id          TEXT PRIMARY KEY,
    title       TEXT NOT NULL,
    created_at  INTEGER NOT NULL,
    last_active INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sessions_last_active ON sessions(last_active DESC);
";

#[derive(Debug, Clone)]
pub struct SessionStore {
    db_path: PathBuf,
}

fn connect(db_path: &Path) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    Ok(conn)
}

impl SessionStore {
    /// Open (creating if needed) the registry database at `db_path`.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let db_path = db_path.into();
        let conn = connect(&db_path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { db_path })
    }

    async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = connect(&db_path)?;
            op(&conn).map_err(StoreError::from)
        })
        .await?
    }

    /// All sessions, most recently active first.
    pub async fn list(&self) -> Result<Vec<Session>, StoreError> {
        self.run(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, last_active FROM sessions
                 ORDER BY last_active DESC, rowid DESC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(Session {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    last_active: row.get(2)?,
                })
            })?;
            rows.collect()
        })
        .await
    }

    #[cfg(test)]
    pub async fn get(&self, id: &str) -> Result<Option<Session>, StoreError> {
        use rusqlite::OptionalExtension;

        let id = id.to_string();
        self.run(move |conn| {
            conn.query_row(
                "SELECT id, title, last_active FROM sessions WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Session {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        last_active: row.get(2)?,
                    })
                },
            )
            .optional()
        })
        .await
    }

    /// Register a session. Re-registering an existing id replaces its title
    /// and marks it active.
    pub async fn create(&self, id: &str, title: &str) -> Result<Session, StoreError> {
        let session = Session {
            id: id.to_string(),
            title: title.to_string(),
            last_active: now_millis(),
        };
        let row = session.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO sessions (id, title, created_at, last_active)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    last_active = excluded.last_active",
                params![row.id, row.title, row.last_active],
            )
            .map(|_| ())
        })
        .await?;
        Ok(session)
    }

    /// Returns `false` when no session has this id.
    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        self.run(move |conn| {
            conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])
                .map(|n| n > 0)
        })
        .await
    }

    /// Returns `false` when no session has this id.
    pub async fn update_title(&self, id: &str, title: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        let title = title.to_string();
        self.run(move |conn| {
            conn.execute(
                "UPDATE sessions SET title = ?1 WHERE id = ?2",
                params![title, id],
            )
            .map(|n| n > 0)
        })
        .await
    }

    /// Mark a session as just used.
    pub async fn touch(&self, id: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        let now = now_millis();
        self.run(move |conn| {
            conn.execute(
                "UPDATE sessions SET last_active = ?1 WHERE id = ?2",
                params![now, id],
            )
            .map(|n| n > 0)
        })
        .await
    }

    pub async fn count(&self) -> Result<u64, StoreError> {
        self.run(|conn| {
            conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get::<_, i64>(0))
                .map(|n| n.max(0) as u64)
        })
        .await
    }

    /// Remove every session, returning how many were removed.
    pub async fn clear(&self) -> Result<u64, StoreError> {
        self.run(|conn| conn.execute("DELETE FROM sessions", []).map(|n| n as u64))
            .await
    }
}
