//! Database connection management.

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

/// Database wrapper for workdesk.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get the default database path (`<data dir>/workdesk/workdesk.db`).
    pub fn default_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .context("Could not determine user data directory")?
            .join("workdesk");
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create directory: {}", data_dir.display()))?;
        Ok(data_dir.join("workdesk.db"))
    }

    /// Open or create the database at a specific path.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;

        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Open an in-memory database (tests).
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
        };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize the database schema.
    fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(
            r"
            PRAGMA journal_mode = WAL;
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                name TEXT,
                desktop_key TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending_name',
                created_at TEXT NOT NULL,
                ended_at TEXT,
                last_snapshot_at TEXT
            );

            CREATE TABLE IF NOT EXISTS snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                captured_at TEXT NOT NULL,
                window_count INTEGER NOT NULL DEFAULT 0,
                tab_count INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS window_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                snapshot_id INTEGER NOT NULL REFERENCES snapshots(id) ON DELETE CASCADE,
                process_name TEXT NOT NULL,
                executable_path TEXT NOT NULL,
                window_title TEXT NOT NULL,
                window_class TEXT NOT NULL DEFAULT '',
                command_line_hint TEXT,
                is_minimized INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS tab_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                snapshot_id INTEGER NOT NULL REFERENCES snapshots(id) ON DELETE CASCADE,
                url TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                favicon_url TEXT,
                pinned INTEGER NOT NULL DEFAULT 0,
                window_group INTEGER NOT NULL DEFAULT 0
            );

            -- At most one non-ended session per desktop key.
            CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_open_desktop
                ON sessions(desktop_key) WHERE status != 'ended';
            CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);
            CREATE INDEX IF NOT EXISTS idx_snapshots_session_id ON snapshots(session_id);
            CREATE INDEX IF NOT EXISTS idx_window_entries_snapshot_id ON window_entries(snapshot_id);
            CREATE INDEX IF NOT EXISTS idx_tab_entries_snapshot_id ON tab_entries(snapshot_id);
            ",
        )?;
        Ok(())
    }

    /// Get a reference to the connection.
    pub const fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Get a mutable reference to the connection (transactions).
    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SessionQueries;
    use crate::models::Session;

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workdesk.db");

        let session = Session::new("D1".to_string());
        {
            let db = Database::open_at(&path).unwrap();
            SessionQueries::insert(db.conn(), &session).unwrap();
        }

        let db = Database::open_at(&path).unwrap();
        let stored = SessionQueries::get_by_id(db.conn(), &session.id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.desktop_key, "D1");
    }

    #[test]
    fn concurrent_reader_sees_committed_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workdesk.db");

        let writer = Database::open_at(&path).unwrap();
        let reader = Database::open_at(&path).unwrap();

        let session = Session::new("D1".to_string());
        SessionQueries::insert(writer.conn(), &session).unwrap();

        let seen = SessionQueries::get_by_id(reader.conn(), &session.id)
            .unwrap()
            .unwrap();
        assert_eq!(seen.id, session.id);
    }

    #[test]
    fn one_open_session_per_desktop_is_enforced() {
        let db = Database::open_in_memory().unwrap();

        SessionQueries::insert(db.conn(), &Session::new("D1".to_string())).unwrap();
        assert!(SessionQueries::insert(db.conn(), &Session::new("D1".to_string())).is_err());

        // An ended session frees the key for a fresh row.
        let old = Session::new("D2".to_string());
        SessionQueries::insert(db.conn(), &old).unwrap();
        SessionQueries::end_session(db.conn(), &old.id, chrono::Utc::now()).unwrap();
        assert!(SessionQueries::insert(db.conn(), &Session::new("D2".to_string())).is_ok());
    }
}
