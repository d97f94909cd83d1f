//! Database query implementations.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection};

use crate::models::{
    Session, SessionStatus, Snapshot, SnapshotBundle, TabSnapshotEntry, WindowSnapshotEntry,
};

/// Parse a timestamp string flexibly from various formats.
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    // Try RFC3339 first
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Try common SQLite datetime format: "YYYY-MM-DD HH:MM:SS"
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }

    // Try with fractional seconds: "YYYY-MM-DD HH:MM:SS.SSS"
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }

    anyhow::bail!("Invalid timestamp format: {s}")
}

/// Queries for the sessions table.
pub struct SessionQueries;

impl SessionQueries {
    /// Insert a new session.
    pub fn insert(conn: &Connection, session: &Session) -> Result<()> {
        conn.execute(
            r"INSERT INTO sessions (id, name, desktop_key, status, created_at, ended_at, last_snapshot_at)
              VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                session.id,
                session.name,
                session.desktop_key,
                session.status.as_str(),
                session.created_at.to_rfc3339(),
                session.ended_at.map(|dt| dt.to_rfc3339()),
                session.last_snapshot_at.map(|dt| dt.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Get a session by ID.
    pub fn get_by_id(conn: &Connection, id: &str) -> Result<Option<Session>> {
        let mut stmt = conn.prepare(
            r"SELECT id, name, desktop_key, status, created_at, ended_at, last_snapshot_at
              FROM sessions WHERE id = ?1",
        )?;

        let result = stmt.query_row(params![id], |row| Ok(Self::row_to_session(row)));

        match result {
            Ok(session) => Ok(Some(session?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// List all sessions, newest first.
    pub fn list(conn: &Connection) -> Result<Vec<Session>> {
        let mut stmt = conn.prepare(
            r"SELECT id, name, desktop_key, status, created_at, ended_at, last_snapshot_at
              FROM sessions ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], |row| Ok(Self::row_to_session(row)))?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row??);
        }
        Ok(sessions)
    }

    /// List sessions that are not ended (pending or active).
    pub fn list_open(conn: &Connection) -> Result<Vec<Session>> {
        let mut stmt = conn.prepare(
            r"SELECT id, name, desktop_key, status, created_at, ended_at, last_snapshot_at
              FROM sessions WHERE status != 'ended' ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map([], |row| Ok(Self::row_to_session(row)))?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row??);
        }
        Ok(sessions)
    }

    /// Confirm a session's name, moving it from pending to active.
    pub fn confirm_name(conn: &Connection, id: &str, name: &str) -> Result<()> {
        conn.execute(
            r"UPDATE sessions SET name = ?1, status = 'active'
              WHERE id = ?2 AND status = 'pending_name'",
            params![name, id],
        )?;
        Ok(())
    }

    /// Mark a session as ended.
    pub fn end_session(conn: &Connection, id: &str, ended_at: DateTime<Utc>) -> Result<()> {
        conn.execute(
            "UPDATE sessions SET status = 'ended', ended_at = ?1 WHERE id = ?2",
            params![ended_at.to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Advance the last-snapshot timestamp without writing a snapshot.
    pub fn touch_last_snapshot(conn: &Connection, id: &str, at: DateTime<Utc>) -> Result<()> {
        conn.execute(
            "UPDATE sessions SET last_snapshot_at = ?1 WHERE id = ?2",
            params![at.to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Delete a session and (by cascade) its snapshots and entries.
    pub fn delete(conn: &Connection, id: &str) -> Result<()> {
        conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Convert a row to a Session.
    fn row_to_session(row: &rusqlite::Row<'_>) -> Result<Session> {
        let status_str: String = row.get(3)?;
        let status = SessionStatus::from_str(&status_str)
            .context(format!("Invalid session status: {status_str}"))?;

        let created_at_str: String = row.get(4)?;
        let created_at = parse_timestamp(&created_at_str)?;

        let ended_at: Option<DateTime<Utc>> = row
            .get::<_, Option<String>>(5)?
            .map(|s| parse_timestamp(&s))
            .transpose()?;

        let last_snapshot_at: Option<DateTime<Utc>> = row
            .get::<_, Option<String>>(6)?
            .map(|s| parse_timestamp(&s))
            .transpose()?;

        Ok(Session {
            id: row.get(0)?,
            name: row.get(1)?,
            desktop_key: row.get(2)?,
            status,
            created_at,
            ended_at,
            last_snapshot_at,
        })
    }
}

/// Queries for snapshots and their window/tab entries.
pub struct SnapshotQueries;

impl SnapshotQueries {
    /// Write one snapshot atomically: the snapshot row, its window entries,
    /// its tab entries, and the session's `last_snapshot_at`, in a single
    /// transaction. Rejected if the session is not active.
    pub fn insert_bundle(
        conn: &mut Connection,
        session_id: &str,
        captured_at: DateTime<Utc>,
        windows: &[WindowSnapshotEntry],
        tabs: &[TabSnapshotEntry],
    ) -> Result<i64> {
        let tx = conn.transaction()?;

        let status: String = tx
            .query_row(
                "SELECT status FROM sessions WHERE id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .with_context(|| format!("Unknown session: {session_id}"))?;
        if status != SessionStatus::Active.as_str() {
            bail!("Snapshot rejected: session {session_id} is {status}");
        }

        tx.execute(
            r"INSERT INTO snapshots (session_id, captured_at, window_count, tab_count)
              VALUES (?1, ?2, ?3, ?4)",
            params![
                session_id,
                captured_at.to_rfc3339(),
                windows.len() as i64,
                tabs.len() as i64,
            ],
        )?;
        let snapshot_id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare(
                r"INSERT INTO window_entries
                  (snapshot_id, process_name, executable_path, window_title, window_class, command_line_hint, is_minimized)
                  VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for w in windows {
                stmt.execute(params![
                    snapshot_id,
                    w.process_name,
                    w.executable_path,
                    w.window_title,
                    w.window_class,
                    w.command_line_hint,
                    w.is_minimized,
                ])?;
            }

            let mut stmt = tx.prepare(
                r"INSERT INTO tab_entries (snapshot_id, url, title, favicon_url, pinned, window_group)
                  VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for t in tabs {
                stmt.execute(params![
                    snapshot_id,
                    t.url,
                    t.title,
                    t.favicon_url,
                    t.pinned,
                    t.window_group,
                ])?;
            }
        }

        tx.execute(
            "UPDATE sessions SET last_snapshot_at = ?1 WHERE id = ?2",
            params![captured_at.to_rfc3339(), session_id],
        )?;

        tx.commit()?;
        Ok(snapshot_id)
    }

    /// Get the latest snapshot for a session, with its entries.
    pub fn latest_bundle(conn: &Connection, session_id: &str) -> Result<Option<SnapshotBundle>> {
        let mut stmt = conn.prepare(
            r"SELECT id, session_id, captured_at, window_count, tab_count
              FROM snapshots WHERE session_id = ?1 ORDER BY id DESC LIMIT 1",
        )?;

        let result = stmt.query_row(params![session_id], |row| Ok(Self::row_to_snapshot(row)));
        let snapshot = match result {
            Ok(snapshot) => snapshot?,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let windows = Self::windows_for(conn, snapshot.id)?;
        let tabs = Self::tabs_for(conn, snapshot.id)?;

        Ok(Some(SnapshotBundle {
            snapshot,
            windows,
            tabs,
        }))
    }

    /// Count snapshots stored for a session.
    pub fn count_for_session(conn: &Connection, session_id: &str) -> Result<i64> {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM snapshots WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Window entries of one snapshot, in capture order.
    pub fn windows_for(conn: &Connection, snapshot_id: i64) -> Result<Vec<WindowSnapshotEntry>> {
        let mut stmt = conn.prepare(
            r"SELECT process_name, executable_path, window_title, window_class, command_line_hint, is_minimized
              FROM window_entries WHERE snapshot_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![snapshot_id], |row| {
            Ok(WindowSnapshotEntry {
                process_name: row.get(0)?,
                executable_path: row.get(1)?,
                window_title: row.get(2)?,
                window_class: row.get(3)?,
                command_line_hint: row.get(4)?,
                is_minimized: row.get(5)?,
            })
        })?;

        let mut windows = Vec::new();
        for row in rows {
            windows.push(row?);
        }
        Ok(windows)
    }

    /// Tab entries of one snapshot, in capture order.
    pub fn tabs_for(conn: &Connection, snapshot_id: i64) -> Result<Vec<TabSnapshotEntry>> {
        let mut stmt = conn.prepare(
            r"SELECT url, title, favicon_url, pinned, window_group
              FROM tab_entries WHERE snapshot_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![snapshot_id], |row| {
            Ok(TabSnapshotEntry {
                url: row.get(0)?,
                title: row.get(1)?,
                favicon_url: row.get(2)?,
                pinned: row.get(3)?,
                window_group: row.get(4)?,
            })
        })?;

        let mut tabs = Vec::new();
        for row in rows {
            tabs.push(row?);
        }
        Ok(tabs)
    }

    /// Convert a row to a Snapshot.
    fn row_to_snapshot(row: &rusqlite::Row<'_>) -> Result<Snapshot> {
        let captured_at_str: String = row.get(2)?;
        let captured_at = parse_timestamp(&captured_at_str)?;

        Ok(Snapshot {
            id: row.get(0)?,
            session_id: row.get(1)?,
            captured_at,
            window_count: row.get(3)?,
            tab_count: row.get(4)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::SessionStatus;

    fn active_session(db: &Database, desktop: &str) -> Session {
        let mut session = Session::new(desktop.to_string());
        SessionQueries::insert(db.conn(), &session).unwrap();
        SessionQueries::confirm_name(db.conn(), &session.id, "Lab").unwrap();
        session.name = Some("Lab".to_string());
        session.status = SessionStatus::Active;
        session
    }

    fn sample_window(title: &str) -> WindowSnapshotEntry {
        WindowSnapshotEntry {
            process_name: "code".to_string(),
            executable_path: "/usr/bin/code".to_string(),
            window_title: title.to_string(),
            window_class: "Code".to_string(),
            command_line_hint: None,
            is_minimized: false,
        }
    }

    fn sample_tab(url: &str) -> TabSnapshotEntry {
        TabSnapshotEntry {
            url: url.to_string(),
            title: "doc".to_string(),
            favicon_url: None,
            pinned: false,
            window_group: 1,
        }
    }

    #[test]
    fn snapshot_round_trip() {
        let mut db = Database::open_in_memory().unwrap();
        let session = active_session(&db, "D1");

        let windows = vec![sample_window("a"), sample_window("b")];
        let tabs = vec![
            sample_tab("https://a.example"),
            sample_tab("https://b.example"),
            sample_tab("https://c.example"),
        ];
        let id = SnapshotQueries::insert_bundle(
            db.conn_mut(),
            &session.id,
            Utc::now(),
            &windows,
            &tabs,
        )
        .unwrap();
        assert!(id > 0);

        let bundle = SnapshotQueries::latest_bundle(db.conn(), &session.id)
            .unwrap()
            .unwrap();
        assert_eq!(bundle.snapshot.window_count, 2);
        assert_eq!(bundle.snapshot.tab_count, 3);
        assert_eq!(bundle.windows, windows);
        assert_eq!(bundle.tabs, tabs);

        // last_snapshot_at advanced inside the same transaction
        let stored = SessionQueries::get_by_id(db.conn(), &session.id)
            .unwrap()
            .unwrap();
        assert!(stored.last_snapshot_at.is_some());
    }

    #[test]
    fn snapshot_rejected_for_pending_session() {
        let mut db = Database::open_in_memory().unwrap();
        let session = Session::new("D1".to_string());
        SessionQueries::insert(db.conn(), &session).unwrap();

        let result = SnapshotQueries::insert_bundle(
            db.conn_mut(),
            &session.id,
            Utc::now(),
            &[sample_window("a")],
            &[],
        );
        assert!(result.is_err());
        assert_eq!(
            SnapshotQueries::count_for_session(db.conn(), &session.id).unwrap(),
            0
        );
    }

    #[test]
    fn snapshot_rejected_for_ended_session() {
        let mut db = Database::open_in_memory().unwrap();
        let session = active_session(&db, "D1");
        SessionQueries::end_session(db.conn(), &session.id, Utc::now()).unwrap();

        let result =
            SnapshotQueries::insert_bundle(db.conn_mut(), &session.id, Utc::now(), &[], &[]);
        assert!(result.is_err());
    }

    #[test]
    fn latest_bundle_picks_newest() {
        let mut db = Database::open_in_memory().unwrap();
        let session = active_session(&db, "D1");

        SnapshotQueries::insert_bundle(
            db.conn_mut(),
            &session.id,
            Utc::now(),
            &[sample_window("old")],
            &[],
        )
        .unwrap();
        SnapshotQueries::insert_bundle(
            db.conn_mut(),
            &session.id,
            Utc::now(),
            &[sample_window("new")],
            &[sample_tab("https://x.example")],
        )
        .unwrap();

        let bundle = SnapshotQueries::latest_bundle(db.conn(), &session.id)
            .unwrap()
            .unwrap();
        assert_eq!(bundle.windows[0].window_title, "new");
        assert_eq!(bundle.tabs.len(), 1);
    }

    #[test]
    fn delete_cascades_to_entries() {
        let mut db = Database::open_in_memory().unwrap();
        let session = active_session(&db, "D1");
        SnapshotQueries::insert_bundle(
            db.conn_mut(),
            &session.id,
            Utc::now(),
            &[sample_window("a")],
            &[sample_tab("https://a.example")],
        )
        .unwrap();

        SessionQueries::delete(db.conn(), &session.id).unwrap();

        let windows: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM window_entries", [], |r| r.get(0))
            .unwrap();
        let tabs: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM tab_entries", [], |r| r.get(0))
            .unwrap();
        assert_eq!(windows, 0);
        assert_eq!(tabs, 0);
    }

    #[test]
    fn confirm_name_only_applies_to_pending() {
        let db = Database::open_in_memory().unwrap();
        let session = Session::new("D1".to_string());
        SessionQueries::insert(db.conn(), &session).unwrap();

        SessionQueries::confirm_name(db.conn(), &session.id, "First").unwrap();
        SessionQueries::confirm_name(db.conn(), &session.id, "Second").unwrap();

        let stored = SessionQueries::get_by_id(db.conn(), &session.id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.name.as_deref(), Some("First"));
        assert_eq!(stored.status, SessionStatus::Active);
    }
}
