//! Snapshot metadata - one consistent capture of a session's state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{TabSnapshotEntry, WindowSnapshotEntry};

/// Metadata row for one persisted snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Store-assigned snapshot id.
    pub id: i64,
    /// Session this snapshot belongs to.
    pub session_id: String,
    /// Instant the capture ran.
    pub captured_at: DateTime<Utc>,
    /// Number of window entries in the snapshot.
    pub window_count: i64,
    /// Number of tab entries in the snapshot.
    pub tab_count: i64,
}

/// A snapshot together with its window and tab entries.
///
/// Window and tab sets are always written and read together; a reader never
/// sees entries from two different captures under one snapshot id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotBundle {
    pub snapshot: Snapshot,
    pub windows: Vec<WindowSnapshotEntry>,
    pub tabs: Vec<TabSnapshotEntry>,
}
