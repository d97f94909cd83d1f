//! Session model - a named unit of work bound to one virtual desktop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a session.
///
/// A cancelled session has no status of its own - its row is deleted before
/// it ever leaves `PendingName`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Desktop detected, waiting for the user to pick a name.
    PendingName,
    /// Named and being captured.
    Active,
    /// Desktop removed or daemon shut down; history retained.
    Ended,
}

impl SessionStatus {
    /// Convert status to string for database storage.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PendingName => "pending_name",
            Self::Active => "active",
            Self::Ended => "ended",
        }
    }

    /// Parse status from database string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending_name" => Some(Self::PendingName),
            "active" => Some(Self::Active),
            "ended" => Some(Self::Ended),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A session tracks the windows and tabs of one virtual desktop.
///
/// The desktop key is only valid for the current boot; a desktop reusing the
/// same OS identifier after a reboot gets a fresh session row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier (UUIDv7, time-ordered).
    pub id: String,
    /// User-supplied name; present once the session is confirmed.
    pub name: Option<String>,
    /// Opaque identifier of the OS virtual desktop this session is bound to.
    pub desktop_key: String,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session ended (if it has).
    pub ended_at: Option<DateTime<Utc>>,
    /// When the last snapshot tick completed for this session.
    pub last_snapshot_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Create a new pending session for a freshly detected desktop.
    pub fn new(desktop_key: String) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            name: None,
            desktop_key,
            status: SessionStatus::PendingName,
            created_at: Utc::now(),
            ended_at: None,
            last_snapshot_at: None,
        }
    }
}
