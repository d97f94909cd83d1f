//! Events, commands, and notifications flowing through the orchestrator.
//!
//! Every producer - desktop watcher, tab bridge, capture tasks, control
//! handlers - delivers into one serialized queue, so no two state
//! transitions for a session ever race.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::bridge::BridgeEvent;
use crate::desktop::DesktopEvent;
use crate::models::{SessionStatus, WindowSnapshotEntry};
use crate::restore::ActionOutcome;

/// Everything the orchestrator consumes.
pub enum Event {
    /// Topology change from the desktop watcher.
    Desktop(DesktopEvent),
    /// Message from the tab bridge.
    Bridge(BridgeEvent),
    /// Command from the presentation layer.
    Command(Command),
    /// A window capture finished; the error side carries a soft failure.
    CaptureDone {
        session_id: String,
        captured_at: DateTime<Utc>,
        windows: Result<Vec<WindowSnapshotEntry>, String>,
    },
}

/// Commands accepted from the presentation layer. Each carries a reply
/// channel; state-integrity violations come back as `StateConflict`.
pub enum Command {
    ConfirmName {
        session_id: String,
        name: String,
        reply: oneshot::Sender<Result<(), StateConflict>>,
    },
    CancelNaming {
        session_id: String,
        reply: oneshot::Sender<Result<(), StateConflict>>,
    },
    ForceSnapshot {
        session_id: String,
        reply: oneshot::Sender<Result<(), StateConflict>>,
    },
    RequestRestore {
        session_id: String,
        reply: oneshot::Sender<Result<RestoreReport, StateConflict>>,
    },
    DeleteSession {
        session_id: String,
        reply: oneshot::Sender<Result<(), StateConflict>>,
    },
}

/// Per-action outcomes of one restore run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreReport {
    pub session_id: String,
    pub outcomes: Vec<ActionOutcome>,
}

/// A command that cannot be applied in the session's current state.
/// Rejected as a no-op; never silently applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateConflict {
    #[error("unknown session: {0}")]
    UnknownSession(String),
    #[error("session is {status}, expected pending_name")]
    NotPending { status: SessionStatus },
    #[error("session is {status}, expected active")]
    NotActive { status: SessionStatus },
    #[error("session has no snapshot to restore")]
    NoSnapshot,
    #[error("session name must not be empty")]
    EmptyName,
}

/// Read-only notifications pushed to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// A new desktop needs a session name from the user.
    DesktopNeedsNaming { session_id: String },
    /// Session membership or naming changed; re-fetch the list.
    SessionListChanged,
    /// A session ended.
    SessionEnded { session_id: String },
    /// One restore action completed.
    RestoreProgress {
        session_id: String,
        action: String,
        success: bool,
        error: Option<String>,
    },
    /// A producer hit a transient problem; operation continues on schedule.
    SoftFailure { source: String, message: String },
}
