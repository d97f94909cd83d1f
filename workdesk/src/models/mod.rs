//! Data models for workdesk entities.

mod session;
mod snapshot;
mod tab;
mod window;

pub use session::{Session, SessionStatus};
pub use snapshot::{Snapshot, SnapshotBundle};
pub use tab::{is_internal_url, TabSnapshotEntry};
pub use window::{AppKind, WindowSnapshotEntry};
