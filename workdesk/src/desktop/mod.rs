//! Virtual-desktop topology watching.
//!
//! The OS offers no push notification for desktop creation, so topology is
//! polled and diffed. Everything downstream only sees the event stream, so a
//! future native push API plugs in without touching the orchestrator.

mod provider;
mod watcher;

pub use provider::{provider_from_config, CommandProvider, DesktopProvider, DesktopTopology,
                   StaticProvider};
pub use watcher::{spawn_watcher, DesktopEvent, TopologyDiffer};

/// Opaque identifier of one OS virtual desktop, valid for the current boot.
pub type DesktopKey = String;
