//! CLI argument definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Workdesk - track and restore per-desktop work sessions
#[derive(Parser, Debug)]
#[command(name = "workdesk")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path (default: <config dir>/workdesk/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the tracking daemon (orchestrator + control API)
    Daemon,

    /// List sessions
    List,

    /// Show one session with its latest snapshot and restore preview
    Show {
        /// Session ID
        id: String,
    },

    /// Confirm the name of a pending session
    Name {
        /// Session ID
        id: String,

        /// Session name
        name: String,
    },

    /// Cancel naming of a pending session (discards it)
    Cancel {
        /// Session ID
        id: String,
    },

    /// Force an out-of-band snapshot of an active session
    Snapshot {
        /// Session ID
        id: String,
    },

    /// Restore a session's latest snapshot
    Restore {
        /// Session ID
        id: String,
    },

    /// Delete a session and its history
    Delete {
        /// Session ID
        id: String,
    },
}
