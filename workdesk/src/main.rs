//! Workdesk - per-desktop work sessions, captured and restorable.
//!
//! Each OS virtual desktop is bound to a named session whose windows and
//! browser tabs are periodically snapshotted into SQLite and can be
//! relaunched later.
//!
//! Architecture:
//! - `workdesk daemon` runs the session orchestrator plus a local HTTP
//!   control API (the interface the presentation layer consumes)
//! - every other subcommand is a thin client of that API

mod bridge;
mod capture;
mod cli;
mod config;
mod daemon;
mod db;
mod desktop;
mod models;
mod restore;
mod server;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{execute, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    execute(cli).await
}
