//! CLI command execution.
//!
//! Every subcommand except `daemon` is a thin client: it discovers the
//! running daemon's port and talks to the control API over HTTP.

use anyhow::{bail, Context, Result};

use crate::config::Config;
use crate::daemon;
use crate::daemon::RestoreReport;
use crate::models::Session;
use crate::server;
use crate::server::{Ack, SessionDetail};

use super::args::{Cli, Commands};

/// Entry point for the parsed command line.
pub async fn execute(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Daemon => daemon::run(config).await,
        Commands::List => list_sessions().await,
        Commands::Show { id } => show_session(&id).await,
        Commands::Name { id, name } => confirm_name(&id, &name).await,
        Commands::Cancel { id } => cancel_naming(&id).await,
        Commands::Snapshot { id } => force_snapshot(&id).await,
        Commands::Restore { id } => restore_session(&id).await,
        Commands::Delete { id } => delete_session(&id).await,
    }
}

// === HTTP client for daemon communication ===

fn api_base() -> Result<String> {
    let port = server::control_port()
        .context("Daemon is not running (start it with `workdesk daemon`)")?;
    Ok(format!("http://127.0.0.1:{port}"))
}

async fn get_json<T: serde::de::DeserializeOwned>(path: &str) -> Result<T> {
    let url = format!("{}{path}", api_base()?);
    let resp = reqwest::Client::new()
        .get(&url)
        .send()
        .await
        .context("Failed to reach daemon")?;

    if !resp.status().is_success() {
        bail!("Daemon returned {}: {}", resp.status(), resp.text().await?);
    }
    resp.json().await.context("Failed to parse response")
}

async fn post_json<T: serde::de::DeserializeOwned>(
    path: &str,
    body: Option<serde_json::Value>,
) -> Result<T> {
    let url = format!("{}{path}", api_base()?);
    let mut req = reqwest::Client::new().post(&url);
    if let Some(body) = body {
        req = req.json(&body);
    }
    let resp = req.send().await.context("Failed to reach daemon")?;

    if !resp.status().is_success() {
        bail!("Daemon returned {}: {}", resp.status(), resp.text().await?);
    }
    resp.json().await.context("Failed to parse response")
}

async fn delete_req(path: &str) -> Result<Ack> {
    let url = format!("{}{path}", api_base()?);
    let resp = reqwest::Client::new()
        .delete(&url)
        .send()
        .await
        .context("Failed to reach daemon")?;

    if !resp.status().is_success() {
        bail!("Daemon returned {}: {}", resp.status(), resp.text().await?);
    }
    resp.json().await.context("Failed to parse response")
}

// === Subcommand implementations ===

fn print_session_line(session: &Session) {
    let name = session.name.as_deref().unwrap_or("(unnamed)");
    let snapshot = session
        .last_snapshot_at
        .map_or_else(|| "never".to_string(), |t| t.to_rfc3339());
    println!(
        "{}  [{}]  {}  desktop={}  last snapshot: {}",
        session.id, session.status, name, session.desktop_key, snapshot
    );
}

async fn list_sessions() -> Result<()> {
    let sessions: Vec<Session> = get_json("/api/sessions").await?;
    if sessions.is_empty() {
        println!("No sessions.");
        return Ok(());
    }
    for session in &sessions {
        print_session_line(session);
    }
    Ok(())
}

async fn show_session(id: &str) -> Result<()> {
    let detail: SessionDetail = get_json(&format!("/api/sessions/{id}")).await?;
    print_session_line(&detail.session);
    println!("Snapshots stored: {}", detail.snapshot_count);

    if let Some(snapshot) = &detail.latest_snapshot {
        println!(
            "Latest snapshot: {} ({} windows, {} tabs)",
            snapshot.captured_at.to_rfc3339(),
            snapshot.window_count,
            snapshot.tab_count
        );
    }

    if detail.restore_preview.is_empty() {
        println!("Nothing to restore.");
    } else {
        println!("Restore would open:");
        for item in &detail.restore_preview {
            println!("  - {item}");
        }
    }
    Ok(())
}

async fn confirm_name(id: &str, name: &str) -> Result<()> {
    let _: Ack = post_json(
        &format!("/api/sessions/{id}/name"),
        Some(serde_json::json!({ "name": name })),
    )
    .await?;
    println!("Session named '{name}'");
    Ok(())
}

async fn cancel_naming(id: &str) -> Result<()> {
    let _: Ack = post_json(&format!("/api/sessions/{id}/cancel"), None).await?;
    println!("Session discarded");
    Ok(())
}

async fn force_snapshot(id: &str) -> Result<()> {
    let _: Ack = post_json(&format!("/api/sessions/{id}/snapshot"), None).await?;
    println!("Snapshot requested");
    Ok(())
}

async fn restore_session(id: &str) -> Result<()> {
    let report: RestoreReport = post_json(&format!("/api/sessions/{id}/restore"), None).await?;

    let ok = report.outcomes.iter().filter(|o| o.success).count();
    let failed = report.outcomes.len() - ok;
    for outcome in &report.outcomes {
        if outcome.success {
            println!("  ok    {}", outcome.action);
        } else {
            println!(
                "  FAIL  {} ({})",
                outcome.action,
                outcome.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    println!("Restore finished: {ok} launched, {failed} failed");
    Ok(())
}

async fn delete_session(id: &str) -> Result<()> {
    let _: Ack = delete_req(&format!("/api/sessions/{id}")).await?;
    println!("Session deleted");
    Ok(())
}
