//! Best-effort launch execution.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use tokio::process::Command;

use super::planner::{ActionOutcome, LaunchAction};
use crate::config::RestoreConfig;

/// Execute one launch action, converting any failure into the outcome.
///
/// Nothing is retried: restore is a one-shot, user-initiated operation.
pub async fn execute_action(action: &LaunchAction, cfg: &RestoreConfig) -> ActionOutcome {
    let result = match action {
        LaunchAction::OpenUrls { urls, .. } => open_urls(urls, cfg.browser_path.as_deref()),
        LaunchAction::OpenEditorWorkspace {
            executable,
            workspace,
        } => spawn_detached(
            &resolve(cfg.editor_path.as_deref(), executable),
            &[workspace.clone()],
            None,
        ),
        LaunchAction::OpenTerminalAt {
            executable,
            directory,
        } => spawn_detached(
            &resolve(cfg.terminal_path.as_deref(), executable),
            &[],
            Some(Path::new(directory)),
        ),
        LaunchAction::Relaunch { executable } => relaunch(executable),
    };

    match result {
        Ok(()) => ActionOutcome {
            action: action.describe(),
            success: true,
            error: None,
        },
        Err(e) => ActionOutcome {
            action: action.describe(),
            success: false,
            error: Some(format!("{e:#}")),
        },
    }
}

/// Prefer the configured override, fall back to the captured path.
fn resolve(configured: Option<&Path>, captured: &str) -> PathBuf {
    configured.map_or_else(|| PathBuf::from(captured), Path::to_path_buf)
}

fn open_urls(urls: &[String], browser: Option<&Path>) -> Result<()> {
    if urls.is_empty() {
        return Ok(());
    }

    if let Some(browser) = browser {
        // One invocation per window: the first URL carries --new-window so
        // the group lands in its own browser window.
        let mut args = vec!["--new-window".to_string()];
        args.extend(urls.iter().cloned());
        return spawn_detached(browser, &args, None);
    }

    // No browser configured: hand each URL to the system opener.
    for url in urls {
        open::that(url).with_context(|| format!("Failed to open {url}"))?;
    }
    Ok(())
}

fn relaunch(executable: &str) -> Result<()> {
    if executable.is_empty() || !Path::new(executable).exists() {
        bail!("Executable missing: {executable}");
    }
    spawn_detached(Path::new(executable), &[], None)
}

fn spawn_detached(program: &Path, args: &[String], working_dir: Option<&Path>) -> Result<()> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }

    cmd.spawn()
        .with_context(|| format!("Failed to launch {}", program.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_executable_yields_failed_outcome_without_error() {
        let action = LaunchAction::Relaunch {
            executable: "/definitely/not/here".into(),
        };
        let outcome = execute_action(&action, &RestoreConfig::default()).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("missing"));
    }

    #[tokio::test]
    async fn empty_url_group_is_a_successful_noop() {
        let action = LaunchAction::OpenUrls {
            window_group: 1,
            urls: vec![],
        };
        let outcome = execute_action(&action, &RestoreConfig::default()).await;
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn terminal_spawn_in_missing_directory_fails_softly() {
        let action = LaunchAction::OpenTerminalAt {
            executable: "/bin/true".into(),
            directory: "/definitely/not/here".into(),
        };
        let outcome = execute_action(&action, &RestoreConfig::default()).await;
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn successful_spawn_reports_ok() {
        let action = LaunchAction::Relaunch {
            executable: "/bin/true".into(),
        };
        let outcome = execute_action(&action, &RestoreConfig::default()).await;
        assert!(outcome.success, "{:?}", outcome.error);
    }
}
