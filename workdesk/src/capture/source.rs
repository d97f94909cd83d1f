//! Window enumeration sources.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::process::Command;
use std::sync::Arc;

use super::hints::command_line_hint;
use crate::config::CaptureConfig;
use crate::desktop::DesktopKey;
use crate::models::WindowSnapshotEntry;

/// Source of window enumerations.
///
/// Implementations may block; callers run them off the async event loop.
/// An implementation that cannot enumerate at all returns an error; the
/// orchestrator treats that as a soft failure and keeps its schedule.
pub trait WindowSource: Send + Sync {
    /// Windows currently on one desktop, in enumeration order.
    fn capture(&self, desktop_key: &str) -> Result<Vec<WindowSnapshotEntry>>;

    /// Windows on every desktop.
    fn capture_all(&self) -> Result<HashMap<DesktopKey, Vec<WindowSnapshotEntry>>>;
}

/// One window as reported by the enumerator command (one JSON object per
/// stdout line).
#[derive(Debug, Deserialize)]
struct RawWindow {
    desktop: String,
    process: String,
    #[serde(default)]
    exe: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    class: String,
    #[serde(default)]
    minimized: bool,
    #[serde(default)]
    cwd: Option<String>,
}

/// Enumerator-command-backed window source.
///
/// Malformed lines are skipped individually; a window whose metadata cannot
/// be resolved never fails the rest of the capture.
pub struct CommandWindowSource {
    command: String,
    ignored: HashSet<String>,
}

impl CommandWindowSource {
    pub fn new(command: String, ignore_processes: &[String]) -> Self {
        Self {
            command,
            ignored: ignore_processes.iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    fn enumerate(&self) -> Result<Vec<(DesktopKey, WindowSnapshotEntry)>> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .output()
            .with_context(|| format!("Failed to run window enumerator: {}", self.command))?;

        if !output.status.success() {
            bail!(
                "Window enumerator exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            );
        }

        Ok(self.parse(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Parse enumerator output, dropping malformed lines and filtered
    /// windows.
    fn parse(&self, output: &str) -> Vec<(DesktopKey, WindowSnapshotEntry)> {
        let mut windows = Vec::new();

        for line in output.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let raw: RawWindow = match serde_json::from_str(line) {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::debug!("Skipping malformed window line: {e}");
                    continue;
                }
            };

            if raw.title.is_empty() || self.ignored.contains(&raw.process.to_lowercase()) {
                continue;
            }

            let hint = command_line_hint(&raw.process, &raw.title, raw.cwd.as_deref());
            windows.push((
                raw.desktop,
                WindowSnapshotEntry {
                    process_name: raw.process,
                    executable_path: raw.exe,
                    window_title: raw.title,
                    window_class: raw.class,
                    command_line_hint: hint,
                    is_minimized: raw.minimized,
                },
            ));
        }

        windows
    }
}

impl WindowSource for CommandWindowSource {
    fn capture(&self, desktop_key: &str) -> Result<Vec<WindowSnapshotEntry>> {
        Ok(self
            .enumerate()?
            .into_iter()
            .filter(|(desktop, _)| desktop == desktop_key)
            .map(|(_, entry)| entry)
            .collect())
    }

    fn capture_all(&self) -> Result<HashMap<DesktopKey, Vec<WindowSnapshotEntry>>> {
        let mut by_desktop: HashMap<DesktopKey, Vec<WindowSnapshotEntry>> = HashMap::new();
        for (desktop, entry) in self.enumerate()? {
            by_desktop.entry(desktop).or_default().push(entry);
        }
        Ok(by_desktop)
    }
}

/// Source used when no enumerator is configured: every capture is empty.
pub struct NullWindowSource;

impl WindowSource for NullWindowSource {
    fn capture(&self, _desktop_key: &str) -> Result<Vec<WindowSnapshotEntry>> {
        Ok(Vec::new())
    }

    fn capture_all(&self) -> Result<HashMap<DesktopKey, Vec<WindowSnapshotEntry>>> {
        Ok(HashMap::new())
    }
}

/// Build the configured window source.
pub fn source_from_config(cfg: &CaptureConfig) -> Arc<dyn WindowSource> {
    match &cfg.list_command {
        Some(command) => Arc::new(CommandWindowSource::new(
            command.clone(),
            &cfg.ignore_processes,
        )),
        None => {
            tracing::warn!("No window enumerator configured; captures will be empty");
            Arc::new(NullWindowSource)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> CommandWindowSource {
        CommandWindowSource::new("true".into(), &["explorer.exe".to_string()])
    }

    #[test]
    fn parses_windows_per_line() {
        let output = concat!(
            r#"{"desktop":"d1","process":"code","exe":"/usr/bin/code","title":"a — p — Visual Studio Code","class":"Code"}"#,
            "\n",
            r#"{"desktop":"d2","process":"alacritty","title":"sh","cwd":"/home/u"}"#,
            "\n",
        );
        let windows = source().parse(output);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].0, "d1");
        assert_eq!(windows[0].1.command_line_hint.as_deref(), Some("p"));
        assert_eq!(windows[1].1.command_line_hint.as_deref(), Some("/home/u"));
    }

    #[test]
    fn malformed_lines_do_not_fail_the_capture() {
        let output = concat!(
            "not json at all\n",
            r#"{"desktop":"d1","process":"code","title":"x"}"#,
            "\n",
            r#"{"desktop":42}"#,
            "\n",
        );
        let windows = source().parse(output);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].1.window_title, "x");
    }

    #[test]
    fn ignored_processes_and_empty_titles_are_dropped() {
        let output = concat!(
            r#"{"desktop":"d1","process":"Explorer.EXE","title":"Program Manager"}"#,
            "\n",
            r#"{"desktop":"d1","process":"code","title":""}"#,
            "\n",
        );
        assert!(source().parse(output).is_empty());
    }

    #[test]
    fn capture_filters_by_desktop() {
        let src = CommandWindowSource::new(
            r#"printf '{"desktop":"d1","process":"a","title":"one"}\n{"desktop":"d2","process":"b","title":"two"}\n'"#
                .into(),
            &[],
        );
        let windows = src.capture("d2").unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].window_title, "two");

        let all = src.capture_all().unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn failing_enumerator_surfaces_an_error() {
        let src = CommandWindowSource::new("exit 3".into(), &[]);
        assert!(src.capture("d1").is_err());
    }
}
