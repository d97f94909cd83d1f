//! Launch-action planning from a session's latest snapshot.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::models::{AppKind, TabSnapshotEntry, WindowSnapshotEntry};

/// One best-effort launch step of a restore plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LaunchAction {
    /// Open a set of URLs as one browser window.
    OpenUrls { window_group: i64, urls: Vec<String> },
    /// Reopen an editor on its workspace folder.
    OpenEditorWorkspace { executable: String, workspace: String },
    /// Reopen a terminal at its working directory.
    OpenTerminalAt { executable: String, directory: String },
    /// Relaunch an executable with no further context.
    Relaunch { executable: String },
}

impl LaunchAction {
    /// Short human-readable description, used in progress reporting.
    pub fn describe(&self) -> String {
        match self {
            Self::OpenUrls { window_group, urls } => {
                format!("browser window {window_group} ({} tabs)", urls.len())
            }
            Self::OpenEditorWorkspace { workspace, .. } => format!("editor workspace {workspace}"),
            Self::OpenTerminalAt { directory, .. } => format!("terminal at {directory}"),
            Self::Relaunch { executable } => format!("app {executable}"),
        }
    }
}

/// Result of executing one launch action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// `describe()` of the action that ran.
    pub action: String,
    /// Whether the launch was issued successfully.
    pub success: bool,
    /// Failure detail, when not successful.
    pub error: Option<String>,
}

/// Build the ordered action list for one snapshot.
///
/// Order: tab groups (browser windows) first, then editor workspaces, then
/// terminals, then deduplicated plain relaunches. Browser windows are never
/// relaunched directly - their tabs carry the state.
pub fn plan(windows: &[WindowSnapshotEntry], tabs: &[TabSnapshotEntry]) -> Vec<LaunchAction> {
    let mut actions = Vec::new();

    // Tabs grouped by browser window, groups in first-appearance order.
    let mut group_order: Vec<i64> = Vec::new();
    for tab in tabs {
        if !group_order.contains(&tab.window_group) {
            group_order.push(tab.window_group);
        }
    }
    for group in group_order {
        let urls: Vec<String> = tabs
            .iter()
            .filter(|t| t.window_group == group)
            .map(|t| t.url.clone())
            .collect();
        actions.push(LaunchAction::OpenUrls {
            window_group: group,
            urls,
        });
    }

    let mut editors = Vec::new();
    let mut terminals = Vec::new();
    let mut fallbacks = Vec::new();
    let mut seen_executables = HashSet::new();

    for window in windows {
        match (window.kind(), window.command_line_hint.as_deref()) {
            (AppKind::Editor, Some(workspace)) => editors.push(LaunchAction::OpenEditorWorkspace {
                executable: window.executable_path.clone(),
                workspace: workspace.to_string(),
            }),
            (AppKind::Terminal, Some(directory)) => terminals.push(LaunchAction::OpenTerminalAt {
                executable: window.executable_path.clone(),
                directory: directory.to_string(),
            }),
            (AppKind::Browser, _) => {}
            _ => {
                if window.executable_path.is_empty() {
                    continue;
                }
                if seen_executables.insert(window.executable_path.clone()) {
                    fallbacks.push(LaunchAction::Relaunch {
                        executable: window.executable_path.clone(),
                    });
                }
            }
        }
    }

    actions.extend(editors);
    actions.extend(terminals);
    actions.extend(fallbacks);
    actions
}

/// Human-readable summary of what a plan would open.
pub fn preview(actions: &[LaunchAction]) -> Vec<String> {
    actions.iter().map(LaunchAction::describe).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(process: &str, exe: &str, title: &str, hint: Option<&str>) -> WindowSnapshotEntry {
        WindowSnapshotEntry {
            process_name: process.to_string(),
            executable_path: exe.to_string(),
            window_title: title.to_string(),
            window_class: String::new(),
            command_line_hint: hint.map(ToString::to_string),
            is_minimized: false,
        }
    }

    fn tab(url: &str, group: i64) -> TabSnapshotEntry {
        TabSnapshotEntry {
            url: url.to_string(),
            title: String::new(),
            favicon_url: None,
            pinned: false,
            window_group: group,
        }
    }

    #[test]
    fn tabs_group_into_one_action_per_browser_window() {
        let tabs = vec![
            tab("https://a.example", 1),
            tab("https://b.example", 2),
            tab("https://c.example", 1),
        ];
        let actions = plan(&[], &tabs);
        assert_eq!(
            actions,
            vec![
                LaunchAction::OpenUrls {
                    window_group: 1,
                    urls: vec!["https://a.example".into(), "https://c.example".into()]
                },
                LaunchAction::OpenUrls {
                    window_group: 2,
                    urls: vec!["https://b.example".into()]
                },
            ]
        );
    }

    #[test]
    fn windows_classify_by_kind_and_hint() {
        let windows = vec![
            window("code", "/usr/bin/code", "x — p — Visual Studio Code", Some("p")),
            window("alacritty", "/usr/bin/alacritty", "sh", Some("/home/u")),
            window("chrome", "/usr/bin/chrome", "Docs", None),
            window("obsidian", "/usr/bin/obsidian", "Notes", None),
        ];
        let actions = plan(&windows, &[]);
        assert_eq!(
            actions,
            vec![
                LaunchAction::OpenEditorWorkspace {
                    executable: "/usr/bin/code".into(),
                    workspace: "p".into()
                },
                LaunchAction::OpenTerminalAt {
                    executable: "/usr/bin/alacritty".into(),
                    directory: "/home/u".into()
                },
                LaunchAction::Relaunch {
                    executable: "/usr/bin/obsidian".into()
                },
            ]
        );
    }

    #[test]
    fn fallback_relaunches_are_deduplicated() {
        let windows = vec![
            window("obsidian", "/usr/bin/obsidian", "A", None),
            window("obsidian", "/usr/bin/obsidian", "B", None),
            window("gimp", "", "No path", None),
        ];
        let actions = plan(&windows, &[]);
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn planning_is_deterministic() {
        let windows = vec![
            window("code", "/usr/bin/code", "x — p — Visual Studio Code", Some("p")),
            window("obsidian", "/usr/bin/obsidian", "Notes", None),
        ];
        let tabs = vec![tab("https://a.example", 1), tab("https://b.example", 2)];
        assert_eq!(plan(&windows, &tabs), plan(&windows, &tabs));
    }

    #[test]
    fn editor_without_hint_falls_back_to_relaunch() {
        let windows = vec![window("code", "/usr/bin/code", "Welcome", None)];
        let actions = plan(&windows, &[]);
        assert_eq!(
            actions,
            vec![LaunchAction::Relaunch {
                executable: "/usr/bin/code".into()
            }]
        );
    }
}
