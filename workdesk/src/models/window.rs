//! Window snapshot entry - a value snapshot of one top-level window.
//!
//! No OS window handle is ever stored: handles are only valid for the life
//! of a process, so every persisted reference is the (process, title, path)
//! value itself, and correlation across captures is best-effort matching.

use serde::{Deserialize, Serialize};

/// Broad application category, derived from the process name.
///
/// Drives restore classification: editors reopen their workspace, terminals
/// reopen at their working directory, browsers are covered by tab restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppKind {
    Editor,
    Terminal,
    Browser,
    Generic,
}

impl AppKind {
    /// Classify a process by its (case-insensitive) name.
    pub fn of(process_name: &str) -> Self {
        let name = process_name.to_lowercase();
        let stem = name
            .strip_suffix(".exe")
            .unwrap_or(&name);
        match stem {
            "code" | "codium" | "code - insiders" => Self::Editor,
            "windowsterminal" | "wt" | "cmd" | "powershell" | "pwsh" | "alacritty" | "kitty"
            | "wezterm-gui" | "gnome-terminal-server" | "konsole" => Self::Terminal,
            "chrome" | "chromium" | "msedge" | "brave" | "firefox" | "vivaldi" => Self::Browser,
            _ => Self::Generic,
        }
    }
}

/// One captured top-level window, belonging to a (session, capture) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSnapshotEntry {
    /// Owning process name, e.g. `code` or `chrome.exe`.
    pub process_name: String,
    /// Full path of the owning executable.
    pub executable_path: String,
    /// Window title at capture time.
    pub window_title: String,
    /// Window class name, when the enumerator reports one.
    pub window_class: String,
    /// Best-effort launch context: terminal working directory, editor
    /// workspace folder. Absent when no heuristic applied.
    pub command_line_hint: Option<String>,
    /// Whether the window was minimized at capture time.
    pub is_minimized: bool,
}

impl WindowSnapshotEntry {
    /// The application category of this window.
    pub fn kind(&self) -> AppKind {
        AppKind::of(&self.process_name)
    }
}
