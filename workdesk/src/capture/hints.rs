//! Best-effort launch-context extraction.
//!
//! Heuristics only; any failure degrades to "no hint" and never fails the
//! capture that requested it.

use regex::Regex;
use std::sync::OnceLock;

use crate::models::AppKind;

/// Spaced title separators used by VS Code-family editors:
/// "file — folder — Visual Studio Code".
fn title_separator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+(?:—|–|-)\s+").expect("title separator regex"))
}

const EDITOR_PRODUCTS: &[&str] = &["Visual Studio Code", "VSCodium", "Code"];

/// Derive a launch hint for a window.
///
/// Editors: the workspace folder parsed from the window title.
/// Terminals: the working directory the enumerator reported.
/// Everything else: no hint.
pub fn command_line_hint(
    process_name: &str,
    window_title: &str,
    working_dir: Option<&str>,
) -> Option<String> {
    match AppKind::of(process_name) {
        AppKind::Editor => {
            let parts: Vec<&str> = title_separator_re().split(window_title).collect();
            if parts.len() < 3 || !EDITOR_PRODUCTS.contains(parts.last()?) {
                return None;
            }
            let folder = parts[parts.len() - 2].trim();
            (!folder.is_empty()).then(|| folder.to_string())
        }
        AppKind::Terminal => working_dir
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(ToString::to_string),
        AppKind::Browser | AppKind::Generic => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn editor_workspace_from_title() {
        let hint = command_line_hint("code", "main.rs — workdesk — Visual Studio Code", None);
        assert_eq!(hint.as_deref(), Some("workdesk"));
    }

    #[test]
    fn hyphenated_folder_names_survive() {
        let hint = command_line_hint("code", "lib.rs — my-proj — Visual Studio Code", None);
        assert_eq!(hint.as_deref(), Some("my-proj"));
    }

    #[test]
    fn editor_title_without_folder_yields_none() {
        assert!(command_line_hint("code", "Welcome", None).is_none());
        assert!(command_line_hint("code", "untitled — Visual Studio Code", None).is_none());
    }

    #[test]
    fn terminal_uses_working_dir() {
        let hint = command_line_hint("alacritty", "alacritty", Some("/home/u/proj"));
        assert_eq!(hint.as_deref(), Some("/home/u/proj"));
    }

    #[test]
    fn terminal_without_working_dir_yields_none() {
        assert!(command_line_hint("cmd.exe", "Command Prompt", None).is_none());
        assert!(command_line_hint("cmd.exe", "Command Prompt", Some("  ")).is_none());
    }

    #[test]
    fn generic_windows_get_no_hint() {
        assert!(command_line_hint("obsidian", "Notes - Obsidian", Some("/tmp")).is_none());
    }
}
