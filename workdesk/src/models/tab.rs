//! Tab snapshot entry - one browser tab captured for a session.

use serde::{Deserialize, Serialize};

/// URL schemes internal to the browser; never persisted or restored.
const INTERNAL_SCHEMES: &[&str] = &[
    "chrome://",
    "chrome-extension://",
    "edge://",
    "devtools://",
    "about:",
    "data:",
];

/// Whether a URL uses a browser-internal scheme.
pub fn is_internal_url(url: &str) -> bool {
    url.is_empty() || INTERNAL_SCHEMES.iter().any(|p| url.starts_with(p))
}

/// One captured browser tab, belonging to a (session, capture) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabSnapshotEntry {
    /// The tab's URL.
    pub url: String,
    /// The tab's title.
    pub title: String,
    /// Favicon URL, when the browser reports one.
    pub favicon_url: Option<String>,
    /// Whether the tab is pinned.
    pub pinned: bool,
    /// The browser-side window the tab belongs to, for grouping restored
    /// tabs back into the same number of browser windows.
    pub window_group: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_schemes_are_rejected() {
        assert!(is_internal_url("chrome://settings"));
        assert!(is_internal_url("about:blank"));
        assert!(is_internal_url("devtools://devtools/bundled"));
        assert!(is_internal_url(""));
    }

    #[test]
    fn regular_urls_pass() {
        assert!(!is_internal_url("https://example.com/docs"));
        assert!(!is_internal_url("http://localhost:3000"));
    }
}
