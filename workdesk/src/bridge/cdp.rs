//! DevTools-protocol fallback tab source.
//!
//! When the extension bridge has never delivered tabs for a session, the
//! browser's DevTools HTTP endpoint can still enumerate open pages. Window
//! grouping is unavailable this way, so all tabs land in one group.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::models::{is_internal_url, TabSnapshotEntry};

#[derive(Debug, Deserialize)]
struct CdpTarget {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(rename = "faviconUrl", default)]
    favicon_url: Option<String>,
}

/// Fetch the open pages from a locally running browser.
pub async fn fetch_tabs(port: u16) -> Result<Vec<TabSnapshotEntry>> {
    let url = format!("http://127.0.0.1:{port}/json/list");
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(1500))
        .build()
        .context("Failed to build DevTools client")?;

    let targets: Vec<CdpTarget> = client
        .get(&url)
        .send()
        .await
        .context("DevTools endpoint unreachable")?
        .error_for_status()
        .context("DevTools endpoint returned an error")?
        .json()
        .await
        .context("Invalid DevTools target list")?;

    Ok(targets
        .into_iter()
        .filter(|t| t.kind == "page" && !is_internal_url(&t.url))
        .map(|t| TabSnapshotEntry {
            url: t.url,
            title: t.title,
            favicon_url: t.favicon_url,
            pinned: false,
            window_group: 0,
        })
        .collect())
}
