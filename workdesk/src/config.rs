//! Configuration surface consumed by the daemon.
//!
//! Loaded from a TOML file; every field has a default so a missing file or a
//! partial file works. The two capture cadences the original docs disagreed
//! on (5 s vs 30 s snapshots) are both reachable here by configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub restore: RestoreConfig,
}

/// Daemon process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Port the local control API listens on.
    #[serde(default = "default_control_port")]
    pub control_port: u16,

    /// Database file path; defaults to the per-user data directory.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

fn default_control_port() -> u16 {
    7420
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            control_port: default_control_port(),
            db_path: None,
        }
    }
}

/// Desktop watcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// How often the virtual-desktop list is polled.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Consecutive failed/empty polls tolerated before an empty desktop
    /// list is believed and removals are emitted.
    #[serde(default = "default_failure_grace")]
    pub failure_grace: u32,

    /// External enumerator command: one desktop key per line, the
    /// foreground desktop prefixed with `*`. When unset, a single static
    /// desktop is assumed.
    #[serde(default)]
    pub list_command: Option<String>,
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_failure_grace() -> u32 {
    2
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            failure_grace: default_failure_grace(),
            list_command: None,
        }
    }
}

/// Window capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Seconds between snapshot ticks for active sessions.
    #[serde(default = "default_snapshot_interval_secs")]
    pub snapshot_interval_secs: u64,

    /// External enumerator command emitting one JSON object per window
    /// per line. When unset, window captures are empty.
    #[serde(default)]
    pub list_command: Option<String>,

    /// Process names excluded from capture (shell hosts, system UI).
    #[serde(default = "default_ignore_processes")]
    pub ignore_processes: Vec<String>,
}

fn default_snapshot_interval_secs() -> u64 {
    30
}

fn default_ignore_processes() -> Vec<String> {
    [
        "explorer.exe",
        "dwm.exe",
        "textinputhost.exe",
        "shellexperiencehost.exe",
        "searchui.exe",
        "applicationframehost.exe",
        "systemsettings.exe",
        "workdesk",
        "workdesk.exe",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            snapshot_interval_secs: default_snapshot_interval_secs(),
            list_command: None,
            ignore_processes: default_ignore_processes(),
        }
    }
}

/// Tab bridge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Address of the browser extension's native-host proxy.
    #[serde(default = "default_bridge_endpoint")]
    pub endpoint: String,

    /// Reconnect backoff ceiling in seconds.
    #[serde(default = "default_retry_cap_secs")]
    pub retry_cap_secs: u64,

    /// DevTools-protocol port used as a fallback tab source when the
    /// bridge has never delivered tabs. Disabled when unset.
    #[serde(default)]
    pub cdp_port: Option<u16>,
}

fn default_bridge_endpoint() -> String {
    "127.0.0.1:8791".to_string()
}

fn default_retry_cap_secs() -> u64 {
    5
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            endpoint: default_bridge_endpoint(),
            retry_cap_secs: default_retry_cap_secs(),
            cdp_port: None,
        }
    }
}

/// Restore execution settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestoreConfig {
    /// Browser executable used to open tab groups; falls back to the
    /// system URL opener when unset.
    #[serde(default)]
    pub browser_path: Option<PathBuf>,

    /// Editor executable override; the captured executable path is used
    /// when unset.
    #[serde(default)]
    pub editor_path: Option<PathBuf>,

    /// Terminal executable override; the captured executable path is used
    /// when unset.
    #[serde(default)]
    pub terminal_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the given path, or the default location.
    /// A missing file yields the defaults; a malformed file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Invalid config: {}", path.display()))
    }

    /// Default config location: `<config dir>/workdesk/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("workdesk").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_cadences() {
        let cfg = Config::default();
        assert_eq!(cfg.watcher.poll_interval_ms, 500);
        assert_eq!(cfg.watcher.failure_grace, 2);
        assert_eq!(cfg.capture.snapshot_interval_secs, 30);
        assert_eq!(cfg.bridge.retry_cap_secs, 5);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [capture]
            snapshot_interval_secs = 5

            [bridge]
            cdp_port = 9222
            "#,
        )
        .unwrap();
        assert_eq!(cfg.capture.snapshot_interval_secs, 5);
        assert_eq!(cfg.bridge.cdp_port, Some(9222));
        assert_eq!(cfg.watcher.poll_interval_ms, 500);
        assert!(!cfg.capture.ignore_processes.is_empty());
    }
}
