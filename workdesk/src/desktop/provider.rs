//! Desktop topology providers.

use anyhow::{bail, Context, Result};
use std::process::Command;
use std::sync::{Arc, Mutex};

use super::DesktopKey;
use crate::config::WatcherConfig;

/// One observation of the virtual-desktop list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesktopTopology {
    /// Desktop keys in the order the OS reports them.
    pub desktops: Vec<DesktopKey>,
    /// The foreground desktop, when known.
    pub foreground: Option<DesktopKey>,
}

/// Source of desktop topology observations.
///
/// Implementations may block; callers run them off the async event loop.
pub trait DesktopProvider: Send + Sync {
    fn enumerate(&self) -> Result<DesktopTopology>;
}

/// Provider backed by an external enumerator command.
///
/// The command prints one desktop key per line; the foreground desktop is
/// prefixed with `*`. This is the adapter point for platform helpers that
/// can actually talk to the OS desktop manager.
pub struct CommandProvider {
    command: String,
}

impl CommandProvider {
    pub fn new(command: String) -> Self {
        Self { command }
    }

    /// Parse enumerator output into a topology.
    fn parse(output: &str) -> DesktopTopology {
        let mut topology = DesktopTopology::default();
        for line in output.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(key) = line.strip_prefix('*') {
                let key = key.trim().to_string();
                topology.foreground = Some(key.clone());
                topology.desktops.push(key);
            } else {
                topology.desktops.push(line.to_string());
            }
        }
        topology
    }
}

impl DesktopProvider for CommandProvider {
    fn enumerate(&self) -> Result<DesktopTopology> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .output()
            .with_context(|| format!("Failed to run desktop enumerator: {}", self.command))?;

        if !output.status.success() {
            bail!(
                "Desktop enumerator exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            );
        }

        Ok(Self::parse(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Fixed-topology provider: the fallback when no enumerator is configured,
/// and the scriptable source in tests.
pub struct StaticProvider {
    topology: Mutex<DesktopTopology>,
}

impl StaticProvider {
    pub fn new(topology: DesktopTopology) -> Self {
        Self {
            topology: Mutex::new(topology),
        }
    }

    /// A single permanent desktop.
    pub fn single(key: &str) -> Self {
        Self::new(DesktopTopology {
            desktops: vec![key.to_string()],
            foreground: Some(key.to_string()),
        })
    }

    /// Replace the topology returned by subsequent `enumerate` calls.
    pub fn set(&self, topology: DesktopTopology) {
        *self.topology.lock().expect("topology lock poisoned") = topology;
    }
}

impl DesktopProvider for StaticProvider {
    fn enumerate(&self) -> Result<DesktopTopology> {
        Ok(self.topology.lock().expect("topology lock poisoned").clone())
    }
}

/// Build the configured provider.
pub fn provider_from_config(cfg: &WatcherConfig) -> Arc<dyn DesktopProvider> {
    match &cfg.list_command {
        Some(command) => Arc::new(CommandProvider::new(command.clone())),
        None => {
            tracing::warn!(
                "No desktop enumerator configured; assuming a single static desktop"
            );
            Arc::new(StaticProvider::single("desktop-0"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keys_and_foreground_marker() {
        let topo = CommandProvider::parse("d-aaa\n*d-bbb\nd-ccc\n");
        assert_eq!(topo.desktops, vec!["d-aaa", "d-bbb", "d-ccc"]);
        assert_eq!(topo.foreground.as_deref(), Some("d-bbb"));
    }

    #[test]
    fn blank_lines_are_skipped() {
        let topo = CommandProvider::parse("\n d-aaa \n\n");
        assert_eq!(topo.desktops, vec!["d-aaa"]);
        assert!(topo.foreground.is_none());
    }

    #[test]
    fn static_provider_is_settable() {
        let provider = StaticProvider::single("d-1");
        assert_eq!(provider.enumerate().unwrap().desktops, vec!["d-1"]);

        provider.set(DesktopTopology {
            desktops: vec!["d-1".into(), "d-2".into()],
            foreground: Some("d-2".into()),
        });
        let topo = provider.enumerate().unwrap();
        assert_eq!(topo.desktops.len(), 2);
        assert_eq!(topo.foreground.as_deref(), Some("d-2"));
    }
}
