//! Desktop poll loop and topology diffing.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::provider::{DesktopProvider, DesktopTopology};
use super::DesktopKey;
use crate::config::WatcherConfig;
use crate::daemon::Event;

/// Topology change observed between two polls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DesktopEvent {
    /// A desktop appeared. `became_foreground` is set when it is also the
    /// new foreground desktop.
    Created {
        key: DesktopKey,
        became_foreground: bool,
    },
    /// A desktop disappeared.
    Removed { key: DesktopKey },
    /// Foreground moved between two desktops that both already existed.
    Switched { old: DesktopKey, new: DesktopKey },
}

/// Pure diffing state fed successive topology observations.
///
/// Ordering among simultaneous creations follows the OS report order; it is
/// not otherwise guaranteed. A failed or empty observation keeps the
/// last-known topology until `failure_grace` consecutive failures, at which
/// point an empty desktop list is believed and removals are emitted.
pub struct TopologyDiffer {
    known: Vec<DesktopKey>,
    foreground: Option<DesktopKey>,
    failures: u32,
    grace: u32,
    primed: bool,
}

impl TopologyDiffer {
    pub fn new(grace: u32) -> Self {
        Self {
            known: Vec::new(),
            foreground: None,
            failures: 0,
            grace,
            primed: false,
        }
    }

    /// Start from a known topology without emitting events for it.
    pub fn with_baseline(grace: u32, baseline: &DesktopTopology) -> Self {
        let mut differ = Self::new(grace);
        differ.known = baseline.desktops.clone();
        differ.foreground = baseline.foreground.clone();
        differ.primed = true;
        differ
    }

    /// Feed one observation; `None` means enumeration failed.
    pub fn observe(&mut self, observation: Option<DesktopTopology>) -> Vec<DesktopEvent> {
        let topology = match observation {
            Some(t) if !t.desktops.is_empty() => {
                self.failures = 0;
                t
            }
            other => {
                self.failures += 1;
                if self.failures < self.grace {
                    tracing::warn!(
                        failures = self.failures,
                        "Desktop enumeration failed; keeping last-known topology"
                    );
                    return Vec::new();
                }
                // Grace exhausted: believe the empty result.
                other.unwrap_or_default()
            }
        };

        if !self.primed {
            self.known = topology.desktops;
            self.foreground = topology.foreground;
            self.primed = true;
            return Vec::new();
        }

        let known: HashSet<&DesktopKey> = self.known.iter().collect();
        let current: HashSet<&DesktopKey> = topology.desktops.iter().collect();

        let mut events = Vec::new();

        for key in self.known.iter().filter(|k| !current.contains(*k)) {
            events.push(DesktopEvent::Removed { key: key.clone() });
        }

        let mut created = HashSet::new();
        for key in topology.desktops.iter().filter(|k| !known.contains(*k)) {
            created.insert(key.clone());
            events.push(DesktopEvent::Created {
                key: key.clone(),
                became_foreground: topology.foreground.as_ref() == Some(key),
            });
        }

        // A foreground move onto a brand-new desktop is already carried by
        // its Created event.
        if topology.foreground != self.foreground {
            if let (Some(old), Some(new)) = (&self.foreground, &topology.foreground) {
                if !created.contains(new) {
                    events.push(DesktopEvent::Switched {
                        old: old.clone(),
                        new: new.clone(),
                    });
                }
            }
        }

        self.known = topology.desktops;
        self.foreground = topology.foreground;
        events
    }
}

/// Spawn the poll loop. Events are delivered into the orchestrator queue;
/// the task exits when `shutdown` flips or the queue closes.
pub fn spawn_watcher(
    provider: Arc<dyn DesktopProvider>,
    cfg: &WatcherConfig,
    baseline: &DesktopTopology,
    events: mpsc::Sender<Event>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let mut differ = TopologyDiffer::with_baseline(cfg.failure_grace, baseline);
    let poll_interval = Duration::from_millis(cfg.poll_interval_ms);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let provider = provider.clone();
                    let observed = tokio::task::spawn_blocking(move || provider.enumerate())
                        .await
                        .ok()
                        .and_then(|r| match r {
                            Ok(t) => Some(t),
                            Err(e) => {
                                tracing::warn!("Desktop enumeration error: {e:#}");
                                None
                            }
                        });

                    for event in differ.observe(observed) {
                        if events.send(Event::Desktop(event)).await.is_err() {
                            return;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    tracing::debug!("Desktop watcher stopping");
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topo(desktops: &[&str], foreground: Option<&str>) -> DesktopTopology {
        DesktopTopology {
            desktops: desktops.iter().map(ToString::to_string).collect(),
            foreground: foreground.map(ToString::to_string),
        }
    }

    #[test]
    fn first_observation_primes_without_events() {
        let mut differ = TopologyDiffer::new(2);
        let events = differ.observe(Some(topo(&["d1", "d2"], Some("d1"))));
        assert!(events.is_empty());
    }

    #[test]
    fn new_key_emits_created() {
        let mut differ = TopologyDiffer::new(2);
        differ.observe(Some(topo(&["d1"], Some("d1"))));

        let events = differ.observe(Some(topo(&["d1", "d2"], Some("d2"))));
        assert_eq!(
            events,
            vec![DesktopEvent::Created {
                key: "d2".into(),
                became_foreground: true
            }]
        );
    }

    #[test]
    fn burst_creation_emits_one_event_per_key_in_report_order() {
        let mut differ = TopologyDiffer::new(2);
        differ.observe(Some(topo(&["d1"], Some("d1"))));

        let events = differ.observe(Some(topo(&["d1", "d2", "d3"], Some("d1"))));
        assert_eq!(
            events,
            vec![
                DesktopEvent::Created {
                    key: "d2".into(),
                    became_foreground: false
                },
                DesktopEvent::Created {
                    key: "d3".into(),
                    became_foreground: false
                },
            ]
        );
    }

    #[test]
    fn missing_key_emits_removed() {
        let mut differ = TopologyDiffer::new(2);
        differ.observe(Some(topo(&["d1", "d2"], Some("d1"))));

        let events = differ.observe(Some(topo(&["d1"], Some("d1"))));
        assert_eq!(events, vec![DesktopEvent::Removed { key: "d2".into() }]);
    }

    #[test]
    fn foreground_change_without_membership_change_is_only_a_switch() {
        let mut differ = TopologyDiffer::new(2);
        differ.observe(Some(topo(&["d1", "d2"], Some("d1"))));

        let events = differ.observe(Some(topo(&["d1", "d2"], Some("d2"))));
        assert_eq!(
            events,
            vec![DesktopEvent::Switched {
                old: "d1".into(),
                new: "d2".into()
            }]
        );
    }

    #[test]
    fn switch_onto_created_desktop_is_not_doubled() {
        let mut differ = TopologyDiffer::new(2);
        differ.observe(Some(topo(&["d1"], Some("d1"))));

        let events = differ.observe(Some(topo(&["d1", "d2"], Some("d2"))));
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], DesktopEvent::Created { .. }));
    }

    #[test]
    fn single_failure_keeps_topology() {
        let mut differ = TopologyDiffer::new(2);
        differ.observe(Some(topo(&["d1", "d2"], Some("d1"))));

        assert!(differ.observe(None).is_empty());

        // Recovery: nothing changed, so still no events.
        let events = differ.observe(Some(topo(&["d1", "d2"], Some("d1"))));
        assert!(events.is_empty());
    }

    #[test]
    fn grace_exhaustion_trusts_empty_result() {
        let mut differ = TopologyDiffer::new(2);
        differ.observe(Some(topo(&["d1"], Some("d1"))));

        assert!(differ.observe(None).is_empty());
        let events = differ.observe(None);
        assert_eq!(events, vec![DesktopEvent::Removed { key: "d1".into() }]);
    }

    #[test]
    fn empty_list_counts_as_failure() {
        let mut differ = TopologyDiffer::new(2);
        differ.observe(Some(topo(&["d1"], Some("d1"))));

        assert!(differ.observe(Some(topo(&[], None))).is_empty());
        let events = differ.observe(Some(topo(&[], None)));
        assert_eq!(events, vec![DesktopEvent::Removed { key: "d1".into() }]);
    }

    #[test]
    fn success_resets_failure_count() {
        let mut differ = TopologyDiffer::new(2);
        differ.observe(Some(topo(&["d1"], Some("d1"))));

        assert!(differ.observe(None).is_empty());
        assert!(differ.observe(Some(topo(&["d1"], Some("d1")))).is_empty());
        // Failure counter restarted; one more failure is again tolerated.
        assert!(differ.observe(None).is_empty());
    }

    #[test]
    fn baseline_constructor_suppresses_initial_events() {
        let baseline = topo(&["d1", "d2"], Some("d1"));
        let mut differ = TopologyDiffer::with_baseline(2, &baseline);

        let events = differ.observe(Some(topo(&["d1", "d2"], Some("d1"))));
        assert!(events.is_empty());
    }
}
