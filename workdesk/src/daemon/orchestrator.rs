//! Session orchestrator - the state machine binding everything together.
//!
//! Owns the in-memory session table and the store's write connection. All
//! mutation happens while processing one event at a time off a serialized
//! queue; blocking work (window enumeration, restore launches) runs on
//! separate tasks and re-enters the queue as events.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, watch};

use super::events::{Command, Event, Notification, RestoreReport, StateConflict};
use crate::bridge::{BridgeEvent, BridgeHandle};
use crate::capture::WindowSource;
use crate::config::RestoreConfig;
use crate::db::{Database, SessionQueries, SnapshotQueries};
use crate::desktop::{DesktopEvent, DesktopKey, DesktopTopology};
use crate::models::{Session, SessionStatus, TabSnapshotEntry, WindowSnapshotEntry};
use crate::restore;

/// In-memory state tracked per live (non-ended) session.
struct SessionEntry {
    session: Session,
    last_window_fp: Option<u64>,
    last_tab_fp: Option<u64>,
}

pub struct Orchestrator {
    db: Database,
    windows: Arc<dyn WindowSource>,
    bridge: BridgeHandle,
    notify: broadcast::Sender<Notification>,
    events_tx: mpsc::Sender<Event>,
    restore_cfg: RestoreConfig,
    cdp_port: Option<u16>,

    sessions: HashMap<String, SessionEntry>,
    by_desktop: HashMap<DesktopKey, String>,
    current_desktop: Option<DesktopKey>,
    /// Latest full-replacement tab snapshot per session, merged into the
    /// next persisted snapshot.
    tab_cache: HashMap<String, Vec<TabSnapshotEntry>>,
}

impl Orchestrator {
    pub fn new(
        db: Database,
        windows: Arc<dyn WindowSource>,
        bridge: BridgeHandle,
        notify: broadcast::Sender<Notification>,
        events_tx: mpsc::Sender<Event>,
        restore_cfg: RestoreConfig,
        cdp_port: Option<u16>,
    ) -> Self {
        Self {
            db,
            windows,
            bridge,
            notify,
            events_tx,
            restore_cfg,
            cdp_port,
            sessions: HashMap::new(),
            by_desktop: HashMap::new(),
            current_desktop: None,
            tab_cache: HashMap::new(),
        }
    }

    /// Reconcile store state with the topology observed at startup.
    ///
    /// Sessions left open by a previous run are adopted when their desktop
    /// still exists (crash recovery); otherwise active ones are ended and
    /// pending ones deleted - desktop keys do not survive a reboot.
    pub fn reconcile_startup(&mut self, topology: &DesktopTopology) -> anyhow::Result<()> {
        let open = SessionQueries::list_open(self.db.conn())?;
        let mut adopted = 0usize;
        let mut stale = 0usize;

        for session in open {
            if topology.desktops.contains(&session.desktop_key) {
                if session.status == SessionStatus::PendingName {
                    self.emit(Notification::DesktopNeedsNaming {
                        session_id: session.id.clone(),
                    });
                }
                self.adopt(session);
                adopted += 1;
            } else {
                stale += 1;
                match session.status {
                    SessionStatus::PendingName => {
                        SessionQueries::delete(self.db.conn(), &session.id)?;
                    }
                    _ => SessionQueries::end_session(self.db.conn(), &session.id, Utc::now())?,
                }
            }
        }

        self.current_desktop = topology.foreground.clone();
        self.bridge.announce(self.current_active_session_id());
        tracing::info!(adopted, stale, "Startup session reconciliation done");
        Ok(())
    }

    /// Consume events until shutdown, snapshotting active sessions on the
    /// given interval.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<Event>,
        mut shutdown: watch::Receiver<bool>,
        snapshot_interval: Duration,
    ) {
        let start = tokio::time::Instant::now() + snapshot_interval;
        let mut ticker = tokio::time::interval_at(start, snapshot_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                _ = ticker.tick() => self.snapshot_all(),
                _ = shutdown.changed() => break,
            }
        }

        // Let already-delivered work (e.g. an in-flight capture result)
        // finish before ending sessions.
        while let Ok(event) = events.try_recv() {
            self.handle_event(event);
        }
        self.shutdown_cleanup();
    }

    pub(crate) fn handle_event(&mut self, event: Event) {
        match event {
            Event::Desktop(e) => self.handle_desktop(e),
            Event::Bridge(e) => self.handle_bridge(e),
            Event::Command(c) => self.handle_command(c),
            Event::CaptureDone {
                session_id,
                captured_at,
                windows,
            } => self.handle_capture_done(&session_id, captured_at, windows),
        }
    }

    // === Desktop events ===

    fn handle_desktop(&mut self, event: DesktopEvent) {
        match event {
            DesktopEvent::Created {
                key,
                became_foreground,
            } => {
                if became_foreground {
                    self.current_desktop = Some(key.clone());
                }
                if self.by_desktop.contains_key(&key) {
                    tracing::debug!(desktop = %key, "Desktop already has a session");
                } else {
                    let session = Session::new(key);
                    tracing::info!(session = %session.id, desktop = %session.desktop_key, "New desktop detected");
                    if let Err(e) = SessionQueries::insert(self.db.conn(), &session) {
                        self.soft_failure("store", &format!("{e:#}"));
                        return;
                    }
                    self.emit(Notification::DesktopNeedsNaming {
                        session_id: session.id.clone(),
                    });
                    self.emit(Notification::SessionListChanged);
                    self.adopt(session);
                }
                if became_foreground {
                    // The new desktop's session is pending; nothing is
                    // active for tab attribution until it is named.
                    self.bridge.announce(self.current_active_session_id());
                }
            }
            DesktopEvent::Removed { key } => {
                let was_current = self.current_active_session_id();
                if self.current_desktop.as_ref() == Some(&key) {
                    self.current_desktop = None;
                }

                let Some(id) = self.by_desktop.remove(&key) else {
                    return;
                };
                let Some(entry) = self.sessions.remove(&id) else {
                    return;
                };
                self.tab_cache.remove(&id);

                match entry.session.status {
                    SessionStatus::PendingName => {
                        tracing::info!(session = %id, "Desktop removed before naming; discarding");
                        if let Err(e) = SessionQueries::delete(self.db.conn(), &id) {
                            self.soft_failure("store", &format!("{e:#}"));
                        }
                    }
                    _ => {
                        tracing::info!(session = %id, "Desktop removed; session ended");
                        if let Err(e) = SessionQueries::end_session(self.db.conn(), &id, Utc::now())
                        {
                            self.soft_failure("store", &format!("{e:#}"));
                        }
                        self.emit(Notification::SessionEnded {
                            session_id: id.clone(),
                        });
                        if was_current.as_deref() == Some(id.as_str()) {
                            self.bridge.announce(None);
                        }
                    }
                }
                self.emit(Notification::SessionListChanged);
            }
            DesktopEvent::Switched { old: _, new } => {
                self.current_desktop = Some(new);
                // Re-announce on every switch: the extension has no other
                // way to learn which session tab pushes belong to.
                self.bridge.announce(self.current_active_session_id());
            }
        }
    }

    // === Bridge events ===

    fn handle_bridge(&mut self, event: BridgeEvent) {
        match event {
            BridgeEvent::Connected => {
                self.bridge.announce(self.current_active_session_id());
            }
            BridgeEvent::Disconnected => {
                self.soft_failure("tab_bridge", "Bridge disconnected; tab capture degraded");
            }
            BridgeEvent::TabsReceived {
                session_id, tabs, ..
            } => {
                if self.sessions.contains_key(&session_id) {
                    tracing::debug!(session = %session_id, tabs = tabs.len(), "Tab snapshot cached");
                    self.tab_cache.insert(session_id, tabs);
                } else {
                    tracing::debug!(session = %session_id, "Dropping tabs for unknown session");
                }
            }
            BridgeEvent::ForceSnapshotRequested { session_id } => {
                match self.ensure_active(&session_id) {
                    Ok(()) => self.schedule_capture(&session_id),
                    Err(conflict) => {
                        tracing::debug!(session = %session_id, %conflict, "Ignoring extension snapshot request");
                    }
                }
            }
        }
    }

    // === Presentation commands ===

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::ConfirmName {
                session_id,
                name,
                reply,
            } => {
                let _ = reply.send(self.confirm_name(&session_id, &name));
            }
            Command::CancelNaming { session_id, reply } => {
                let _ = reply.send(self.cancel_naming(&session_id));
            }
            Command::ForceSnapshot { session_id, reply } => {
                let result = self.ensure_active(&session_id);
                if result.is_ok() {
                    self.schedule_capture(&session_id);
                }
                let _ = reply.send(result);
            }
            Command::RequestRestore { session_id, reply } => self.request_restore(session_id, reply),
            Command::DeleteSession { session_id, reply } => {
                let _ = reply.send(self.delete_session(&session_id));
            }
        }
    }

    fn confirm_name(&mut self, session_id: &str, name: &str) -> Result<(), StateConflict> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StateConflict::EmptyName);
        }

        let Some(status) = self.sessions.get(session_id).map(|e| e.session.status) else {
            return Err(self.missing_conflict(session_id, false));
        };

        match status {
            SessionStatus::PendingName => {
                if let Err(e) = SessionQueries::confirm_name(self.db.conn(), session_id, name) {
                    self.soft_failure("store", &format!("{e:#}"));
                    return Ok(());
                }
                let entry = self.sessions.get_mut(session_id).expect("entry just seen");
                entry.session.name = Some(name.to_string());
                entry.session.status = SessionStatus::Active;
                let desktop = entry.session.desktop_key.clone();
                tracing::info!(session = %session_id, name, "Session confirmed");

                self.emit(Notification::SessionListChanged);
                if self.current_desktop.as_ref() == Some(&desktop) {
                    self.bridge.announce(Some(session_id.to_string()));
                }
                Ok(())
            }
            // Confirming twice is a no-op after the first confirmation.
            SessionStatus::Active => Ok(()),
            SessionStatus::Ended => Err(StateConflict::NotPending {
                status: SessionStatus::Ended,
            }),
        }
    }

    fn cancel_naming(&mut self, session_id: &str) -> Result<(), StateConflict> {
        let Some(entry) = self.sessions.get(session_id) else {
            return Err(self.missing_conflict(session_id, false));
        };

        match entry.session.status {
            SessionStatus::PendingName => {
                let desktop = entry.session.desktop_key.clone();
                if let Err(e) = SessionQueries::delete(self.db.conn(), session_id) {
                    self.soft_failure("store", &format!("{e:#}"));
                }
                self.sessions.remove(session_id);
                self.by_desktop.remove(&desktop);
                self.tab_cache.remove(session_id);
                tracing::info!(session = %session_id, "Naming cancelled; session discarded");
                self.emit(Notification::SessionListChanged);
                Ok(())
            }
            // Cancel after activation is a no-op.
            _ => Ok(()),
        }
    }

    fn delete_session(&mut self, session_id: &str) -> Result<(), StateConflict> {
        let stored = SessionQueries::get_by_id(self.db.conn(), session_id)
            .ok()
            .flatten()
            .ok_or_else(|| StateConflict::UnknownSession(session_id.to_string()))?;

        let was_current = self.current_active_session_id();
        if let Err(e) = SessionQueries::delete(self.db.conn(), session_id) {
            self.soft_failure("store", &format!("{e:#}"));
        }
        self.sessions.remove(session_id);
        self.by_desktop.remove(&stored.desktop_key);
        self.tab_cache.remove(session_id);

        if was_current.as_deref() == Some(session_id) {
            self.bridge.announce(None);
        }
        tracing::info!(session = %session_id, "Session deleted");
        self.emit(Notification::SessionListChanged);
        Ok(())
    }

    fn request_restore(
        &mut self,
        session_id: String,
        reply: tokio::sync::oneshot::Sender<Result<RestoreReport, StateConflict>>,
    ) {
        let stored = SessionQueries::get_by_id(self.db.conn(), &session_id)
            .ok()
            .flatten();
        if stored.is_none() {
            let _ = reply.send(Err(StateConflict::UnknownSession(session_id)));
            return;
        }

        let bundle = match SnapshotQueries::latest_bundle(self.db.conn(), &session_id) {
            Ok(Some(bundle)) => bundle,
            Ok(None) => {
                let _ = reply.send(Err(StateConflict::NoSnapshot));
                return;
            }
            Err(e) => {
                self.soft_failure("store", &format!("{e:#}"));
                let _ = reply.send(Err(StateConflict::NoSnapshot));
                return;
            }
        };

        let actions = restore::plan(&bundle.windows, &bundle.tabs);
        tracing::info!(session = %session_id, actions = actions.len(), "Restore starting");

        // Execution is best-effort and runs off the event loop; each
        // action's outcome is surfaced as it completes.
        let notify = self.notify.clone();
        let cfg = self.restore_cfg.clone();
        tokio::spawn(async move {
            let mut outcomes = Vec::with_capacity(actions.len());
            for action in &actions {
                let outcome = restore::execute_action(action, &cfg).await;
                let _ = notify.send(Notification::RestoreProgress {
                    session_id: session_id.clone(),
                    action: outcome.action.clone(),
                    success: outcome.success,
                    error: outcome.error.clone(),
                });
                outcomes.push(outcome);
            }
            let _ = reply.send(Ok(RestoreReport {
                session_id,
                outcomes,
            }));
        });
    }

    // === Capture pipeline ===

    /// Snapshot every active session (the periodic tick).
    fn snapshot_all(&mut self) {
        let active: Vec<String> = self
            .sessions
            .values()
            .filter(|e| e.session.status == SessionStatus::Active)
            .map(|e| e.session.id.clone())
            .collect();
        for session_id in active {
            self.schedule_capture(&session_id);
        }
    }

    /// Kick off window enumeration for one session off the event loop; the
    /// result re-enters the queue as `CaptureDone`.
    fn schedule_capture(&mut self, session_id: &str) {
        let Some(entry) = self.sessions.get(session_id) else {
            return;
        };
        let desktop_key = entry.session.desktop_key.clone();

        self.bridge.request_tabs(session_id);

        // DevTools fallback: only when the bridge has never delivered tabs
        // for this session.
        if let Some(port) = self.cdp_port {
            if !self.tab_cache.contains_key(session_id) {
                let events = self.events_tx.clone();
                let id = session_id.to_string();
                tokio::spawn(async move {
                    match crate::bridge::fetch_tabs(port).await {
                        Ok(tabs) if !tabs.is_empty() => {
                            let _ = events
                                .send(Event::Bridge(BridgeEvent::TabsReceived {
                                    session_id: id,
                                    tabs,
                                    timestamp: None,
                                }))
                                .await;
                        }
                        Ok(_) => {}
                        Err(e) => tracing::debug!("DevTools tab fallback failed: {e:#}"),
                    }
                });
            }
        }

        let windows = self.windows.clone();
        let events = self.events_tx.clone();
        let id = session_id.to_string();
        tokio::spawn(async move {
            let captured =
                tokio::task::spawn_blocking(move || windows.capture(&desktop_key)).await;
            let result = match captured {
                Ok(Ok(entries)) => Ok(entries),
                Ok(Err(e)) => Err(format!("{e:#}")),
                Err(e) => Err(e.to_string()),
            };
            let _ = events
                .send(Event::CaptureDone {
                    session_id: id,
                    captured_at: Utc::now(),
                    windows: result,
                })
                .await;
        });
    }

    fn handle_capture_done(
        &mut self,
        session_id: &str,
        captured_at: chrono::DateTime<Utc>,
        windows: Result<Vec<WindowSnapshotEntry>, String>,
    ) {
        let Some(entry) = self.sessions.get(session_id) else {
            tracing::debug!(session = %session_id, "Dropping capture for gone session");
            return;
        };
        if entry.session.status != SessionStatus::Active {
            tracing::debug!(session = %session_id, "Dropping capture for inactive session");
            return;
        }

        let windows = match windows {
            Ok(windows) => windows,
            Err(message) => {
                // Soft failure: nothing is written, the schedule continues,
                // and the latest good snapshot stays the latest.
                self.soft_failure("window_capture", &message);
                return;
            }
        };
        let tabs = self.tab_cache.get(session_id).cloned().unwrap_or_default();

        let window_fp = window_fingerprint(&windows);
        let tab_fp = tab_fingerprint(&tabs);
        let entry = self.sessions.get_mut(session_id).expect("entry just seen");

        if entry.last_window_fp == Some(window_fp) && entry.last_tab_fp == Some(tab_fp) {
            // Nothing changed: no new rows, but the session still records
            // that a capture happened.
            entry.session.last_snapshot_at = Some(captured_at);
            if let Err(e) = SessionQueries::touch_last_snapshot(self.db.conn(), session_id, captured_at)
            {
                self.soft_failure("store", &format!("{e:#}"));
            }
            tracing::debug!(session = %session_id, "Snapshot unchanged; deduplicated");
            return;
        }

        match SnapshotQueries::insert_bundle(
            self.db.conn_mut(),
            session_id,
            captured_at,
            &windows,
            &tabs,
        ) {
            Ok(snapshot_id) => {
                let entry = self.sessions.get_mut(session_id).expect("entry just seen");
                entry.last_window_fp = Some(window_fp);
                entry.last_tab_fp = Some(tab_fp);
                entry.session.last_snapshot_at = Some(captured_at);
                tracing::debug!(
                    session = %session_id,
                    snapshot = snapshot_id,
                    windows = windows.len(),
                    tabs = tabs.len(),
                    "Snapshot persisted"
                );
            }
            Err(e) => self.soft_failure("store", &format!("{e:#}")),
        }
    }

    // === Shutdown ===

    /// Clean shutdown ends active sessions; pending ones are discarded.
    fn shutdown_cleanup(&mut self) {
        let ids: Vec<String> = self.sessions.keys().cloned().collect();
        for id in ids {
            let Some(entry) = self.sessions.remove(&id) else {
                continue;
            };
            let result = match entry.session.status {
                SessionStatus::PendingName => SessionQueries::delete(self.db.conn(), &id),
                _ => SessionQueries::end_session(self.db.conn(), &id, Utc::now()),
            };
            if let Err(e) = result {
                tracing::error!(session = %id, "Shutdown cleanup failed: {e:#}");
            }
        }
        self.by_desktop.clear();
        self.tab_cache.clear();
        self.bridge.announce(None);
        tracing::info!("Orchestrator stopped");
    }

    // === Helpers ===

    fn adopt(&mut self, session: Session) {
        self.by_desktop
            .insert(session.desktop_key.clone(), session.id.clone());
        self.sessions.insert(
            session.id.clone(),
            SessionEntry {
                session,
                last_window_fp: None,
                last_tab_fp: None,
            },
        );
    }

    fn current_active_session_id(&self) -> Option<String> {
        let key = self.current_desktop.as_ref()?;
        let id = self.by_desktop.get(key)?;
        let entry = self.sessions.get(id)?;
        (entry.session.status == SessionStatus::Active).then(|| id.clone())
    }

    fn ensure_active(&self, session_id: &str) -> Result<(), StateConflict> {
        match self.sessions.get(session_id) {
            Some(entry) if entry.session.status == SessionStatus::Active => Ok(()),
            Some(entry) => Err(StateConflict::NotActive {
                status: entry.session.status,
            }),
            None => Err(self.missing_conflict(session_id, true)),
        }
    }

    /// Conflict for a session absent from the live table: it may be ended
    /// in the store, or unknown entirely.
    fn missing_conflict(&self, session_id: &str, want_active: bool) -> StateConflict {
        match SessionQueries::get_by_id(self.db.conn(), session_id) {
            Ok(Some(session)) if want_active => StateConflict::NotActive {
                status: session.status,
            },
            Ok(Some(session)) => StateConflict::NotPending {
                status: session.status,
            },
            _ => StateConflict::UnknownSession(session_id.to_string()),
        }
    }

    fn emit(&self, notification: Notification) {
        let _ = self.notify.send(notification);
    }

    fn soft_failure(&self, source: &str, message: &str) {
        tracing::warn!(source, "{message}");
        self.emit(Notification::SoftFailure {
            source: source.to_string(),
            message: message.to_string(),
        });
    }
}

/// Order-insensitive fingerprint over the (process, title, path) set.
fn window_fingerprint(windows: &[WindowSnapshotEntry]) -> u64 {
    let mut keys: Vec<(&str, &str, &str)> = windows
        .iter()
        .map(|w| {
            (
                w.process_name.as_str(),
                w.window_title.as_str(),
                w.executable_path.as_str(),
            )
        })
        .collect();
    keys.sort_unstable();
    let mut hasher = DefaultHasher::new();
    keys.hash(&mut hasher);
    hasher.finish()
}

/// Order-insensitive fingerprint over the (url, group, pinned) set.
fn tab_fingerprint(tabs: &[TabSnapshotEntry]) -> u64 {
    let mut keys: Vec<(&str, i64, bool)> = tabs
        .iter()
        .map(|t| (t.url.as_str(), t.window_group, t.pinned))
        .collect();
    keys.sort_unstable();
    let mut hasher = DefaultHasher::new();
    keys.hash(&mut hasher);
    hasher.finish()
}
