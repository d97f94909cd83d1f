//! Reconnecting bridge channel.
//!
//! Maintains one connection to the extension's native-host proxy, with
//! exponential backoff capped at the configured ceiling. The current-session
//! announcement is cached and replayed on every (re)connect, because the
//! extension has no other way to learn which session tab pushes belong to.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::protocol::{decode_frame, read_frame, write_frame, BridgeMessage};
use crate::config::BridgeConfig;
use crate::daemon::Event;
use crate::models::TabSnapshotEntry;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Events the bridge delivers into the orchestrator queue.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// Channel (re)established.
    Connected,
    /// Channel lost; tab data will be absent until it returns.
    Disconnected,
    /// Full-replacement tab snapshot for a session.
    TabsReceived {
        session_id: String,
        tabs: Vec<TabSnapshotEntry>,
        timestamp: Option<DateTime<Utc>>,
    },
    /// The extension asked for an out-of-band snapshot.
    ForceSnapshotRequested { session_id: String },
}

/// Commands the orchestrator sends to the bridge.
#[derive(Debug, Clone)]
pub enum BridgeCommand {
    /// Announce the active session (`None` = no session).
    Announce(Option<String>),
    /// Ask the extension for an immediate tab snapshot.
    RequestTabs(String),
}

/// Handle for sending commands to the bridge task.
///
/// Sends are fire-and-forget: while the channel is down the extension
/// cannot be reached anyway, so a full queue just drops the command.
#[derive(Clone)]
pub struct BridgeHandle {
    tx: mpsc::Sender<BridgeCommand>,
}

impl BridgeHandle {
    pub fn announce(&self, session_id: Option<String>) {
        if self.tx.try_send(BridgeCommand::Announce(session_id)).is_err() {
            tracing::debug!("Bridge command queue full; dropping announce");
        }
    }

    pub fn request_tabs(&self, session_id: &str) {
        if self
            .tx
            .try_send(BridgeCommand::RequestTabs(session_id.to_string()))
            .is_err()
        {
            tracing::debug!("Bridge command queue full; dropping tab request");
        }
    }

    /// Handle backed by a plain channel, for tests.
    #[cfg(test)]
    pub fn for_tests() -> (Self, mpsc::Receiver<BridgeCommand>) {
        let (tx, rx) = mpsc::channel(64);
        (Self { tx }, rx)
    }
}

/// Spawn the bridge task.
pub fn spawn_bridge(
    cfg: &BridgeConfig,
    events: mpsc::Sender<Event>,
    shutdown: watch::Receiver<bool>,
) -> (BridgeHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(64);
    let endpoint = cfg.endpoint.clone();
    let retry_cap = Duration::from_secs(cfg.retry_cap_secs.max(1));

    let handle = tokio::spawn(run_bridge(endpoint, retry_cap, rx, events, shutdown));
    (BridgeHandle { tx }, handle)
}

async fn run_bridge(
    endpoint: String,
    retry_cap: Duration,
    mut commands: mpsc::Receiver<BridgeCommand>,
    events: mpsc::Sender<Event>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut announced: Option<String> = None;
    let mut backoff = INITIAL_BACKOFF;

    loop {
        let stream = tokio::select! {
            connected = TcpStream::connect(&endpoint) => connected,
            _ = shutdown.changed() => return,
        };

        match stream {
            Ok(stream) => {
                backoff = INITIAL_BACKOFF;
                tracing::info!(endpoint = %endpoint, "Tab bridge connected");
                let _ = events.send(Event::Bridge(BridgeEvent::Connected)).await;

                let done = run_connection(
                    stream,
                    &mut announced,
                    &mut commands,
                    &events,
                    &mut shutdown,
                )
                .await;

                tracing::warn!("Tab bridge disconnected");
                let _ = events.send(Event::Bridge(BridgeEvent::Disconnected)).await;
                if done {
                    return;
                }
            }
            Err(e) => {
                tracing::debug!("Tab bridge connect failed: {e}");
            }
        }

        // Keep the announcement cache fresh while waiting to reconnect.
        let sleep = tokio::time::sleep(backoff);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                () = &mut sleep => break,
                cmd = commands.recv() => match cmd {
                    Some(BridgeCommand::Announce(session)) => announced = session,
                    Some(BridgeCommand::RequestTabs(_)) => {}
                    None => return,
                },
                _ = shutdown.changed() => return,
            }
        }
        backoff = (backoff * 2).min(retry_cap);
    }
}

fn announcement(announced: &Option<String>) -> BridgeMessage {
    announced.as_ref().map_or(BridgeMessage::SessionNone, |id| {
        BridgeMessage::SessionActive {
            session_id: id.clone(),
        }
    })
}

/// Drive one live connection until it drops. Returns `true` on shutdown.
///
/// Frames are read on their own task: a length-prefixed read is not safe to
/// cancel mid-frame, so the select loop below only ever parks on channels.
async fn run_connection(
    stream: TcpStream,
    announced: &mut Option<String>,
    commands: &mut mpsc::Receiver<BridgeCommand>,
    events: &mpsc::Sender<Event>,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    let (reader, mut writer) = stream.into_split();
    let (inbound_tx, mut inbound) = mpsc::channel::<BridgeMessage>(64);
    let reader_task = tokio::spawn(read_loop(reader, inbound_tx));

    // The extension learns the active session on every (re)connect.
    if write_frame(&mut writer, &announcement(announced)).await.is_err() {
        reader_task.abort();
        return false;
    }

    let done = loop {
        tokio::select! {
            cmd = commands.recv() => {
                let msg = match cmd {
                    Some(BridgeCommand::Announce(session)) => {
                        *announced = session;
                        announcement(announced)
                    }
                    Some(BridgeCommand::RequestTabs(session_id)) => {
                        BridgeMessage::RequestTabs { session_id }
                    }
                    None => break true,
                };
                if write_frame(&mut writer, &msg).await.is_err() {
                    break false;
                }
            }
            msg = inbound.recv() => match msg {
                Some(msg) => {
                    if handle_inbound(msg, announced, &mut writer, events).await.is_err() {
                        break false;
                    }
                }
                // Reader hit EOF or a broken frame: connection is gone.
                None => break false,
            },
            _ = shutdown.changed() => break true,
        }
    };

    reader_task.abort();
    done
}

/// Read and decode frames until the stream breaks. Malformed JSON from the
/// untrusted peer is dropped without killing the connection.
async fn read_loop(
    mut reader: tokio::net::tcp::OwnedReadHalf,
    inbound: mpsc::Sender<BridgeMessage>,
) {
    loop {
        match read_frame(&mut reader).await {
            Ok(body) => match decode_frame(&body) {
                Ok(msg) => {
                    if inbound.send(msg).await.is_err() {
                        return;
                    }
                }
                Err(e) => tracing::warn!("Dropping malformed bridge message: {e}"),
            },
            Err(e) => {
                tracing::debug!("Bridge read failed: {e}");
                return;
            }
        }
    }
}

async fn handle_inbound(
    msg: BridgeMessage,
    announced: &Option<String>,
    writer: &mut (impl tokio::io::AsyncWrite + Unpin),
    events: &mpsc::Sender<Event>,
) -> std::io::Result<()> {
    match msg {
        BridgeMessage::GetActiveSession => {
            write_frame(writer, &announcement(announced)).await?;
        }
        BridgeMessage::TabsSnapshot {
            session_id,
            tabs,
            timestamp,
        } => {
            let entries: Vec<_> = tabs.iter().filter_map(super::WireTab::to_entry).collect();
            let _ = events
                .send(Event::Bridge(BridgeEvent::TabsReceived {
                    session_id,
                    tabs: entries,
                    timestamp,
                }))
                .await;
        }
        BridgeMessage::SetActiveSession { session_id } => {
            // The extension cannot change core state; answer with the truth.
            tracing::debug!(requested = %session_id, "Extension tried to set active session");
            write_frame(writer, &announcement(announced)).await?;
        }
        BridgeMessage::ForceSnapshot { session_id } => {
            let _ = events
                .send(Event::Bridge(BridgeEvent::ForceSnapshotRequested {
                    session_id,
                }))
                .await;
        }
        BridgeMessage::SessionActive { .. }
        | BridgeMessage::SessionNone
        | BridgeMessage::RequestTabs { .. } => {
            tracing::warn!("Unexpected core-to-extension message from extension");
        }
    }
    Ok(())
}
