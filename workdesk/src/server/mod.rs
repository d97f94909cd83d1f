//! Control API - the interface boundary to the presentation layer.
//!
//! The naming prompt, dashboard, and tray UI live outside this repository;
//! they read session state and push commands through this local HTTP API,
//! and follow live changes over the WebSocket notification stream. Reads go
//! straight to the store (WAL snapshot reads); every mutation is a command
//! routed through the orchestrator queue.
//!
//! Endpoints:
//! - GET    /api/sessions                - list sessions
//! - GET    /api/sessions/{id}           - session detail + restore preview
//! - POST   /api/sessions/{id}/name      - confirm a session name
//! - POST   /api/sessions/{id}/cancel    - cancel naming
//! - POST   /api/sessions/{id}/snapshot  - force a snapshot
//! - POST   /api/sessions/{id}/restore   - run a restore, returns outcomes
//! - DELETE /api/sessions/{id}           - delete a session
//! - WS     /ws                          - notification stream

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};

use crate::daemon::{Command, Event, Notification, RestoreReport, StateConflict};
use crate::db::{Database, SessionQueries, SnapshotQueries};
use crate::models::{Session, Snapshot};
use crate::restore;

/// Daemon discovery file locations.
const SERVER_DIR: &str = ".workdesk";
const PID_FILE: &str = "daemon.pid";
const PORT_FILE: &str = "daemon.port";

/// Shared server state.
pub struct ServerState {
    /// Read connection to the store.
    db: Mutex<Database>,
    /// Command path into the orchestrator.
    events: mpsc::Sender<Event>,
    /// Notification fan-out to WebSocket clients.
    notify: broadcast::Sender<Notification>,
}

/// Session detail response.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionDetail {
    pub session: Session,
    pub latest_snapshot: Option<Snapshot>,
    pub snapshot_count: i64,
    /// What a restore of the latest snapshot would open.
    pub restore_preview: Vec<String>,
}

/// Body of the confirm-name command.
#[derive(Debug, Serialize, Deserialize)]
pub struct NameRequest {
    pub name: String,
}

/// Generic acknowledgement body.
#[derive(Debug, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
}

// === Server lifecycle ===

/// Start the control API; returns after graceful shutdown.
pub async fn start_server(
    port: u16,
    db: Database,
    events: mpsc::Sender<Event>,
    notify: broadcast::Sender<Notification>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let server_dir = get_server_dir()?;
    std::fs::create_dir_all(&server_dir)?;
    std::fs::write(server_dir.join(PID_FILE), std::process::id().to_string())?;
    std::fs::write(server_dir.join(PORT_FILE), port.to_string())?;

    let state = Arc::new(ServerState {
        db: Mutex::new(db),
        events,
        notify,
    });

    let app = Router::new()
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/{id}", get(get_session))
        .route("/api/sessions/{id}", delete(delete_session))
        .route("/api/sessions/{id}/name", post(confirm_name))
        .route("/api/sessions/{id}/cancel", post(cancel_naming))
        .route("/api/sessions/{id}/snapshot", post(force_snapshot))
        .route("/api/sessions/{id}/restore", post(request_restore))
        .route("/ws", get(websocket_handler))
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind control API on {addr}"))?;
    tracing::info!(%addr, "Control API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
        .context("Control API error")?;

    let _ = std::fs::remove_file(server_dir.join(PID_FILE));
    let _ = std::fs::remove_file(server_dir.join(PORT_FILE));
    Ok(())
}

fn get_server_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not find home directory")?;
    Ok(home.join(SERVER_DIR))
}

/// Port of a running daemon, if one is alive.
pub fn control_port() -> Option<u16> {
    let server_dir = get_server_dir().ok()?;
    let pid: u32 = std::fs::read_to_string(server_dir.join(PID_FILE))
        .ok()?
        .trim()
        .parse()
        .ok()?;

    #[cfg(unix)]
    {
        use std::process::Command as SysCommand;
        let alive = SysCommand::new("kill")
            .args(["-0", &pid.to_string()])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);
        if !alive {
            return None;
        }
    }

    std::fs::read_to_string(server_dir.join(PORT_FILE))
        .ok()?
        .trim()
        .parse()
        .ok()
}

// === Command plumbing ===

fn conflict_response(conflict: StateConflict) -> (StatusCode, String) {
    let status = match conflict {
        StateConflict::UnknownSession(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::CONFLICT,
    };
    (status, conflict.to_string())
}

async fn send_command<T>(
    state: &ServerState,
    make: impl FnOnce(oneshot::Sender<Result<T, StateConflict>>) -> Command,
) -> Result<T, (StatusCode, String)> {
    let (tx, rx) = oneshot::channel();
    state
        .events
        .send(Event::Command(make(tx)))
        .await
        .map_err(|_| {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Daemon is shutting down".to_string(),
            )
        })?;

    match rx.await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(conflict)) => Err(conflict_response(conflict)),
        Err(_) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            "Command reply dropped".to_string(),
        )),
    }
}

fn store_error(e: anyhow::Error) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
}

// === Handlers ===

async fn list_sessions(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<Vec<Session>>, (StatusCode, String)> {
    let db = state.db.lock().await;
    let sessions = SessionQueries::list(db.conn()).map_err(store_error)?;
    Ok(Json(sessions))
}

async fn get_session(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionDetail>, (StatusCode, String)> {
    let db = state.db.lock().await;

    let session = SessionQueries::get_by_id(db.conn(), &id)
        .map_err(store_error)?
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("unknown session: {id}")))?;

    let bundle = SnapshotQueries::latest_bundle(db.conn(), &id).map_err(store_error)?;
    let snapshot_count = SnapshotQueries::count_for_session(db.conn(), &id).map_err(store_error)?;

    let (latest_snapshot, restore_preview) = match bundle {
        Some(bundle) => {
            let actions = restore::plan(&bundle.windows, &bundle.tabs);
            (Some(bundle.snapshot), restore::preview(&actions))
        }
        None => (None, Vec::new()),
    };

    Ok(Json(SessionDetail {
        session,
        latest_snapshot,
        snapshot_count,
        restore_preview,
    }))
}

async fn confirm_name(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Json(req): Json<NameRequest>,
) -> Result<Json<Ack>, (StatusCode, String)> {
    send_command(&state, |reply| Command::ConfirmName {
        session_id: id,
        name: req.name,
        reply,
    })
    .await?;
    Ok(Json(Ack { success: true }))
}

async fn cancel_naming(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<Ack>, (StatusCode, String)> {
    send_command(&state, |reply| Command::CancelNaming {
        session_id: id,
        reply,
    })
    .await?;
    Ok(Json(Ack { success: true }))
}

async fn force_snapshot(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<Ack>, (StatusCode, String)> {
    send_command(&state, |reply| Command::ForceSnapshot {
        session_id: id,
        reply,
    })
    .await?;
    Ok(Json(Ack { success: true }))
}

async fn request_restore(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<RestoreReport>, (StatusCode, String)> {
    let report = send_command(&state, |reply| Command::RequestRestore {
        session_id: id,
        reply,
    })
    .await?;
    Ok(Json(report))
}

async fn delete_session(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<Ack>, (StatusCode, String)> {
    send_command(&state, |reply| Command::DeleteSession {
        session_id: id,
        reply,
    })
    .await?;
    Ok(Json(Ack { success: true }))
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_websocket(socket, state))
}

async fn handle_websocket(mut socket: axum::extract::ws::WebSocket, state: Arc<ServerState>) {
    use axum::extract::ws::Message;

    let mut rx = state.notify.subscribe();

    while let Ok(notification) = rx.recv().await {
        if let Ok(json) = serde_json::to_string(&notification) {
            if socket.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    }
}
