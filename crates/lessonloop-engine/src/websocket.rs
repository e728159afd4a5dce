//! WebSocket streaming of session events.
//!
//! A client connecting to `/api/sessions/:id/events` first receives a
//! `connected` event carrying the session snapshot, then every event the
//! session publishes until either side goes away. Ending the session closes
//! the connection.

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::api::{ApiError, AppState};
use crate::events::{SessionEvent, SessionSnapshot};

/// Interval between heartbeat pings.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum number of missed pong responses before disconnecting.
const MAX_MISSED_PONGS: u8 = 3;

/// WebSocket upgrade handler for `GET /api/sessions/:id/events`.
///
/// Unknown sessions are rejected with 404 before the upgrade.
pub(crate) async fn session_events(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let session = state.session(&id).await?;

    // Subscribe and snapshot under the same lock so no event falls between.
    let (snapshot, events) = {
        let session = session.lock().await;
        (session.snapshot(), session.subscribe())
    };

    info!(session_id = %id, "New WebSocket connection request");
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, snapshot, events)))
}

/// Handles a single WebSocket connection.
///
/// - Sends `connected` with the snapshot immediately
/// - Forwards every session event to the client
/// - Sends heartbeat pings every 30 seconds
/// - Closes the connection after 3 missed pongs
async fn handle_socket(
    socket: WebSocket,
    snapshot: SessionSnapshot,
    mut events: broadcast::Receiver<SessionEvent>,
) {
    let (mut sender, mut receiver) = socket.split();
    let session_id = snapshot.session_id.clone();

    let connected_json = match serde_json::to_string(&SessionEvent::connected(snapshot)) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "Failed to serialize connected event");
            return;
        }
    };

    if sender.send(Message::Text(connected_json)).await.is_err() {
        debug!("Client disconnected before receiving connected event");
        return;
    }

    info!(session_id = %session_id, "WebSocket client connected, sent snapshot");

    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    // The first tick completes immediately; skip it so the first ping waits.
    heartbeat.tick().await;
    let mut missed_pongs = 0u8;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        missed_pongs = 0;
                        debug!("Received pong from client");
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!(session_id = %session_id, "Client requested close");
                        break;
                    }
                    Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                        debug!("Ignoring data message from client");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            debug!("Failed to send pong, client disconnected");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!(error = %e, "WebSocket error");
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }

            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let json = match serde_json::to_string(&event) {
                            Ok(j) => j,
                            Err(e) => {
                                warn!(error = %e, "Failed to serialize event");
                                continue;
                            }
                        };

                        if sender.send(Message::Text(json)).await.is_err() {
                            debug!("Failed to send event, client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(session_id = %session_id, missed = n, "Client lagged behind session events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!(session_id = %session_id, "Session ended, closing connection");
                        if sender.send(Message::Close(None)).await.is_err() {
                            debug!("Client already gone");
                        }
                        break;
                    }
                }
            }

            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    debug!("Failed to send ping, client disconnected");
                    break;
                }
                missed_pongs += 1;
                if missed_pongs >= MAX_MISSED_PONGS {
                    info!(session_id = %session_id, "Client missed {} pongs, closing connection", MAX_MISSED_PONGS);
                    break;
                }
            }
        }
    }

    info!(session_id = %session_id, "WebSocket client disconnected");
}
