//! Server→client fan-out over WebSocket, one room per quiz date. Events are
//! produced by the FSM entry point and the advancement loop; this module
//! owns the per-connection lifecycle.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{
    clock::QuizDate,
    dto::ws::QuizRoomEvent,
    services::observability,
    state::{SharedState, lifecycle::QuizState},
    utils::jwt::Claims,
};

/// Seconds before expiry at which a token triggers the reauth prompt.
const REAUTH_WINDOW_SECONDS: i64 = 60;

/// Handle the full lifecycle for one subscriber of a date's room.
pub async fn handle_socket(
    state: SharedState,
    socket: WebSocket,
    date: QuizDate,
    claims: Claims,
) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we
    // await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let mut events = state.rooms().room(date).subscribe();
    observability::record_ws_event(&state, date, true).await;
    info!(%date, user_id = %claims.sub, "quiz room subscriber connected");

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if !forward_event(&state, &claims, &event, &outbound_tx) {
                            break;
                        }
                        if is_terminal(&event) {
                            let _ = outbound_tx.send(Message::Close(None));
                            break;
                        }
                    }
                    Err(RecvError::Closed) => {
                        // Room torn down at a terminal state: force-leave.
                        let _ = outbound_tx.send(Message::Close(None));
                        break;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(%date, skipped, "subscriber lagged behind room events");
                    }
                }
            }
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = outbound_tx.send(Message::Pong(payload));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let _ = outbound_tx.send(Message::Close(frame));
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(%date, error = %err, "websocket error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    observability::record_ws_event(&state, date, false).await;
    info!(%date, user_id = %claims.sub, "quiz room subscriber disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Push one event, revalidating the token on critical events. Returns false
/// when the connection should terminate.
fn forward_event(
    state: &SharedState,
    claims: &Claims,
    event: &QuizRoomEvent,
    tx: &mpsc::UnboundedSender<Message>,
) -> bool {
    if is_critical(event) {
        let now = state.clock().now();
        if claims.exp <= now.timestamp() {
            let _ = tx.send(Message::Close(None));
            return false;
        }
        if claims.expires_within(now, REAUTH_WINDOW_SECONDS) {
            // Prompt, deliver the pending event, then disconnect.
            send_json(tx, &QuizRoomEvent::Reauth);
            send_json(tx, event);
            let _ = tx.send(Message::Close(None));
            return false;
        }
    }

    send_json(tx, event);
    true
}

fn send_json(tx: &mpsc::UnboundedSender<Message>, event: &QuizRoomEvent) {
    match serde_json::to_string(event) {
        Ok(payload) => {
            let _ = tx.send(Message::Text(payload.into()));
        }
        Err(err) => {
            // Serialization failure is a code bug, not a transport problem.
            warn!(error = %err, "failed to serialize room event");
        }
    }
}

fn is_critical(event: &QuizRoomEvent) -> bool {
    matches!(
        event,
        QuizRoomEvent::QuizStateChanged { .. } | QuizRoomEvent::QuizEnded { .. }
    )
}

fn is_terminal(event: &QuizRoomEvent) -> bool {
    match event {
        QuizRoomEvent::QuizEnded { .. } => true,
        QuizRoomEvent::QuizStateChanged { to, .. } => {
            matches!(
                to,
                QuizState::Ended | QuizState::Finalized | QuizState::ResultPublished
            )
        }
        _ => false,
    }
}

/// Ensure the writer task winds down before we return from the handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
