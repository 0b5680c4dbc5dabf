use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::models::actor::Actor;
use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    actor: Actor,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, actor))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, actor: Actor) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.events.subscribe();

    info!(user_id = %actor.id, role = ?actor.role, "websocket client connected");

    let send_task = tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "websocket client lagged behind event feed");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if !event.room.admits(&actor) {
                continue;
            }

            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize event for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    join_first(send_task, recv_task).await;

    info!(user_id = %actor.id, "websocket client disconnected");
}

/// Waits for whichever task ends first and aborts the other.
async fn join_first<A, B>(mut first: JoinHandle<A>, mut second: JoinHandle<B>) {
    tokio::select! {
        _ = &mut first => second.abort(),
        _ = &mut second => first.abort(),
    }
}
