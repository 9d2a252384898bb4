//! The `/api/ws` endpoint and the static-asset router.

use std::path::Path;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_http::services::ServeDir;

use crate::frames::WsRequest;
use crate::supervisor::Supervisor;

#[derive(Clone)]
struct AppState {
    supervisor: Arc<Supervisor>,
}

pub fn router(supervisor: Arc<Supervisor>, static_dir: &Path) -> Router {
    Router::new()
        .route("/api/ws", get(ws_handler))
        .fallback_service(ServeDir::new(static_dir).append_index_html_on_directories(true))
        .with_state(AppState { supervisor })
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.supervisor))
}

/// One connection: register with the notifier, push the initial snapshot,
/// then loop over subscription requests until the client goes away or sends
/// something unparseable.
async fn handle_socket(socket: WebSocket, supervisor: Arc<Supervisor>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let subscriber = supervisor.notifier().register(tx);

    // Outbound frames flow through the notifier channel so a slow socket
    // never blocks dispatch for other subscribers.
    let writer = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if sink.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    if let Err(e) = supervisor.send_initial_snapshot(subscriber).await {
        tracing::warn!(subscriber, error = %e, "Initial snapshot failed");
    }

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<WsRequest>(&text) {
                Ok(request) => {
                    supervisor
                        .set_game_and_ply(subscriber, request.game_id, request.ply)
                        .await;
                }
                Err(e) => {
                    tracing::warn!(subscriber, error = %e, "Malformed request, closing");
                    break;
                }
            },
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    supervisor.notifier().unregister(subscriber);
    writer.abort();
    tracing::debug!(subscriber, "Connection closed");
}
