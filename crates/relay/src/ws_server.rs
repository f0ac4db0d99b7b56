//! WebSocket server handler using Axum.

use crate::client::{ClientRegistry, ClientState};
use crate::protocol::{ServerMessage, GREETING};
use crate::router::LampRouter;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::{Html, IntoResponse, Response},
    Router,
};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

/// Landing page served to plain HTTP requests.
const INDEX_HTML: &str = include_str!("../static/index.html");

/// Shared application state.
pub struct AppState {
    pub registry: Arc<ClientRegistry>,
    pub router: Arc<LampRouter>,
}

/// Create the HTTP router. Lamps and dashboards upgrade on whichever path
/// their firmware was built with, so every path accepts the handshake;
/// plain requests get the landing page.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .fallback(root_handler)
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Upgrade WebSocket handshakes; serve the landing page to everything else.
async fn root_handler(
    ws: Option<WebSocketUpgrade>,
    State(state): State<Arc<AppState>>,
) -> Response {
    match ws {
        Some(ws) => ws
            .on_upgrade(|socket| handle_socket(socket, state))
            .into_response(),
        None => Html(INDEX_HTML).into_response(),
    }
}

/// Handle a WebSocket connection from admission to unregistration.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    // Split the socket into sender and receiver
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Create unbounded channel for outgoing messages
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    // Create client state
    let client = Arc::new(ClientState::new(tx));
    let client_id = state.registry.register(client.clone());

    counter!("relay_connections_total").increment(1);
    gauge!("relay_active_connections").set(state.registry.client_count() as f64);

    info!("Client connected - id {}", client_id);

    // Spawn task to forward messages from channel to WebSocket.
    // A queued close frame ends the stream after it is written out.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if ws_tx.send(msg).await.is_err() || closing {
                break;
            }
        }
    });

    // Welcome notice goes only to the new client; no groupmates are known yet.
    if client.send(&ServerMessage::notice(GREETING)).is_err() {
        warn!("Failed to send welcome notice to {}", client_id);
    }

    // Handle incoming messages until the peer closes or the sweeper
    // terminates us.
    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(msg)) => handle_message(&state, &client, msg),
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {:?}", client_id, e);
                        break;
                    }
                    None => {
                        // Connection closed
                        break;
                    }
                }
            }

            _ = client.wait_closed() => {
                break;
            }
        }
    }

    // Cleanup
    state.registry.unregister(&client_id);
    send_task.abort();

    counter!("relay_disconnections_total").increment(1);
    gauge!("relay_active_connections").set(state.registry.client_count() as f64);

    info!("Client disconnected - id {}", client_id);
}

/// Handle a single WebSocket frame.
fn handle_message(state: &Arc<AppState>, client: &Arc<ClientState>, msg: Message) {
    match msg {
        Message::Text(text) => route_payload(state, client, text.as_bytes()),
        Message::Binary(data) => route_payload(state, client, &data),
        Message::Ping(data) => {
            client.mark_alive();
            let _ = client.send_raw(Message::Pong(data));
        }
        Message::Pong(_) => {
            // The probe sent by the liveness sweep came back.
            client.mark_alive();
        }
        Message::Close(_) => {
            // Will be handled by the connection loop
        }
    }
}

/// Parse and route an application payload. Malformed payloads are dropped
/// with a diagnostic; the connection stays up.
fn route_payload(state: &Arc<AppState>, client: &Arc<ClientState>, payload: &[u8]) {
    if let Err(e) = state.router.route_update(client, payload) {
        warn!("Dropping malformed payload from {}: {}", client.id, e);
        counter!("relay_malformed_payloads_total").increment(1);
    }
}
