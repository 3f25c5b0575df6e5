//! WebSocket transport for remote panels.
//!
//! Each WebSocket connection becomes the panel side of a fresh bridge pair:
//! JSON text frames are decoded into [`PanelMessage`]s and agent messages are
//! encoded back as JSON. The agent end is attached to the host for the life
//! of the socket.

use std::{sync::Arc, time::Duration};

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::{
    bridge::{Bridge, BridgeHost},
    protocol::{AgentMessage, Channel, PanelMessage},
};

/// How long a closing socket may take to flush queued messages.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// WebSocket handler state.
pub struct WsState<H> {
    /// Host serving the agent side.
    pub host: Arc<H>,
}

impl<H> Clone for WsState<H> {
    fn clone(&self) -> Self {
        Self {
            host: Arc::clone(&self.host),
        }
    }
}

impl<H> WsState<H> {
    /// Create new WebSocket state.
    #[must_use]
    pub const fn new(host: Arc<H>) -> Self {
        Self { host }
    }
}

/// WebSocket upgrade handler.
///
/// Use this as an Axum route handler.
pub async fn ws_handler<H: BridgeHost>(
    ws: WebSocketUpgrade,
    State(state): State<WsState<H>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket<H: BridgeHost>(socket: WebSocket, state: WsState<H>) {
    let (mut sender, mut receiver) = socket.split();
    let (agent_end, panel_end) = Bridge::pair();

    // Channel for sending messages to the client
    let (tx, mut rx) = mpsc::unbounded_channel::<AgentMessage>();
    let subscriptions: Vec<_> = Channel::AGENT_TO_PANEL
        .into_iter()
        .map(|channel| {
            let tx = tx.clone();
            panel_end.subscribe(channel, move |msg| {
                let _ = tx.send(msg);
            })
        })
        .collect();
    drop(tx);

    let connection = state.host.attach(agent_end);
    tracing::info!(%connection, "panel connected");

    // Forward agent messages until every subscription is gone, then close.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!("Failed to serialize message: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                return;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    // Handle incoming messages until the client leaves or the host lets go
    // of the agent end.
    let agent_link = panel_end.outbox();
    loop {
        let msg = tokio::select! {
            msg = receiver.next() => msg,
            () = agent_link.closed() => {
                tracing::debug!(%connection, "agent endpoint dropped, closing socket");
                break;
            }
        };

        let text = match msg {
            Some(Ok(Message::Text(text))) => text.as_str().to_string(),
            Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s,
                Err(_) => continue,
            },
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::error!("WebSocket error: {e}");
                break;
            }
        };

        let panel_msg: PanelMessage = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("Invalid panel message: {e}");
                continue;
            }
        };

        if panel_end.send(panel_msg).is_err() {
            tracing::debug!(%connection, "agent endpoint dropped, closing socket");
            break;
        }
    }

    // Dropping the subscriptions ends the send task after it flushes.
    drop(subscriptions);
    drop(panel_end);
    let abort = send_task.abort_handle();
    if tokio::time::timeout(CLOSE_TIMEOUT, send_task).await.is_err() {
        abort.abort();
    }
    state.host.detach(connection);
    tracing::info!(%connection, "panel disconnected");
}

/// Create WebSocket router serving `/ws`.
///
/// # Example
/// ```ignore
/// let app = Router::new()
///     .merge(create_ws_router(agent));
/// ```
#[must_use]
pub fn create_ws_router<H: BridgeHost>(host: Arc<H>) -> axum::Router {
    axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler::<H>))
        .with_state(WsState::new(host))
}
