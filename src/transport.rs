//! WebSocket front end.
//!
//! Each connection gets a reader loop (this task) and a writer task that
//! drains the session's outbox. Everything a client sends is forwarded to
//! the coordinator, including the error for a frame that does not parse, so
//! the coordinator stays the only writer to the outbox. The connection ends
//! when the coordinator drops the session.

use crate::coordinator::{CoordinatorHandle, SessionId, SessionLink};
use crate::protocol::{ClientMessage, ServerMessage};
use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// Routes: WebSocket at `/` and `/ws`, JSON state at `/state`.
pub fn router(handle: CoordinatorHandle) -> Router {
    Router::new()
        .route("/", get(upgrade))
        .route("/ws", get(upgrade))
        .route("/state", get(state))
        .with_state(handle)
}

/// Serves `router(handle)` on `listener` until the future is dropped.
#[instrument(skip_all, fields(addr = ?listener.local_addr().ok()))]
pub async fn serve(listener: TcpListener, handle: CoordinatorHandle) -> std::io::Result<()> {
    info!("Accepting WebSocket connections");
    axum::serve(listener, router(handle)).await
}

async fn upgrade(ws: WebSocketUpgrade, State(handle): State<CoordinatorHandle>) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, handle))
}

async fn state(State(handle): State<CoordinatorHandle>) -> Response {
    match handle.snapshot().await {
        Ok(snapshot) => axum::Json(snapshot).into_response(),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}

#[instrument(skip_all)]
async fn serve_socket(socket: WebSocket, handle: CoordinatorHandle) {
    let SessionLink { id, outbox } = match handle.connect().await {
        Ok(link) => link,
        Err(e) => {
            warn!(error = %e, "Refusing connection");
            return;
        }
    };
    info!(session_id = id, "Client connected");

    let (sink, mut frames) = socket.split();
    let mut writer = tokio::spawn(write_outbox(id, sink, outbox));

    loop {
        tokio::select! {
            frame = frames.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if !forward(&handle, id, text.as_str()).await {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => debug!(session_id = id, "Ignoring non-text frame"),
                Some(Err(e)) => {
                    debug!(session_id = id, error = %e, "Connection lost");
                    break;
                }
            },
            _ = &mut writer => {
                debug!(session_id = id, "Writer finished");
                break;
            }
        }
    }

    if handle.disconnect(id).await.is_err() {
        debug!(session_id = id, "Coordinator already stopped");
    }
    writer.abort();
    info!(session_id = id, "Client disconnected");
}

/// Hands one text frame to the coordinator. False once the coordinator is
/// gone.
async fn forward(handle: &CoordinatorHandle, id: SessionId, text: &str) -> bool {
    match ClientMessage::parse(text) {
        Ok(message) => handle.submit(id, message).await.is_ok(),
        Err(e) => {
            debug!(session_id = id, error = %e, "Unparseable frame");
            handle
                .notify(id, ServerMessage::error("Invalid message format"))
                .await
                .is_ok()
        }
    }
}

async fn write_outbox(
    id: SessionId,
    mut sink: futures::stream::SplitSink<WebSocket, Message>,
    mut outbox: mpsc::Receiver<ServerMessage>,
) {
    while let Some(message) = outbox.recv().await {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!(session_id = id, error = %e, "Failed to encode message");
                continue;
            }
        };
        if sink.send(Message::Text(text.into())).await.is_err() {
            debug!(session_id = id, "Socket closed while writing");
            return;
        }
    }
}
