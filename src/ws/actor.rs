use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::rooms::ConnectionId;
use crate::state::AppState;
use crate::ws::protocol::SignalMessage;
use crate::ws::Outbound;

/// Ping interval: server sends WebSocket ping every 30 seconds, so abrupt
/// peer loss cannot leak registry entries.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if pong not received within 10 seconds after ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the actor-per-connection pattern for one relay client.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, drains the connection's outbound queue,
///   applying the anti-echo check to relayed room events
/// - Reader loop (this task): parses inbound frames and fans them out to
///   the rest of the room
///
/// The transport delivers this connection's events sequentially: the reader
/// loop is the only consumer of inbound frames, so no two inbound callbacks
/// for the same connection ever race. Membership is registered before the
/// first read and removed unconditionally on the way out.
pub async fn run_connection(socket: WebSocket, state: AppState, room_name: String) {
    let conn_id = ConnectionId::new();
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Outbound>();

    state.rooms.join(&room_name, conn_id, tx.clone());

    tracing::info!(
        room = %room_name,
        conn = %conn_id.short(),
        "connection joined room"
    );

    // Spawn writer task: forwards queued frames to the WebSocket sink
    let writer_handle = tokio::spawn(writer_task(
        ws_sender,
        rx,
        conn_id,
        room_name.clone(),
    ));

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    // Spawn ping task: sends periodic pings and monitors pong responses
    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx
                .send(Outbound::Frame(Message::Ping(vec![1, 2, 3, 4].into())))
                .is_err()
            {
                // Writer task has died — connection is gone
                break;
            }

            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {
                    // Pong received, continue
                }
                _ => {
                    tracing::warn!("pong timeout, closing connection");
                    let _ = ping_tx.send(Outbound::Frame(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    }))));
                    break;
                }
            }
        }
    });

    // Reader loop: process incoming WebSocket frames
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    handle_text_frame(&state, &room_name, conn_id, text.as_str());
                }
                Message::Binary(_) => {
                    // The signaling protocol is text-only
                    tracing::debug!(
                        room = %room_name,
                        conn = %conn_id.short(),
                        "ignoring binary frame"
                    );
                }
                Message::Pong(_) => {
                    // Pong received — notify the ping task
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    // Respond to client pings with pong
                    let _ = tx.send(Outbound::Frame(Message::Pong(data)));
                }
                Message::Close(frame) => {
                    tracing::info!(
                        room = %room_name,
                        conn = %conn_id.short(),
                        reason = ?frame,
                        "client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    room = %room_name,
                    conn = %conn_id.short(),
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                // Stream ended — client disconnected
                tracing::info!(
                    room = %room_name,
                    conn = %conn_id.short(),
                    "WebSocket stream ended"
                );
                break;
            }
        }
    }

    // Cleanup: abort writer and ping tasks, then leave unconditionally.
    // Leave is a no-op if membership never existed, so this is safe on any
    // exit path.
    writer_handle.abort();
    ping_handle.abort();
    state.rooms.leave(&room_name, conn_id);

    tracing::info!(
        room = %room_name,
        conn = %conn_id.short(),
        "connection left room"
    );
}

/// Parse one inbound text frame and fan it out to the rest of the room.
///
/// A malformed frame (invalid JSON, or JSON that is not an object) is
/// logged and dropped; the connection stays open, nothing is relayed, and
/// the next frame is processed normally.
fn handle_text_frame(state: &AppState, room_name: &str, conn_id: ConnectionId, text: &str) {
    match SignalMessage::parse(text) {
        Ok(message) => {
            let kind = message.kind().to_string();
            let recipients = state.rooms.broadcast(room_name, conn_id, message);
            tracing::debug!(
                room = %room_name,
                conn = %conn_id.short(),
                kind = %kind,
                recipients,
                "relayed signal"
            );
        }
        Err(e) => {
            tracing::warn!(
                room = %room_name,
                conn = %conn_id.short(),
                error = %e,
                "dropping malformed frame"
            );
        }
    }
}

/// Writer task: drains the connection's outbound queue into the sink.
///
/// Relayed room events carry the sender's id; an event from this
/// connection itself is discarded silently (anti-echo). A sink failure is
/// logged and does not stop the task — the frame is lost best-effort and
/// later frames are still attempted until the reader loop tears the
/// connection down.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    conn_id: ConnectionId,
    room_name: String,
) {
    while let Some(out) = rx.recv().await {
        let frame = match out {
            Outbound::Event(event) => {
                if event.sender == conn_id {
                    // Anti-echo: never forward a message back to its sender
                    continue;
                }
                tracing::debug!(
                    room = %room_name,
                    conn = %conn_id.short(),
                    kind = %event.message.kind(),
                    "forwarding signal"
                );
                Message::Text(event.message.to_text().into())
            }
            Outbound::Frame(frame) => frame,
        };

        if let Err(e) = ws_sender.send(frame).await {
            tracing::warn!(
                room = %room_name,
                conn = %conn_id.short(),
                error = %e,
                "outbound send failed"
            );
        }
    }
}
