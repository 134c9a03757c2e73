use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};

use crate::state::AppState;
use crate::ws::actor;

/// Close code for a room name outside the allowed charset.
const CLOSE_BAD_ROOM: u16 = 4404;

/// GET /ws/{room_name}
/// Anonymous WebSocket relay endpoint — no authentication, the room name in
/// the path is the only routing input. An invalid room name upgrades then
/// immediately closes with a policy close code; a valid one hands the
/// socket to the connection actor.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Path(room_name): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    if !is_valid_room_name(&room_name) {
        tracing::warn!(room = %room_name, "rejecting invalid room name");
        return ws.on_upgrade(move |mut socket| async move {
            let close_frame = CloseFrame {
                code: CLOSE_BAD_ROOM,
                reason: "Invalid room name".into(),
            };
            let _ = socket.send(Message::Close(Some(close_frame))).await;
        });
    }

    ws.on_upgrade(move |socket| actor::run_connection(socket, state, room_name))
}

/// Room names follow the `[\w-]+` URL-route pattern: ASCII alphanumerics,
/// underscore, and hyphen, at least one character.
fn is_valid_room_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
