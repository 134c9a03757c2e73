pub mod actor;
pub mod handler;
pub mod protocol;

use tokio::sync::mpsc;

use crate::rooms::RoomEvent;

/// Frames queued to one connection's writer task.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// A relayed room event; the writer applies the anti-echo check and
    /// serializes the payload before sending.
    Event(RoomEvent),
    /// A raw WebSocket frame (ping, pong, close) sent as-is.
    Frame(axum::extract::ws::Message),
}

/// Type alias for the sender half of a connection's outbound queue.
/// The room registry holds a clone for every member; the writer task owns
/// the receiving end, so no task ever touches another connection's socket.
pub type ConnectionSender = mpsc::UnboundedSender<Outbound>;
