//! Room membership: the mapping from room names to the connections
//! currently joined to them, plus the types carried by a fan-out.

pub mod registry;

pub use registry::RoomRegistry;

use std::fmt;
use uuid::Uuid;

use crate::ws::protocol::SignalMessage;

/// Process-unique identifier for one live connection.
///
/// Generated at accept time (UUIDv7) and stable for the connection's
/// lifetime; never reused, so a stale id held by an in-flight broadcast can
/// never alias a newer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Truncated form for log lines.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One relayed message together with the identifier of the connection that
/// sent it, so each recipient can apply the anti-echo rule without access
/// to the sender's transport internals.
#[derive(Debug, Clone)]
pub struct RoomEvent {
    pub sender: ConnectionId,
    pub message: SignalMessage,
}
