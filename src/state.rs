use crate::rooms::RoomRegistry;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Room membership registry: room name -> live member connections
    pub rooms: RoomRegistry,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        Self {
            rooms: RoomRegistry::new(),
        }
    }
}
