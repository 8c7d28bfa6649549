use tokio::sync::broadcast;

use crate::dto::ui::UiEvent;

/// Broadcast hub fanning a client's UI events out to its renderers.
#[derive(Clone)]
pub struct UiHub {
    sender: broadcast::Sender<UiEvent>,
}

impl UiHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.sender.subscribe()
    }

    /// Send an event to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, event: UiEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for UiHub {
    fn default() -> Self {
        Self::new(64)
    }
}
