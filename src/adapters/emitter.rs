use tokio::sync::broadcast;
use tracing::debug;

use crate::domain::{EmittedEvent, EventEmitter, MockError};

const DEFAULT_CAPACITY: usize = 256;

/// In-process fan-out of emitted events. Subscribers that fall behind lose
/// the oldest events.
#[derive(Clone)]
pub struct BroadcastEmitter {
    sender: broadcast::Sender<EmittedEvent>,
}

impl BroadcastEmitter {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EmittedEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventEmitter for BroadcastEmitter {
    fn emit(&self, event: EmittedEvent) -> Result<(), MockError> {
        let channel = event.channel.clone();
        let name = event.event.clone();
        match self.sender.send(event) {
            Ok(receivers) => debug!("Emitted '{}' on '{}' to {} subscriber(s)", name, channel, receivers),
            // Nobody listening is not a failure
            Err(_) => debug!("Emitted '{}' on '{}' with no subscribers", name, channel),
        }
        Ok(())
    }
}
