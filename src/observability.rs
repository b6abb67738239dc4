//! Channel runtime events, broadcast to any number of independent
//! subscribers (a dashboard, a cluster peer, a test harness).
//!
//! A `tokio::sync::broadcast` channel is used instead of an
//! `mpsc::UnboundedSender` because every subscriber must see every event
//! independently — there is no single consumer draining the queue.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::domain::channel_state::ChannelState;
use crate::domain_types::{ChannelId, ConnectorStatus, MessageId, MetaDataId};

/// A structured event emitted as a channel or its messages change state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChannelEvent {
    StateChanged { channel: ChannelId, from: ChannelState, to: ChannelState },
    MessageReceived { channel: ChannelId, message_id: MessageId },
    ConnectorStatusChanged {
        channel: ChannelId,
        message_id: MessageId,
        metadata_id: MetaDataId,
        status: ConnectorStatus,
    },
    MessageCompleted { channel: ChannelId, message_id: MessageId },
}

/// Default broadcast channel capacity: enough to absorb a burst without
/// blocking the pipeline, per subscriber. A slow subscriber that falls
/// behind this far only loses its own oldest events (`RecvError::Lagged`),
/// never the pipeline's throughput.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Shared event bus for one engine instance.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ChannelEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _receiver) = broadcast::channel(DEFAULT_EVENT_CAPACITY);
        Self { sender }
    }

    /// Subscribes to every future event.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event. Returns silently if there are no subscribers.
    pub fn publish(&self, event: ChannelEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
