//! In-process dispatch between deployed channels.
//!
//! A VM destination hands its content directly to another channel's
//! `process` pipeline, skipping the network entirely, and gets the real
//! response back. The router is a single shared table from channel name
//! to that channel's message handler, populated when a
//! [`crate::connector::source::VmSource`] starts and removed when it
//! stops.

use dashmap::DashMap;

use crate::connector::{InboundMessage, MessageHandler};
use crate::domain_types::ChannelId;
use crate::error::TransportError;

/// Shared dispatch table for VM connectors.
#[derive(Default)]
pub struct VmRouter {
    routes: DashMap<String, MessageHandler>,
}

impl VmRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` as a dispatch target, replacing any prior
    /// registration (a redeploy replaces the handler without downtime for
    /// other channels still holding the old one as an Arc).
    pub fn register(&self, name: String, handler: MessageHandler) {
        self.routes.insert(name, handler);
    }

    /// Removes a channel's registration, e.g. on undeploy.
    pub fn unregister(&self, name: &str) {
        self.routes.remove(name);
    }

    /// Dispatches `message` to the channel named `target`, returning the
    /// real content it produced.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connection`] if no channel by that name
    /// is currently registered, or if the target channel's own processing
    /// fails.
    pub async fn dispatch(
        &self,
        target: &str,
        target_channel: ChannelId,
        message: InboundMessage,
    ) -> Result<Vec<u8>, TransportError> {
        let handler = self.routes.get(target).map(|entry| entry.value().clone()).ok_or_else(|| {
            TransportError::Connection(format!(
                "no channel named {target} (channel {target_channel}) is registered for VM dispatch"
            ))
        })?;
        handler(message).await.map_err(|e| TransportError::Connection(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::source_map::SourceMap;
    use futures::future::BoxFuture;
    use std::sync::Arc;

    fn echo_handler() -> MessageHandler {
        Arc::new(|message: InboundMessage| -> BoxFuture<'static, Result<Vec<u8>, crate::error::EngineError>> {
            Box::pin(async move { Ok(message.raw) })
        })
    }

    #[tokio::test]
    async fn dispatch_to_an_unregistered_channel_fails() {
        let router = VmRouter::new();
        let message = InboundMessage {
            raw: b"hi".to_vec(),
            data_type: None,
            source_map: SourceMap::default(),
        };
        let result = router.dispatch("nowhere", ChannelId::generate(), message).await;
        assert!(matches!(result, Err(TransportError::Connection(_))));
    }

    #[tokio::test]
    async fn dispatch_delivers_to_a_registered_channel() {
        let router = VmRouter::new();
        router.register("target".to_string(), echo_handler());

        let message = InboundMessage {
            raw: b"hi".to_vec(),
            data_type: None,
            source_map: SourceMap::default(),
        };
        let response = router.dispatch("target", ChannelId::generate(), message).await.unwrap();

        assert_eq!(response, b"hi");
    }
}
