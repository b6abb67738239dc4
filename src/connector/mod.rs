//! Source and destination connectors: the engine's boundary with the
//! outside world.
//!
//! A [`SourceConnector`] hands inbound bytes to the channel pipeline and,
//! if configured, receives the selected response back. A
//! [`DestinationConnector`] sends a message's content somewhere and
//! reports the resulting [`ConnectorStatus`].

pub mod destination;
pub mod source;

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

use crate::domain::source_map::SourceMap;
use crate::domain_types::{ChannelId, ConnectorStatus, MessageId};
use crate::error::{EngineError, TransportError};

/// Bytes and metadata handed from a source connector to the channel
/// pipeline for one inbound message.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub raw: Vec<u8>,
    pub data_type: Option<String>,
    /// Provenance chain this message carries. The root sentinel
    /// (`SourceMap::default()`) for messages arriving from outside the
    /// engine; a hop appended by `VmDestination::send` for messages
    /// forwarded between channels.
    pub source_map: SourceMap,
}

/// Where a running source connector is actually listening, reported back
/// to the engine for status display (e.g. the REST API's channel detail
/// view).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerInfo {
    pub address: String,
}

/// Hands an inbound message to a channel's pipeline and resolves once the
/// channel has produced (and, where configured, response-transformed) the
/// content that should be written back to the connector's caller.
///
/// A source connector that wants to reply synchronously (HTTP's response
/// body, MLLP's ACK frame) awaits this future instead of fabricating a
/// fixed acknowledgement.
pub type MessageHandler = Arc<
    dyn Fn(InboundMessage) -> BoxFuture<'static, Result<Vec<u8>, EngineError>> + Send + Sync,
>;

/// A connector that accepts inbound messages and feeds them to a channel.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Starts listening, handing every accepted message to `handler` and
    /// relaying whatever it resolves to back to the connector's caller.
    /// Returns once the listener is bound and ready to accept traffic.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the connector fails to bind or start.
    async fn start(&self, handler: MessageHandler) -> Result<ListenerInfo, TransportError>;

    /// Stops accepting new messages. In-flight deliveries already handed
    /// to the channel are not affected.
    async fn stop(&self);
}

/// Shared context for one message's destination dispatch: which channel
/// and message this is, plus the provenance chain a VM hop needs to
/// extend before handing the message to the next channel.
#[derive(Debug, Clone)]
pub struct DestinationContext {
    pub channel: ChannelId,
    pub message_id: MessageId,
    pub source_map: SourceMap,
}

/// The result of one destination send: the status to record, and, when
/// the destination captured one, the raw response bytes it got back.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub status: ConnectorStatus,
    pub response: Option<Vec<u8>>,
}

/// A connector that delivers a message's content somewhere and reports
/// how it went.
#[async_trait]
pub trait DestinationConnector: Send + Sync {
    /// Sends `content`, returning the resulting status and, when
    /// available, the remote's response.
    ///
    /// Implementations never panic on a remote failure; they return
    /// `ConnectorStatus::Error` (synchronous destinations) or
    /// `ConnectorStatus::Queued` (queued destinations) instead, and
    /// propagate [`TransportError`] only for failures in the connector
    /// itself (misconfiguration, not a remote rejection).
    async fn send(
        &self,
        context: &DestinationContext,
        content: &[u8],
    ) -> Result<SendOutcome, TransportError>;
}
