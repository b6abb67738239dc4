//! Destination connector implementations.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, AsyncReadExt};
use tokio::net::TcpStream;
use tracing::instrument;

use crate::connector::{DestinationConnector, DestinationContext, InboundMessage, SendOutcome};
use crate::domain_types::{ChannelId, ConnectorStatus};
use crate::error::TransportError;
use crate::vm_router::VmRouter;

/// HTTP destination: POSTs the message content to a fixed URL.
pub struct HttpDestination {
    pub client: reqwest::Client,
    pub url: String,
}

#[async_trait]
impl DestinationConnector for HttpDestination {
    #[instrument(skip(self, _context, content))]
    async fn send(
        &self,
        _context: &DestinationContext,
        content: &[u8],
    ) -> Result<SendOutcome, TransportError> {
        let response = self
            .client
            .post(&self.url)
            .body(content.to_vec())
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        let status = response.status().is_success();
        let body = response.bytes().await.ok().map(|b| b.to_vec());
        Ok(SendOutcome {
            status: if status { ConnectorStatus::Sent } else { ConnectorStatus::Error },
            response: body,
        })
    }
}

/// File destination: writes each message as its own file in a directory.
pub struct FileDestination {
    pub directory: PathBuf,
    pub file_name: String,
}

#[async_trait]
impl DestinationConnector for FileDestination {
    #[instrument(skip(self, _context, content))]
    async fn send(
        &self,
        _context: &DestinationContext,
        content: &[u8],
    ) -> Result<SendOutcome, TransportError> {
        tokio::fs::create_dir_all(&self.directory).await.map_err(TransportError::Io)?;
        let path = self.directory.join(&self.file_name);
        tokio::fs::write(&path, content).await.map_err(TransportError::Io)?;
        Ok(SendOutcome { status: ConnectorStatus::Sent, response: None })
    }
}

/// MLLP destination: opens a TCP connection, writes one framed message,
/// and waits for the ACK frame.
pub struct MllpDestination {
    pub address: String,
}

#[async_trait]
impl DestinationConnector for MllpDestination {
    #[instrument(skip(self, _context, content))]
    async fn send(
        &self,
        _context: &DestinationContext,
        content: &[u8],
    ) -> Result<SendOutcome, TransportError> {
        let mut stream = TcpStream::connect(&self.address).await.map_err(TransportError::Io)?;
        let mut framed = Vec::with_capacity(content.len() + 3);
        framed.push(0x0B);
        framed.extend_from_slice(content);
        framed.push(0x1C);
        framed.push(0x0D);
        stream.write_all(&framed).await.map_err(TransportError::Io)?;

        let mut ack = [0u8; 3];
        match stream.read_exact(&mut ack).await {
            Ok(_) => Ok(SendOutcome { status: ConnectorStatus::Sent, response: Some(ack.to_vec()) }),
            Err(_) => Ok(SendOutcome { status: ConnectorStatus::Queued, response: None }),
        }
    }
}

/// VM destination: dispatches directly to another deployed channel.
pub struct VmDestination {
    pub router: Arc<VmRouter>,
    pub target_name: String,
    pub target_channel: ChannelId,
}

#[async_trait]
impl DestinationConnector for VmDestination {
    #[instrument(skip(self, context, content))]
    async fn send(
        &self,
        context: &DestinationContext,
        content: &[u8],
    ) -> Result<SendOutcome, TransportError> {
        let source_map = context.source_map.extend_for_hop(context.channel, context.message_id);
        let message = InboundMessage { raw: content.to_vec(), data_type: None, source_map };
        let response = self
            .router
            .dispatch(&self.target_name, self.target_channel, message)
            .await?;
        Ok(SendOutcome { status: ConnectorStatus::Sent, response: Some(response) })
    }
}

/// Wraps another destination with a reconnect-and-retry loop: on a
/// non-`Sent` outcome, waits `reconnect_interval` and tries again, up to
/// `max_attempts` total attempts. Reports `Queued` if every attempt
/// failed, rather than surfacing the underlying error, so a flaky
/// destination degrades the message's status instead of the channel.
pub struct QueuedDestination {
    pub inner: Arc<dyn DestinationConnector>,
    pub max_attempts: u32,
    pub reconnect_interval: Duration,
}

#[async_trait]
impl DestinationConnector for QueuedDestination {
    #[instrument(skip(self, context, content))]
    async fn send(
        &self,
        context: &DestinationContext,
        content: &[u8],
    ) -> Result<SendOutcome, TransportError> {
        let attempts = self.max_attempts.max(1);
        for attempt in 1..=attempts {
            let is_last = attempt == attempts;
            match self.inner.send(context, content).await {
                Ok(outcome) if outcome.status == ConnectorStatus::Sent => return Ok(outcome),
                Ok(outcome) if is_last => return Ok(outcome),
                Err(error) if is_last => return Err(error),
                _ => tokio::time::sleep(self.reconnect_interval).await,
            }
        }
        Ok(SendOutcome { status: ConnectorStatus::Queued, response: None })
    }
}
