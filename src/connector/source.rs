//! Source connector implementations.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::routing::post;
use axum::Router;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{instrument, warn};

use crate::connector::{InboundMessage, ListenerInfo, MessageHandler, SourceConnector};
use crate::domain::source_map::SourceMap;
use crate::error::TransportError;
use crate::vm_router::VmRouter;

/// HTTP source: a single POST endpoint accepting the request body as the
/// raw message and replying with whatever content the channel selected.
pub struct HttpSource {
    pub bind_address: String,
}

#[async_trait]
impl SourceConnector for HttpSource {
    #[instrument(skip(self, handler))]
    async fn start(&self, handler: MessageHandler) -> Result<ListenerInfo, TransportError> {
        let addr: SocketAddr = self
            .bind_address
            .parse()
            .map_err(|e| TransportError::Connection(format!("invalid bind address: {e}")))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::Io)?;
        let local_addr = listener.local_addr().map_err(TransportError::Io)?;

        let app = Router::new().route("/", post(receive)).with_state(handler);

        tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                warn!(%err, "HTTP source listener terminated");
            }
        });

        Ok(ListenerInfo { address: local_addr.to_string() })
    }

    async fn stop(&self) {
        // The listener task is dropped with its JoinHandle when the
        // channel is undeployed; no separate shutdown signal is needed
        // for the simple POST-only source.
    }
}

async fn receive(
    State(handler): State<MessageHandler>,
    body: axum::body::Bytes,
) -> (axum::http::StatusCode, Vec<u8>) {
    let message = InboundMessage {
        raw: body.to_vec(),
        data_type: None,
        source_map: SourceMap::default(),
    };
    match handler(message).await {
        Ok(response) => (axum::http::StatusCode::OK, response),
        Err(err) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, err.to_string().into_bytes()),
    }
}

/// MLLP source: a raw TCP listener framing each message between `0x0B`
/// (start block) and `0x1C 0x0D` (end block + carriage return), per HL7's
/// minimal lower layer protocol.
pub struct MllpSource {
    pub bind_address: String,
}

const START_BLOCK: u8 = 0x0B;
const END_BLOCK: u8 = 0x1C;
const CARRIAGE_RETURN: u8 = 0x0D;

#[async_trait]
impl SourceConnector for MllpSource {
    #[instrument(skip(self, handler))]
    async fn start(&self, handler: MessageHandler) -> Result<ListenerInfo, TransportError> {
        let addr: SocketAddr = self
            .bind_address
            .parse()
            .map_err(|e| TransportError::Connection(format!("invalid bind address: {e}")))?;
        let listener = TcpListener::bind(addr).await.map_err(TransportError::Io)?;
        let local_addr = listener.local_addr().map_err(TransportError::Io)?;

        tokio::spawn(async move {
            loop {
                let Ok((stream, _peer)) = listener.accept().await else { break };
                let handler = Arc::clone(&handler);
                tokio::spawn(handle_mllp_connection(stream, handler));
            }
        });

        Ok(ListenerInfo { address: local_addr.to_string() })
    }

    async fn stop(&self) {}
}

async fn handle_mllp_connection(mut stream: TcpStream, handler: MessageHandler) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let Ok(n) = stream.read(&mut chunk).await else { return };
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);

        while let Some(frame) = extract_frame(&mut buf) {
            let message = InboundMessage {
                raw: frame,
                data_type: Some("HL7".to_string()),
                source_map: SourceMap::default(),
            };
            let ack = match handler(message).await {
                Ok(response) if !response.is_empty() => response,
                _ => vec![START_BLOCK, END_BLOCK, CARRIAGE_RETURN],
            };
            if stream.write_all(&ack).await.is_err() {
                return;
            }
        }
    }
}

/// Pulls the first complete MLLP frame out of `buf`, if any, leaving the
/// remainder (start of the next frame) in place.
fn extract_frame(buf: &mut Vec<u8>) -> Option<Vec<u8>> {
    let start = buf.iter().position(|&b| b == START_BLOCK)?;
    let end = buf
        .iter()
        .enumerate()
        .skip(start + 1)
        .find(|&(i, &b)| b == END_BLOCK && buf.get(i + 1) == Some(&CARRIAGE_RETURN))
        .map(|(i, _)| i)?;
    let frame = buf[start + 1..end].to_vec();
    buf.drain(..=end + 1);
    Some(frame)
}

/// VM source: accepts dispatches routed in-process from another deployed
/// channel, via [`VmRouter`].
pub struct VmSource {
    pub router: Arc<VmRouter>,
    pub channel_name: String,
}

#[async_trait]
impl SourceConnector for VmSource {
    #[instrument(skip(self, handler))]
    async fn start(&self, handler: MessageHandler) -> Result<ListenerInfo, TransportError> {
        self.router.register(self.channel_name.clone(), handler);
        Ok(ListenerInfo { address: format!("vm://{}", self.channel_name) })
    }

    async fn stop(&self) {
        self.router.unregister(&self.channel_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_frame_returns_none_without_a_complete_frame() {
        let mut buf = vec![START_BLOCK, b'M', b'S', b'H'];
        assert!(extract_frame(&mut buf).is_none());
    }

    #[test]
    fn extract_frame_pulls_the_payload_between_block_markers() {
        let mut buf = vec![START_BLOCK, b'M', b'S', b'H', END_BLOCK, CARRIAGE_RETURN];
        let frame = extract_frame(&mut buf).unwrap();
        assert_eq!(frame, b"MSH");
        assert!(buf.is_empty());
    }

    #[test]
    fn extract_frame_leaves_a_trailing_partial_frame_in_place() {
        let mut buf = vec![
            START_BLOCK, b'A', END_BLOCK, CARRIAGE_RETURN, START_BLOCK, b'B',
        ];
        let frame = extract_frame(&mut buf).unwrap();
        assert_eq!(frame, b"A");
        assert_eq!(buf, vec![START_BLOCK, b'B']);
    }
}
