//! The data model from the design: `Message`, `ConnectorMessage`, `Content`,
//! `Attachment`, and `Statistics`, plus the per-status counters they feed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain_types::{ChannelId, ConnectorStatus, ContentType, MessageId, MetaDataId, ServerId};

/// One row per external ingest. Immutable after `processed = true` except
/// for reprocess, which creates a new `Message` with `original_id` set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub channel_id: ChannelId,
    pub id: MessageId,
    pub server_id: ServerId,
    pub received_date: DateTime<Utc>,
    pub processed: bool,
    pub original_id: Option<MessageId>,
    pub import_id: Option<String>,
}

impl Message {
    /// Constructs the initial (unprocessed) row for a freshly received raw
    /// message.
    #[must_use]
    pub fn new_received(channel_id: ChannelId, id: MessageId, server_id: ServerId) -> Self {
        Self {
            channel_id,
            id,
            server_id,
            received_date: Utc::now(),
            processed: false,
            original_id: None,
            import_id: None,
        }
    }

    /// Constructs a reprocess row: a new message that references the
    /// message it replaces.
    #[must_use]
    pub fn new_reprocess(
        channel_id: ChannelId,
        id: MessageId,
        server_id: ServerId,
        original_id: MessageId,
    ) -> Self {
        Self {
            original_id: Some(original_id),
            ..Self::new_received(channel_id, id, server_id)
        }
    }
}

/// One row per `(Message, metadata_id)`. Created when a destination (or
/// the source) begins work; status transitions are append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorMessage {
    pub message_id: MessageId,
    pub metadata_id: MetaDataId,
    pub connector_name: String,
    pub received_date: DateTime<Utc>,
    pub send_date: Option<DateTime<Utc>>,
    pub response_date: Option<DateTime<Utc>>,
    pub status: ConnectorStatus,
    pub send_attempts: u32,
    pub error_code: Option<i32>,
}

impl ConnectorMessage {
    /// Constructs the initial row for a connector that has just started
    /// work on a message.
    #[must_use]
    pub fn new(message_id: MessageId, metadata_id: MetaDataId, connector_name: impl Into<String>) -> Self {
        Self {
            message_id,
            metadata_id,
            connector_name: connector_name.into(),
            received_date: Utc::now(),
            send_date: None,
            response_date: None,
            status: ConnectorStatus::Received,
            send_attempts: 0,
            error_code: None,
        }
    }

    /// Applies a status transition, stamping `send_date` the first time the
    /// connector attempts a send.
    pub fn transition(&mut self, status: ConnectorStatus) {
        if matches!(
            status,
            ConnectorStatus::Sent | ConnectorStatus::Queued | ConnectorStatus::Error
        ) && self.send_date.is_none()
        {
            self.send_date = Some(Utc::now());
        }
        self.status = status;
    }
}

/// A content blob keyed by `(message_id, metadata_id, content_type)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub message_id: MessageId,
    pub metadata_id: MetaDataId,
    pub content_type: ContentType,
    pub content: Vec<u8>,
    pub data_type: Option<String>,
    pub encrypted: bool,
}

impl Content {
    #[must_use]
    pub fn new(
        message_id: MessageId,
        metadata_id: MetaDataId,
        content_type: ContentType,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            message_id,
            metadata_id,
            content_type,
            content: content.into(),
            data_type: None,
            encrypted: false,
        }
    }
}

/// One segment of a large binary attachment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentSegment {
    pub attachment_id: String,
    pub segment_no: i32,
    pub data: Vec<u8>,
}

/// Per-`(channel, metadata_id, server_id)` counters for each tracked
/// status. Monotonic under normal operation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatisticsCounters {
    pub received: u64,
    pub filtered: u64,
    pub sent: u64,
    pub error: u64,
    pub queued: u64,
}

impl StatisticsCounters {
    /// Increments the counter for the given status.
    ///
    /// `Transformed` and `Pending` don't have dedicated counters; they're
    /// no-ops here.
    pub fn increment(&mut self, status: ConnectorStatus, n: u64) {
        match status {
            ConnectorStatus::Received => self.received += n,
            ConnectorStatus::Filtered => self.filtered += n,
            ConnectorStatus::Sent => self.sent += n,
            ConnectorStatus::Error => self.error += n,
            ConnectorStatus::Queued => self.queued += n,
            ConnectorStatus::Transformed | ConnectorStatus::Pending => {}
        }
    }
}
