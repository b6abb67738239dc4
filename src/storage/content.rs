//! The content store: durable blobs keyed by `(message, metadata, content
//! type)`, with an optional truncation policy applied before the bytes
//! ever reach storage.

use async_trait::async_trait;
use sqlx::Row;
use tracing::instrument;

use crate::database::DatabaseConnection;
use crate::domain::message::Content;
use crate::domain::source_map::SourceMap;
use crate::domain_types::{ChannelId, ContentType, MessageId, MetaDataId};
use crate::error::TransportError;
use crate::storage::ddl::ChannelTableNames;

/// Truncates `bytes` to at most `max_len`, cutting on a UTF-8 character
/// boundary so textual payloads aren't left with a dangling partial
/// multi-byte sequence at the end. A `max_len` of `0` disables truncation.
#[must_use]
pub fn truncate(bytes: &[u8], max_len: usize) -> &[u8] {
    if max_len == 0 || bytes.len() <= max_len {
        return bytes;
    }
    let mut cut = max_len;
    while cut > 0 && (bytes[cut] & 0b1100_0000) == 0b1000_0000 {
        cut -= 1;
    }
    &bytes[..cut]
}

/// Durable storage for content rows.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Stores `content`, truncating it first if `max_len` is non-zero.
    async fn put(
        &self,
        channel: ChannelId,
        content: &Content,
        max_len: usize,
    ) -> Result<(), TransportError>;

    /// Fetches one content row, if present.
    async fn get(
        &self,
        channel: ChannelId,
        message_id: MessageId,
        metadata_id: MetaDataId,
        content_type: ContentType,
    ) -> Result<Option<Content>, TransportError>;

    /// Finds every message in `channel` whose source map names
    /// `(parent_channel, parent_message)` as its immediate parent — the
    /// forward edges a provenance trace follows down from a node.
    async fn find_children(
        &self,
        channel: ChannelId,
        parent_channel: ChannelId,
        parent_message: MessageId,
    ) -> Result<Vec<MessageId>, TransportError>;
}

/// `SQLite`-backed [`ContentStore`].
pub struct SqliteContentStore {
    connection: DatabaseConnection,
}

impl SqliteContentStore {
    #[must_use]
    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl ContentStore for SqliteContentStore {
    #[instrument(skip(self, content))]
    async fn put(
        &self,
        channel: ChannelId,
        content: &Content,
        max_len: usize,
    ) -> Result<(), TransportError> {
        let names = ChannelTableNames::new(&channel.table_suffix());
        let truncated = truncate(&content.content, max_len);
        let query = format!(
            "INSERT OR REPLACE INTO {} (message_id, metadata_id, content_type, content, data_type, encrypted)
             VALUES (?, ?, ?, ?, ?, ?)",
            names.content()
        );
        sqlx::query(&query)
            .bind(content.message_id.into_inner())
            .bind(content.metadata_id.into_inner())
            .bind(content.content_type.code())
            .bind(truncated)
            .bind(content.data_type.clone())
            .bind(content.encrypted)
            .execute(self.connection.pool())
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(
        &self,
        channel: ChannelId,
        message_id: MessageId,
        metadata_id: MetaDataId,
        content_type: ContentType,
    ) -> Result<Option<Content>, TransportError> {
        let names = ChannelTableNames::new(&channel.table_suffix());
        let query = format!(
            "SELECT content, data_type, encrypted FROM {}
             WHERE message_id = ? AND metadata_id = ? AND content_type = ?",
            names.content()
        );
        let row = sqlx::query(&query)
            .bind(message_id.into_inner())
            .bind(metadata_id.into_inner())
            .bind(content_type.code())
            .fetch_optional(self.connection.pool())
            .await?;
        let Some(row) = row else { return Ok(None) };
        Ok(Some(Content {
            message_id,
            metadata_id,
            content_type,
            content: row.try_get("content")?,
            data_type: row.try_get("data_type")?,
            encrypted: row.try_get("encrypted")?,
        }))
    }

    #[instrument(skip(self))]
    async fn find_children(
        &self,
        channel: ChannelId,
        parent_channel: ChannelId,
        parent_message: MessageId,
    ) -> Result<Vec<MessageId>, TransportError> {
        let names = ChannelTableNames::new(&channel.table_suffix());
        let query = format!(
            "SELECT message_id, content FROM {} WHERE content_type = ?",
            names.content()
        );
        let rows = sqlx::query(&query)
            .bind(ContentType::SourceMap.code())
            .fetch_all(self.connection.pool())
            .await?;

        let mut children = Vec::new();
        for row in rows {
            let message_id: i64 = row.try_get("message_id")?;
            let content: Vec<u8> = row.try_get("content")?;
            let Ok(map) = serde_json::from_slice::<SourceMap>(&content) else { continue };
            if map.immediate_parent() != Some((parent_channel, parent_message)) {
                continue;
            }
            if let Ok(id) = MessageId::try_new(message_id) {
                children.push(id);
            }
        }
        Ok(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_is_a_no_op_under_the_limit() {
        assert_eq!(truncate(b"hello", 10), b"hello");
    }

    #[test]
    fn truncate_zero_disables_the_limit() {
        assert_eq!(truncate(b"hello", 0), b"hello");
    }

    #[test]
    fn truncate_backs_off_to_a_utf8_boundary() {
        let bytes = "héllo".as_bytes(); // 'é' is two bytes, encoded at index 1..3
        let truncated = truncate(bytes, 2);
        assert!(std::str::from_utf8(truncated).is_ok());
        assert_eq!(truncated, &bytes[..1]);
    }
}
