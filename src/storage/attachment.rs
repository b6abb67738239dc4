//! Fixed-size attachment segmentation and storage.
//!
//! Large binary attachments are split into segments before being written,
//! so a single oversized blob never blocks the connection pool with one
//! multi-megabyte write.

use async_trait::async_trait;
use sqlx::Row;
use tracing::instrument;

use crate::database::DatabaseConnection;
use crate::domain::message::AttachmentSegment;
use crate::domain_types::ChannelId;
use crate::error::TransportError;
use crate::storage::ddl::ChannelTableNames;

/// Default segment size: 1 MiB.
pub const DEFAULT_SEGMENT_SIZE: usize = 1024 * 1024;

/// Splits `data` into consecutively numbered segments of at most
/// `segment_size` bytes each. `segment_size = 0` is treated as
/// [`DEFAULT_SEGMENT_SIZE`].
#[must_use]
pub fn segment(attachment_id: &str, data: &[u8], segment_size: usize) -> Vec<AttachmentSegment> {
    let segment_size = if segment_size == 0 { DEFAULT_SEGMENT_SIZE } else { segment_size };
    if data.is_empty() {
        return vec![AttachmentSegment {
            attachment_id: attachment_id.to_string(),
            segment_no: 0,
            data: Vec::new(),
        }];
    }
    data.chunks(segment_size)
        .enumerate()
        .map(|(i, chunk)| AttachmentSegment {
            attachment_id: attachment_id.to_string(),
            segment_no: i32::try_from(i).unwrap_or(i32::MAX),
            data: chunk.to_vec(),
        })
        .collect()
}

/// Reassembles segments (which must already be in ascending `segment_no`
/// order) back into the original byte stream.
#[must_use]
pub fn reassemble(segments: &[AttachmentSegment]) -> Vec<u8> {
    segments.iter().flat_map(|s| s.data.iter().copied()).collect()
}

/// Durable storage for attachment segments.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// Persists every segment of an attachment.
    async fn put_segments(
        &self,
        channel: ChannelId,
        segments: &[AttachmentSegment],
    ) -> Result<(), TransportError>;

    /// Fetches every segment for an attachment, ordered by segment number.
    async fn get_segments(
        &self,
        channel: ChannelId,
        attachment_id: &str,
    ) -> Result<Vec<AttachmentSegment>, TransportError>;
}

/// `SQLite`-backed [`AttachmentStore`].
pub struct SqliteAttachmentStore {
    connection: DatabaseConnection,
}

impl SqliteAttachmentStore {
    #[must_use]
    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl AttachmentStore for SqliteAttachmentStore {
    #[instrument(skip(self, segments))]
    async fn put_segments(
        &self,
        channel: ChannelId,
        segments: &[AttachmentSegment],
    ) -> Result<(), TransportError> {
        let names = ChannelTableNames::new(&channel.table_suffix());
        let query = format!(
            "INSERT OR REPLACE INTO {} (attachment_id, segment_no, data) VALUES (?, ?, ?)",
            names.attachments()
        );
        for seg in segments {
            sqlx::query(&query)
                .bind(&seg.attachment_id)
                .bind(seg.segment_no)
                .bind(&seg.data)
                .execute(self.connection.pool())
                .await?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_segments(
        &self,
        channel: ChannelId,
        attachment_id: &str,
    ) -> Result<Vec<AttachmentSegment>, TransportError> {
        let names = ChannelTableNames::new(&channel.table_suffix());
        let query = format!(
            "SELECT attachment_id, segment_no, data FROM {} WHERE attachment_id = ? ORDER BY segment_no ASC",
            names.attachments()
        );
        let rows = sqlx::query(&query)
            .bind(attachment_id)
            .fetch_all(self.connection.pool())
            .await?;
        rows.into_iter()
            .map(|row| {
                Ok(AttachmentSegment {
                    attachment_id: row.try_get("attachment_id")?,
                    segment_no: row.try_get("segment_no")?,
                    data: row.try_get("data")?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_and_reassemble_round_trips_arbitrary_data() {
        let data: Vec<u8> = (0..10_000).map(|i| (i % 256) as u8).collect();
        let segments = segment("att-1", &data, 1500);
        assert_eq!(segments.len(), 7);
        assert_eq!(reassemble(&segments), data);
    }

    #[test]
    fn empty_attachment_produces_a_single_empty_segment() {
        let segments = segment("att-empty", &[], 100);
        assert_eq!(segments.len(), 1);
        assert!(segments[0].data.is_empty());
    }

    #[test]
    fn zero_segment_size_falls_back_to_the_default() {
        let data = vec![0u8; 10];
        let segments = segment("att-2", &data, 0);
        assert_eq!(segments.len(), 1);
    }
}
