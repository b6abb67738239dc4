//! Per-channel, per-destination statistics counters.

use async_trait::async_trait;
use sqlx::Row;
use tracing::instrument;

use crate::database::DatabaseConnection;
use crate::domain::message::StatisticsCounters;
use crate::domain_types::{ChannelId, ConnectorStatus, MetaDataId, ServerId};
use crate::error::TransportError;
use crate::storage::ddl::ChannelTableNames;

/// Durable storage and incrementing of per-destination statistics.
#[async_trait]
pub trait StatisticsStore: Send + Sync {
    /// Applies one status increment, creating the row if absent.
    async fn increment(
        &self,
        channel: ChannelId,
        metadata_id: MetaDataId,
        server_id: ServerId,
        status: ConnectorStatus,
    ) -> Result<(), TransportError>;

    /// Reads the current counters for a destination on this server.
    async fn get(
        &self,
        channel: ChannelId,
        metadata_id: MetaDataId,
        server_id: ServerId,
    ) -> Result<StatisticsCounters, TransportError>;
}

/// `SQLite`-backed [`StatisticsStore`].
pub struct SqliteStatisticsStore {
    connection: DatabaseConnection,
}

impl SqliteStatisticsStore {
    #[must_use]
    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl StatisticsStore for SqliteStatisticsStore {
    #[instrument(skip(self))]
    async fn increment(
        &self,
        channel: ChannelId,
        metadata_id: MetaDataId,
        server_id: ServerId,
        status: ConnectorStatus,
    ) -> Result<(), TransportError> {
        let mut counters = self.get(channel, metadata_id, server_id).await?;
        counters.increment(status, 1);

        let names = ChannelTableNames::new(&channel.table_suffix());
        let query = format!(
            "INSERT OR REPLACE INTO {} (metadata_id, server_id, received, filtered, sent, error, queued)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            names.statistics()
        );
        sqlx::query(&query)
            .bind(metadata_id.into_inner())
            .bind(server_id.to_string())
            .bind(counters.received as i64)
            .bind(counters.filtered as i64)
            .bind(counters.sent as i64)
            .bind(counters.error as i64)
            .bind(counters.queued as i64)
            .execute(self.connection.pool())
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(
        &self,
        channel: ChannelId,
        metadata_id: MetaDataId,
        server_id: ServerId,
    ) -> Result<StatisticsCounters, TransportError> {
        let names = ChannelTableNames::new(&channel.table_suffix());
        let query = format!(
            "SELECT received, filtered, sent, error, queued FROM {}
             WHERE metadata_id = ? AND server_id = ?",
            names.statistics()
        );
        let row = sqlx::query(&query)
            .bind(metadata_id.into_inner())
            .bind(server_id.to_string())
            .fetch_optional(self.connection.pool())
            .await?;
        let Some(row) = row else { return Ok(StatisticsCounters::default()) };
        Ok(StatisticsCounters {
            received: row.try_get::<i64, _>("received")? as u64,
            filtered: row.try_get::<i64, _>("filtered")? as u64,
            sent: row.try_get::<i64, _>("sent")? as u64,
            error: row.try_get::<i64, _>("error")? as u64,
            queued: row.try_get::<i64, _>("queued")? as u64,
        })
    }
}
